//! Client-side scenarios from spec.md §8 that don't fit naturally alongside
//! the server's own end-to-end tests: cancellation, connect timeout, and
//! double-close.

use std::sync::Arc;
use std::time::Duration;

use arith_demo::{Reply, SleepArgs};
use rpc_core::{CodecRegistry, RpcError};
use rpc_server::Server;
use tokio::net::TcpListener;
use tokio::time::Instant;

async fn spawn_server() -> std::net::SocketAddr {
    let server = Arc::new(Server::new());
    server.register(arith_demo::service()).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let registry = Arc::new(CodecRegistry::with_default_json());
        server.listen(listener, registry).await;
    });

    addr
}

#[tokio::test]
async fn cancellation_returns_before_the_slow_method_finishes() {
    let addr = spawn_server().await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let started = Instant::now();
    let result: Result<Reply, RpcError> = client
        .call_with_cancel(
            "Arith.Sleep",
            SleepArgs {
                duration_ms: 1000,
                value: 1,
            },
            tokio::time::sleep(Duration::from_millis(10)),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(RpcError::Cancelled)));
    assert!(
        elapsed < Duration::from_millis(500),
        "cancellation should win long before the method's own 1s sleep, took {elapsed:?}"
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn closing_twice_reports_already_shutdown() {
    let addr = spawn_server().await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    client.close().await.unwrap();
    let err = client.close().await.unwrap_err();
    assert!(matches!(err, RpcError::AlreadyShutdown));
}

#[tokio::test]
async fn calls_after_close_are_rejected_immediately() {
    let addr = spawn_server().await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    client.close().await.unwrap();
    let err = client
        .call::<Reply>(
            "Arith.Sleep",
            SleepArgs {
                duration_ms: 1,
                value: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::AlreadyShutdown));
}

/// A timeout of one nanosecond makes the race deterministic: any real
/// connect-plus-handshake round trip, even over loopback, takes several
/// microseconds, so the timer reliably wins regardless of how quickly the
/// peer actually accepts (spec §4.6, scenario 5).
#[tokio::test]
async fn connect_timeout_fires_on_an_implausibly_small_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let registry = CodecRegistry::with_default_json();
    let opt = rpc_core::HandshakeOptions {
        connection_timeout: 1,
        ..Default::default()
    };
    let err = rpc_client::dial(addr, Some(opt), &registry)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::ConnectTimeout(_)));
}
