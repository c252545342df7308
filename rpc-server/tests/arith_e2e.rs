//! End-to-end scenarios from spec.md §8, driving a real `rpc-server` over
//! loopback TCP with a real `rpc-client`. Each test binds to port 0 and reads
//! back the OS-assigned address, so these can run concurrently.

use std::sync::Arc;
use std::time::Duration;

use arith_demo::{Args, Reply, SleepArgs};
use rpc_core::CodecRegistry;
use rpc_server::Server;
use tokio::net::TcpListener;
use tokio::time::Instant;

async fn spawn_server(handle_timeout: Duration) -> std::net::SocketAddr {
    let server = Arc::new(Server::new().with_handle_timeout(handle_timeout));
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
async fn sum_round_trips_successfully() {
    let addr = spawn_server(Duration::ZERO).await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let reply: Reply = client
        .call("Arith.Sum", Args { a: 3, b: 4 })
        .await
        .unwrap();
    assert_eq!(reply, Reply { value: 7 });

    client.close().await.unwrap();
}

#[tokio::test]
async fn unknown_service_reports_exact_error_string() {
    let addr = spawn_server(Duration::ZERO).await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let err = client
        .call::<Reply>("NoSuch.Foo", Args { a: 1, b: 2 })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "rpc server: can't find service NoSuch");

    client.close().await.unwrap();
}

#[tokio::test]
async fn unknown_method_reports_exact_error_string() {
    let addr = spawn_server(Duration::ZERO).await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let err = client
        .call::<Reply>("Arith.NoSuch", Args { a: 1, b: 2 })
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "rpc server: can't find method NoSuch on service Arith"
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn one_hundred_concurrent_calls_each_get_their_own_reply() {
    let addr = spawn_server(Duration::ZERO).await;
    let registry = CodecRegistry::with_default_json();
    let client = Arc::new(rpc_client::dial(addr, None, &registry).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..100i64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let reply: Reply = client
                .call("Arith.Sum", Args { a: i, b: 1 })
                .await
                .unwrap();
            (i, reply)
        }));
    }

    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        let (i, reply) = handle.await.unwrap();
        assert_eq!(reply, Reply { value: i + 1 });
        assert!(seen.insert(i), "each call observed exactly once");
    }
    assert_eq!(seen.len(), 100);

    client.close().await.unwrap();
}

#[tokio::test]
async fn handle_timeout_fires_before_a_slow_method_returns() {
    let addr = spawn_server(Duration::from_millis(100)).await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let started = Instant::now();
    let err = client
        .call::<Reply>(
            "Arith.Sleep",
            SleepArgs {
                duration_ms: 500,
                value: 42,
            },
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.to_string().contains("request handle timeout"));
    assert!(
        elapsed < Duration::from_millis(400),
        "timeout should fire well before the method's own 500ms sleep, took {elapsed:?}"
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn handle_timeout_zero_means_unbounded() {
    let addr = spawn_server(Duration::ZERO).await;
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(addr, None, &registry).await.unwrap();

    let reply: Reply = client
        .call(
            "Arith.Sleep",
            SleepArgs {
                duration_ms: 50,
                value: 9,
            },
        )
        .await
        .unwrap();
    assert_eq!(reply, Reply { value: 9 });

    client.close().await.unwrap();
}
