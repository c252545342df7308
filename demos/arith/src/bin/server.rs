use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rpc_core::CodecRegistry;
use rpc_server::Server;
use tokio::net::TcpListener;
use tracing::info;

/// Runs the `Arith` demo service (spec.md §8, end-to-end scenario 1).
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:9527")]
    addr: SocketAddr,

    /// Per-request handle timeout in milliseconds. 0 = unbounded.
    #[arg(long, default_value_t = 0)]
    handle_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let server = Arc::new(
        Server::new().with_handle_timeout(Duration::from_millis(cli.handle_timeout_ms)),
    );
    server.register(arith_demo::service()).await?;

    let listener = TcpListener::bind(cli.addr).await?;
    info!(addr = %cli.addr, "rpc server: listening");

    let registry = Arc::new(CodecRegistry::with_default_json());
    server.listen(listener, registry).await;
    Ok(())
}
