use std::error::Error;
use std::net::SocketAddr;

use arith_demo::{Args, Reply};
use clap::Parser;
use rpc_core::CodecRegistry;
use tracing::info;

/// Calls `Arith.Sum` against the demo server (spec.md §8, scenario 1).
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:9527")]
    addr: SocketAddr,

    #[arg(long, default_value_t = 3)]
    a: i64,

    #[arg(long, default_value_t = 4)]
    b: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let registry = CodecRegistry::with_default_json();
    let client = rpc_client::dial(cli.addr, None, &registry).await?;

    let reply: Reply = client
        .call("Arith.Sum", Args { a: cli.a, b: cli.b })
        .await?;
    info!(a = cli.a, b = cli.b, value = reply.value, "Arith.Sum");
    println!("{} + {} = {}", cli.a, cli.b, reply.value);

    client.close().await?;
    Ok(())
}
