//! The `Arith` service: spec.md §8's literal worked example (`Arith.Sum`,
//! returning `a + b`), used by the workspace's end-to-end scenario 1 and by
//! the `arith-server`/`arith-client` binaries.

use std::convert::Infallible;
use std::sync::Arc;

use rpc_core::{Service, ServiceBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub value: i64,
}

#[derive(Debug, Default)]
pub struct Arith;

impl Arith {
    async fn sum(self: Arc<Self>, args: Args) -> Result<Reply, Infallible> {
        Ok(Reply {
            value: args.a + args.b,
        })
    }

    async fn sleep_then_echo(self: Arc<Self>, args: SleepArgs) -> Result<Reply, Infallible> {
        tokio::time::sleep(std::time::Duration::from_millis(args.duration_ms)).await;
        Ok(Reply { value: args.value })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SleepArgs {
    pub duration_ms: u64,
    pub value: i64,
}

/// Builds the registered `Arith` service: `Sum` for the happy-path scenario,
/// plus `Sleep` so integration tests can exercise handle-timeout and
/// cancellation (spec §8 scenarios 4 and 6) without a second demo service.
pub fn service() -> Service {
    let arith = Arc::new(Arith);
    ServiceBuilder::new("Arith")
        .expect("Arith starts with an uppercase letter")
        .method("Sum", arith.clone(), Arith::sum)
        .method("Sleep", arith, Arith::sleep_then_echo)
        .build()
}
