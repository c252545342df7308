use rpc_core::RpcError;
use serde_json::Value;

/// The outcome delivered through a [`Call`]'s completion (spec §3): the
/// decoded reply on success, or the terminal error.
pub(crate) type CallOutcome = Result<Value, RpcError>;

/// A single in-flight client request (spec §3). The original models
/// `Call.Done` as a buffered channel the caller supplies, which the client
/// completes by sending the whole `*Call` back once; in Rust the
/// equivalent single-delivery, capacity-one-by-construction signal is a
/// `tokio::sync::oneshot`, so `go` hands back the `Receiver` half directly
/// alongside this metadata rather than taking a channel parameter — there is
/// no way to "supply" one oneshot pair's receiving end in advance of
/// creating it. See `rpc-client`'s `Client::go`.
#[derive(Debug, Clone)]
pub struct Call {
    pub seq: u64,
    pub service_method: String,
}
