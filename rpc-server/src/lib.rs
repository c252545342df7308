#![forbid(unsafe_code)]
//! The server half of the RPC session runtime: per-connection handshake,
//! concurrent request dispatch, worker fan-out, and the per-request handle
//! timeout (spec §4.4).

mod dispatch;
mod server;

pub use server::Server;
