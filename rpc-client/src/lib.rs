#![forbid(unsafe_code)]
//! The client half of the RPC session runtime: call multiplexing over a
//! single connection, a background receiver, and handshake-bounded dialing
//! (spec §4.5, §4.6).

mod call;
mod client;
mod dial;

pub use call::Call;
pub use client::Client;
pub use dial::dial;
