use rpc_core::{merge_with_defaults, CodecRegistry, HandshakeOptions, RpcError};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time;

use crate::client::Client;

/// Connects to `addr`, merges `opt` onto the defaults, and performs the
/// handshake — all bounded by `connection_timeout` (spec §4.6). On timeout
/// the in-progress connection/handshake is abandoned and `ConnectTimeout` is
/// returned; `connection_timeout == 0` means unbounded.
pub async fn dial(
    addr: impl ToSocketAddrs,
    opt: Option<HandshakeOptions>,
    registry: &CodecRegistry<TcpStream>,
) -> Result<Client, RpcError> {
    let opt = merge_with_defaults(opt);
    let timeout = opt.connection_timeout();

    let connect_and_handshake = async {
        let stream = TcpStream::connect(addr).await.map_err(RpcError::DialFailed)?;
        Client::new(stream, opt, registry).await
    };

    if timeout.is_zero() {
        return connect_and_handshake.await;
    }

    match time::timeout(timeout, connect_and_handshake).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::ConnectTimeout(timeout)),
    }
}
