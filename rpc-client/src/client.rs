use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rpc_core::{
    split_stream, write_handshake, CodecReader, CodecRegistry, CodecWriter, HandshakeOptions,
    Header, RpcError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::call::{Call, CallOutcome};

type SendHalf = Arc<Mutex<Box<dyn CodecWriter>>>;

struct PendingCall {
    completion: oneshot::Sender<CallOutcome>,
}

/// Client-side connection state guarded by `state_mutex` (spec §3, §5):
/// the sequence counter, the pending table keyed by `seq`, and the two
/// shutdown flags.
struct ClientState {
    next_seq: u64,
    pending: HashMap<u64, PendingCall>,
    closing: bool,
    shutdown: bool,
}

enum ShutdownReason {
    Transport(String),
    Closed,
}

impl ShutdownReason {
    fn to_rpc_error(&self) -> RpcError {
        match self {
            ShutdownReason::Transport(msg) => RpcError::Transport(msg.clone()),
            ShutdownReason::Closed => RpcError::AlreadyShutdown,
        }
    }
}

/// Multiplexes many in-flight calls over a single connection (spec §4.5):
/// the send path, the pending-call registry, a single background receiver
/// task, and shutdown propagation.
pub struct Client {
    send_half: SendHalf,
    state: Arc<Mutex<ClientState>>,
    receiver: JoinHandle<()>,
}

impl Client {
    /// Performs the handshake and spawns the background receiver (spec
    /// §4.5 `new_client`). `stream` must already be connected; [`crate::dial`]
    /// layers the connect-timeout bound on top of this.
    pub async fn new<S>(
        mut stream: S,
        opt: HandshakeOptions,
        registry: &CodecRegistry<S>,
    ) -> Result<Self, RpcError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        write_handshake(&mut stream, &opt)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;

        let (reader, writer) = split_stream(stream);
        let codec = registry.build(&opt.codec_type, reader, writer)?;
        let (codec_reader, codec_writer) = codec.split();

        let send_half: SendHalf = Arc::new(Mutex::new(codec_writer));
        let state = Arc::new(Mutex::new(ClientState {
            next_seq: 1,
            pending: HashMap::new(),
            closing: false,
            shutdown: false,
        }));

        let receiver = tokio::spawn(receive_loop(
            codec_reader,
            send_half.clone(),
            state.clone(),
        ));

        Ok(Client {
            send_half,
            state,
            receiver,
        })
    }

    /// Async call (spec §4.5 `go`): registers the call, writes the request,
    /// and returns immediately with the assigned [`Call`] and the receiver
    /// half of its completion.
    pub async fn go(
        &self,
        service_method: impl Into<String>,
        args: impl Serialize,
    ) -> Result<(Call, oneshot::Receiver<CallOutcome>), RpcError> {
        let args = serde_json::to_value(args).map_err(|err| RpcError::BodyDecode(err.to_string()))?;
        let (tx, rx) = oneshot::channel();
        let call = self.send(service_method.into(), args, tx).await;
        Ok((call, rx))
    }

    /// Synchronous call (spec §4.5 `call`): `go` followed by waiting on the
    /// completion. Decodes the reply into `R` on success.
    pub async fn call<R: DeserializeOwned>(
        &self,
        service_method: impl Into<String>,
        args: impl Serialize,
    ) -> Result<R, RpcError> {
        let (_call, rx) = self.go(service_method, args).await?;
        let outcome = rx.await.map_err(|_| RpcError::Transport(
            "client is shut down before this call completed".into(),
        ))?;
        decode_reply(outcome)
    }

    /// Synchronous call with cancellation (spec §4.5, §5 "Cancellation and
    /// timeouts"): races the completion against `cancel`. On cancellation,
    /// the call is removed from the pending table so a later response is
    /// silently discarded by the receiver as "absent" (spec §4.5 step 2).
    pub async fn call_with_cancel<R: DeserializeOwned>(
        &self,
        service_method: impl Into<String>,
        args: impl Serialize,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<R, RpcError> {
        let (call, rx) = self.go(service_method, args).await?;
        tokio::select! {
            outcome = rx => {
                let outcome = outcome.map_err(|_| RpcError::Transport(
                    "client is shut down before this call completed".into(),
                ))?;
                decode_reply(outcome)
            }
            _ = cancel => {
                let mut state = self.state.lock().await;
                state.pending.remove(&call.seq);
                Err(RpcError::Cancelled)
            }
        }
    }

    /// Closes the client (spec §4.5 `close`): rejects a second close with
    /// `AlreadyShutdown`, otherwise marks `closing`, shuts down the write
    /// half of the codec so the peer observes EOF promptly (spec §4.1's
    /// "three operations and a close"), drains every pending call with
    /// `AlreadyShutdown`, and stops the receiver task. Without the explicit
    /// shutdown the socket's write side — and so the server's view of the
    /// connection — would stay open until the `Client` value is eventually
    /// dropped.
    pub async fn close(&self) -> Result<(), RpcError> {
        {
            let mut state = self.state.lock().await;
            if state.closing {
                return Err(RpcError::AlreadyShutdown);
            }
            state.closing = true;
        }
        {
            let mut writer = self.send_half.lock().await;
            if let Err(err) = writer.shutdown().await {
                debug!("rpc client: shutdown failed: {err}");
            }
        }
        terminate_calls(&self.send_half, &self.state, ShutdownReason::Closed).await;
        self.receiver.abort();
        Ok(())
    }

    async fn send(
        &self,
        service_method: String,
        args: Value,
        completion: oneshot::Sender<CallOutcome>,
    ) -> Call {
        let mut writer = self.send_half.lock().await;

        let seq = {
            let mut state = self.state.lock().await;
            if state.closing || state.shutdown {
                let _ = completion.send(Err(RpcError::AlreadyShutdown));
                return Call {
                    seq: 0,
                    service_method,
                };
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.insert(seq, PendingCall { completion });
            seq
        };

        let header = Header::request(service_method.clone(), seq);
        if let Err(err) = writer.write(&header, &args).await {
            let mut state = self.state.lock().await;
            if let Some(pending) = state.pending.remove(&seq) {
                let _ = pending
                    .completion
                    .send(Err(RpcError::Transport(err.to_string())));
            }
        }

        Call { seq, service_method }
    }
}

fn decode_reply<R: DeserializeOwned>(outcome: CallOutcome) -> Result<R, RpcError> {
    let value = outcome?;
    serde_json::from_value(value).map_err(|err| RpcError::BodyDecode(err.to_string()))
}

/// The client's single background reader (spec §4.5 "Receiver task"): the
/// only task that ever calls `read_header`/`read_body` on this connection.
async fn receive_loop(
    mut reader: Box<dyn CodecReader>,
    send_half: SendHalf,
    state: Arc<Mutex<ClientState>>,
) {
    loop {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(err) => {
                let reason = if err.is_clean_eof() {
                    "server closed the connection".to_string()
                } else {
                    err.to_string()
                };
                debug!("rpc client: receiver terminating: {reason}");
                terminate_calls(&send_half, &state, ShutdownReason::Transport(reason)).await;
                return;
            }
        };

        let pending = {
            let mut guard = state.lock().await;
            guard.pending.remove(&header.seq)
        };

        match pending {
            None => {
                // Timed out, cancelled, or a response for a seq we never
                // registered: drain the body and move on (spec §4.5 step 2
                // "Absent").
                let _ = reader.read_body().await;
            }
            Some(pending) if header.is_error() => {
                let _ = reader.read_body().await;
                let _ = pending.completion.send(Err(RpcError::CallUser(header.error)));
            }
            Some(pending) => match reader.read_body().await {
                Ok(body) => {
                    let _ = pending.completion.send(Ok(body));
                }
                Err(err) => {
                    let _ = pending
                        .completion
                        .send(Err(RpcError::BodyDecode(err.to_string())));
                }
            },
        }
    }
}

/// Drains every pending call with `reason`, under both `send_mutex` and
/// `state_mutex` (spec §4.5 `terminate_calls`): taking `send_mutex` first
/// ensures no `send` is mid-registration when shutdown is set.
async fn terminate_calls(
    send_half: &SendHalf,
    state: &Arc<Mutex<ClientState>>,
    reason: ShutdownReason,
) {
    let _send_guard = send_half.lock().await;
    let mut state_guard = state.lock().await;
    state_guard.shutdown = true;
    let pending = std::mem::take(&mut state_guard.pending);
    drop(state_guard);
    for (_, pending) in pending {
        let _ = pending.completion.send(Err(reason.to_rpc_error()));
    }
}
