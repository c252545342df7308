use std::sync::Arc;
use std::time::Duration;

use rpc_core::{
    error_sentinel, read_handshake, split_service_method, split_stream, CodecError, CodecReader,
    CodecRegistry, CodecWriter, Header, RpcError, Service, MAGIC_NUMBER,
};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::time;
use tracing::{debug, warn};

use crate::Server;

type SendHalf = Arc<Mutex<Box<dyn CodecWriter>>>;

/// Drives one connection end to end (spec §4.4): handshake, serve loop,
/// per-request worker fan-out, drain on exit. The loop itself is the
/// connection's one and only reader (spec §5); workers and the loop's own
/// error-response path share `send_mutex` to serialize writes.
pub(crate) async fn serve_connection<S>(
    server: Arc<Server>,
    stream: S,
    registry: &CodecRegistry<S>,
) -> Result<(), RpcError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = split_stream(stream);
    let opt = read_handshake(&mut reader)
        .await
        .map_err(RpcError::HandshakeDecode)?;
    if opt.magic_number != MAGIC_NUMBER {
        return Err(RpcError::InvalidMagic(opt.magic_number));
    }

    let codec = registry.build(&opt.codec_type, reader, writer)?;
    let (mut codec_reader, codec_writer) = codec.split();
    let send_half: SendHalf = Arc::new(Mutex::new(codec_writer));
    let handle_timeout = server.handle_timeout();

    debug!(codec = %opt.codec_type, "rpc server: handshake complete");

    let mut workers = Vec::new();

    loop {
        let header = match codec_reader.read_header().await {
            Ok(header) => header,
            Err(err) if err.is_clean_eof() => {
                debug!("rpc server: peer closed connection");
                break;
            }
            Err(err) => {
                warn!("rpc server: transport error reading header: {err}");
                break;
            }
        };

        match read_request(&server, codec_reader.as_mut(), &header).await {
            Ok((service, method_name, args)) => {
                let send_half = send_half.clone();
                let seq = header.seq;
                let service_method = header.service_method.clone();
                workers.push(tokio::spawn(invoke_and_respond(
                    service,
                    method_name,
                    args,
                    seq,
                    service_method,
                    send_half,
                    handle_timeout,
                )));
            }
            Err(err) => {
                send_error_response(&send_half, header.seq, header.service_method.clone(), err)
                    .await;
            }
        }

        workers.retain(|handle| !handle.is_finished());
    }

    // Drain every in-flight worker before closing (spec §4.4 step 2:
    // `worker_wait` tracks workers; the reader does not close the codec
    // until all workers have returned).
    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

/// Looks up the service/method named by the header and decodes the request
/// body. The body is always drained, even on a lookup failure, so framing
/// stays aligned for the next header (spec §4.4 step 2).
async fn read_request(
    server: &Arc<Server>,
    reader: &mut dyn CodecReader,
    header: &Header,
) -> Result<(Arc<Service>, String, Value), RpcError> {
    let lookup = match split_service_method(&header.service_method) {
        Ok((service_name, method_name)) => match server.lookup(service_name).await {
            Some(service) if service.method(method_name).is_some() => {
                Ok((service, method_name.to_string()))
            }
            Some(_) => Err(RpcError::UnknownMethod {
                service: service_name.to_string(),
                method: method_name.to_string(),
            }),
            None => Err(RpcError::UnknownService(service_name.to_string())),
        },
        Err(err) => Err(err),
    };

    match lookup {
        Ok((service, method_name)) => {
            let args = reader.read_body().await.map_err(body_decode_error)?;
            Ok((service, method_name, args))
        }
        Err(err) => {
            let _ = reader.read_body().await;
            Err(err)
        }
    }
}

fn body_decode_error(err: CodecError) -> RpcError {
    match err {
        CodecError::Decode(source) => RpcError::BodyDecode(source.to_string()),
        other => RpcError::Transport(other.to_string()),
    }
}

/// One worker per accepted request (spec §4.4 step 3). With
/// `handle_timeout == 0` it simply awaits the call; with a positive timeout
/// it races the call against a timer using a oneshot channel, which is the
/// drop-on-send fix for the leak described in spec §9: if the timer wins,
/// the losing invocation keeps running to completion in its own task and
/// its eventual `tx.send(..)` on an already-dropped receiver is a cheap,
/// non-blocking no-op — nothing is ever left parked.
async fn invoke_and_respond(
    service: Arc<Service>,
    method_name: String,
    args: Value,
    seq: u64,
    service_method: String,
    send_half: SendHalf,
    handle_timeout: Duration,
) {
    if handle_timeout.is_zero() {
        let result = invoke(&service, &method_name, args).await;
        send_result(&send_half, seq, service_method, result).await;
        return;
    }

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = invoke(&service, &method_name, args).await;
        let _ = tx.send(result);
    });

    tokio::select! {
        _ = time::sleep(handle_timeout) => {
            let err = RpcError::HandleTimeout(handle_timeout);
            send_error_response(&send_half, seq, service_method, err).await;
        }
        result = rx => {
            let result = result.unwrap_or_else(|_| {
                Err(RpcError::Transport("invocation task ended without a result".into()))
            });
            send_result(&send_half, seq, service_method, result).await;
        }
    }
}

async fn invoke(service: &Arc<Service>, method_name: &str, args: Value) -> Result<Value, RpcError> {
    match service.method(method_name) {
        Some(method) => method.invoke(args).await,
        None => Err(RpcError::UnknownMethod {
            service: service.name().to_string(),
            method: method_name.to_string(),
        }),
    }
}

async fn send_result(
    send_half: &SendHalf,
    seq: u64,
    service_method: String,
    result: Result<Value, RpcError>,
) {
    match result {
        Ok(reply) => {
            let header = Header::request(service_method, seq);
            let mut writer = send_half.lock().await;
            if let Err(err) = writer.write(&header, &reply).await {
                warn!("rpc server: failed to write response: {err}");
            }
        }
        Err(err) => send_error_response(send_half, seq, service_method, err).await,
    }
}

async fn send_error_response(
    send_half: &SendHalf,
    seq: u64,
    service_method: String,
    err: RpcError,
) {
    let mut header = Header::request(service_method, seq);
    header.error = err.as_header_error();
    let mut writer = send_half.lock().await;
    if let Err(write_err) = writer.write(&header, &error_sentinel()).await {
        warn!("rpc server: failed to write error response: {write_err}");
    }
}
