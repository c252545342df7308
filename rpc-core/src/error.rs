use std::time::Duration;

use thiserror::Error;

/// Errors raised while framing or (de)serializing a `(Header, Value)` pair
/// through a `Codec` (spec §4.1).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Clean EOF with nothing read: the peer closed the connection between
    /// messages. Not an error condition for the serve/receive loops.
    #[error("end of stream")]
    EndOfStream,
    /// EOF reached mid-frame.
    #[error("truncated stream: {0}")]
    TruncatedStream(String),
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for the one kind of read failure that should end a connection
    /// quietly rather than log a warning (spec §4.4 step 2).
    pub fn is_clean_eof(&self) -> bool {
        matches!(self, CodecError::EndOfStream)
    }
}

/// The error taxonomy from spec §7, spanning handshake, dispatch, and
/// client-multiplexer failures. Variants that must be fanned out to several
/// pending calls at once (`Transport`) carry an owned `String` rather than a
/// wrapped source error so that one underlying failure can produce several
/// independent `RpcError` values without requiring the whole enum to be
/// `Clone`.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc server: invalid magic number {0:#x}")]
    InvalidMagic(i64),

    #[error("rpc server: invalid codec type {0}")]
    UnknownCodec(String),

    #[error("rpc server: options error: {0}")]
    HandshakeDecode(#[source] CodecError),

    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormedServiceMethod(String),

    #[error("rpc server: can't find service {0}")]
    UnknownService(String),

    #[error("rpc server: can't find method {method} on service {service}")]
    UnknownMethod { service: String, method: String },

    #[error("rpc: reading body{0}")]
    BodyDecode(String),

    #[error("rpc server: request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    /// The registered method returned its own application-level error.
    #[error("{0}")]
    CallUser(String),

    /// Stream-level failure: tears down the connection and cascades to every
    /// pending call (spec §7).
    #[error("rpc: transport error: {0}")]
    Transport(String),

    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("rpc client: dial failed: {0}")]
    DialFailed(#[source] std::io::Error),

    #[error("rpc: client is shut down")]
    AlreadyShutdown,

    #[error("rpc client: call failed: cancelled")]
    Cancelled,

    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc: service name must be exported (start with an uppercase letter): {0}")]
    ServiceNotExported(String),
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::Transport(err.to_string())
    }
}

impl RpcError {
    /// The string carried on the wire in `Header::error` for this failure.
    /// Request-lookup and body-decode failures are reported inline per spec
    /// §7; everything else is a local/transport-level error not meant to
    /// cross the wire.
    pub fn as_header_error(&self) -> String {
        self.to_string()
    }
}
