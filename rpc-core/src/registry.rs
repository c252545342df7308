use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};

use crate::codec::{Codec, JsonCodec};
use crate::error::RpcError;
use crate::options::JSON_CODEC_TYPE;

/// Builds a `Codec` from the buffered-read and write halves of a connection
/// already split by [`crate::split_stream`], for one codec-type tag (spec
/// §4.2). Constructors take the already-split halves (not the raw stream) so
/// the handshake's `BufReader` — which may have buffered bytes the peer
/// pipelined right after the handshake — carries over into the codec.
type CodecConstructor<S> =
    Arc<dyn Fn(BufReader<ReadHalf<S>>, WriteHalf<S>) -> Box<dyn Codec> + Send + Sync>;

/// Explicitly-owned mapping from codec-type tag to a constructor (spec §4.2;
/// per §9's design note, not a process-global singleton — callers construct
/// and hold their own registry). Populated at startup and shared read-only
/// thereafter, so lookups never take a lock.
#[derive(Clone)]
pub struct CodecRegistry<S> {
    constructors: HashMap<String, CodecConstructor<S>>,
}

impl<S> CodecRegistry<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new() -> Self {
        CodecRegistry {
            constructors: HashMap::new(),
        }
    }

    /// Convenience constructor carrying just the JSON codec this crate
    /// ships.
    pub fn with_default_json() -> Self {
        let mut registry = Self::new();
        registry.register(JSON_CODEC_TYPE, |reader, writer| {
            Box::new(JsonCodec::from_parts(reader, writer)) as Box<dyn Codec>
        });
        registry
    }

    pub fn register(
        &mut self,
        codec_type: impl Into<String>,
        constructor: impl Fn(BufReader<ReadHalf<S>>, WriteHalf<S>) -> Box<dyn Codec>
            + Send
            + Sync
            + 'static,
    ) {
        self.constructors
            .insert(codec_type.into(), Arc::new(constructor));
    }

    /// Looks up and invokes the constructor for `codec_type`. Failure here is
    /// fatal for the connection being built (spec §4.2).
    pub fn build(
        &self,
        codec_type: &str,
        reader: BufReader<ReadHalf<S>>,
        writer: WriteHalf<S>,
    ) -> Result<Box<dyn Codec>, RpcError> {
        let constructor = self
            .constructors
            .get(codec_type)
            .ok_or_else(|| RpcError::UnknownCodec(codec_type.to_string()))?;
        Ok(constructor(reader, writer))
    }
}

impl<S> Default for CodecRegistry<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split_stream;
    use tokio::io::duplex;

    #[tokio::test]
    async fn builds_registered_codec() {
        let registry: CodecRegistry<tokio::io::DuplexStream> = CodecRegistry::with_default_json();
        let (a, _b) = duplex(64);
        let (reader, writer) = split_stream(a);
        assert!(registry.build(JSON_CODEC_TYPE, reader, writer).is_ok());
    }

    #[tokio::test]
    async fn unknown_codec_type_is_fatal() {
        let registry: CodecRegistry<tokio::io::DuplexStream> = CodecRegistry::with_default_json();
        let (a, _b) = duplex(64);
        let (reader, writer) = split_stream(a);
        let err = registry.build("application/gob", reader, writer).unwrap_err();
        assert!(matches!(err, RpcError::UnknownCodec(tag) if tag == "application/gob"));
    }
}
