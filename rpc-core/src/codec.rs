use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

use crate::error::CodecError;
use crate::header::Header;

/// The read side of a bound codec: frames and decodes `Header`/`Value`
/// values off the stream. Exactly one task ever holds a `CodecReader` for a
/// given connection (spec §5: "the reader is the only reader of the
/// codec") so it carries no internal locking.
#[async_trait]
pub trait CodecReader: Send {
    /// Reads the next header frame. `Err(CodecError::EndOfStream)` signals a
    /// clean EOF between messages; any other error is a truncated or
    /// malformed frame.
    async fn read_header(&mut self) -> Result<Header, CodecError>;

    /// Reads the body paired with the most recently read header. Callers
    /// that have nowhere to put the value (absent pending call, or a header
    /// that already carried an error) still call this to drain the frame
    /// before reading the next header — there is no separate peek/skip.
    async fn read_body(&mut self) -> Result<Value, CodecError>;
}

/// The write side of a bound codec. Every caller that wants to write must
/// serialize through an external lock (the per-connection send mutex, §5);
/// the codec guarantees only that a single `write` call emits one complete,
/// uninterleaved `(header, body)` unit.
#[async_trait]
pub trait CodecWriter: Send {
    async fn write(&mut self, header: &Header, body: &Value) -> Result<(), CodecError>;

    /// Shuts down the write half of the underlying stream (spec §4.1: a
    /// codec exposes "three operations and a close"). The peer observes EOF
    /// on its next read once this returns, which is what `Client::close`
    /// (spec §4.5) relies on to propagate shutdown promptly instead of
    /// waiting for the codec to be dropped.
    async fn shutdown(&mut self) -> Result<(), CodecError>;
}

/// Frames and serializes `(Header, Value)` pairs over a bound byte stream
/// (spec §4.1). `split` hands independent ownership of the read and write
/// sides to separate tasks — the server's single reader loop and its worker
/// pool, or the client's receiver task and its calling tasks — without
/// requiring either side to lock around the other's potentially
/// long-pending operation.
#[async_trait]
pub trait Codec: CodecReader + CodecWriter {
    fn split(self: Box<Self>) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>);
}

/// The read half of the one codec this crate ships: newline-delimited JSON,
/// one JSON value per line.
pub struct JsonCodecReader<S> {
    reader: BufReader<ReadHalf<S>>,
    line: String,
}

/// The write half of the one codec this crate ships.
pub struct JsonCodecWriter<S> {
    writer: WriteHalf<S>,
}

/// Newline-delimited JSON codec: header line immediately followed by body
/// line. JSON self-delimits, so line framing is all that needs adding.
pub struct JsonCodec<S> {
    reader: JsonCodecReader<S>,
    writer: JsonCodecWriter<S>,
}

/// Splits a stream into buffered-read and write halves without losing any
/// bytes already buffered between a prior read (e.g. the handshake, spec
/// §4.4 step 1, which runs before any codec exists) and codec construction:
/// reusing the same `BufReader` for both means pipelined bytes the peer
/// wrote right after the handshake are never dropped.
pub fn split_stream<S>(stream: S) -> (BufReader<ReadHalf<S>>, WriteHalf<S>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (BufReader::new(read_half), write_half)
}

impl<S> JsonCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = split_stream(stream);
        Self::from_parts(reader, writer)
    }

    /// Builds a codec from halves already produced by [`split_stream`],
    /// preserving whatever the handshake's `BufReader` had buffered.
    pub fn from_parts(reader: BufReader<ReadHalf<S>>, writer: WriteHalf<S>) -> Self {
        JsonCodec {
            reader: JsonCodecReader {
                reader,
                line: String::new(),
            },
            writer: JsonCodecWriter { writer },
        }
    }
}

impl<S> JsonCodecReader<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_line(&mut self) -> Result<Option<&str>, CodecError> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line).await?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = self.line.trim_end_matches(['\n', '\r']);
        Ok(Some(trimmed))
    }
}

#[async_trait]
impl<S> CodecReader for JsonCodecReader<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_header(&mut self) -> Result<Header, CodecError> {
        match self.read_line().await? {
            None => Err(CodecError::EndOfStream),
            Some(line) if line.is_empty() => {
                Err(CodecError::TruncatedStream("empty header frame".into()))
            }
            Some(line) => serde_json::from_str(line).map_err(CodecError::Decode),
        }
    }

    async fn read_body(&mut self) -> Result<Value, CodecError> {
        match self.read_line().await? {
            None => Err(CodecError::TruncatedStream(
                "stream ended before body frame".into(),
            )),
            Some(line) if line.is_empty() => Ok(Value::Null),
            Some(line) => serde_json::from_str(line).map_err(CodecError::Decode),
        }
    }
}

#[async_trait]
impl<S> CodecWriter for JsonCodecWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&mut self, header: &Header, body: &Value) -> Result<(), CodecError> {
        let header_line = serde_json::to_string(header).map_err(CodecError::Decode)?;
        let body_line = serde_json::to_string(body).map_err(CodecError::Decode)?;
        self.writer.write_all(header_line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.write_all(body_line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<S> CodecReader for JsonCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_header(&mut self) -> Result<Header, CodecError> {
        self.reader.read_header().await
    }

    async fn read_body(&mut self) -> Result<Value, CodecError> {
        self.reader.read_body().await
    }
}

#[async_trait]
impl<S> CodecWriter for JsonCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&mut self, header: &Header, body: &Value) -> Result<(), CodecError> {
        self.writer.write(header, body).await
    }

    async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.writer.shutdown().await
    }
}

impl<S> Codec for JsonCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn split(self: Box<Self>) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>) {
        let JsonCodec { reader, writer } = *self;
        (Box::new(reader), Box::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_header_and_body() {
        let (client, server) = duplex(4096);
        let mut writer = JsonCodec::new(client);
        let mut reader = JsonCodec::new(server);

        let header = Header::request("Arith.Sum", 1);
        let body = serde_json::json!({"A": 3, "B": 4});
        writer.write(&header, &body).await.unwrap();

        let got_header = reader.read_header().await.unwrap();
        let got_body = reader.read_body().await.unwrap();
        assert_eq!(got_header, header);
        assert_eq!(got_body, body);
    }

    #[tokio::test]
    async fn clean_close_is_end_of_stream() {
        let (client, server) = duplex(16);
        drop(client);
        let mut reader = JsonCodec::new(server);
        let err = reader.read_header().await.unwrap_err();
        assert!(err.is_clean_eof());
    }

    #[tokio::test]
    async fn shutdown_makes_the_peer_observe_eof() {
        let (client, server) = duplex(4096);
        let mut writer = JsonCodec::new(client);
        let mut reader = JsonCodec::new(server);

        writer.shutdown().await.unwrap();

        let err = reader.read_header().await.unwrap_err();
        assert!(err.is_clean_eof());
    }

    #[tokio::test]
    async fn split_halves_can_be_owned_independently() {
        let (client, server) = duplex(4096);
        let writer_codec: Box<dyn Codec> = Box::new(JsonCodec::new(client));
        let (_writer_read_half, mut writer_half) = writer_codec.split();

        let reader_codec: Box<dyn Codec> = Box::new(JsonCodec::new(server));
        let (mut reader_half, _reader_write_half) = reader_codec.split();

        let header = Header::request("Arith.Sum", 7);
        let body = serde_json::json!({"A": 1, "B": 2});
        writer_half.write(&header, &body).await.unwrap();

        assert_eq!(reader_half.read_header().await.unwrap(), header);
        assert_eq!(reader_half.read_body().await.unwrap(), body);
    }
}
