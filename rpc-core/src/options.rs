use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;

/// Fixed magic number every handshake `HandshakeOptions` must carry (spec §3, §6).
pub const MAGIC_NUMBER: i64 = 0x3bef5c;

/// Codec tag for the one codec this crate ships (spec §4.1: "at least one
/// codec (the default) must be provided").
pub const JSON_CODEC_TYPE: &str = "application/json";

/// The per-connection handshake record, sent once by the client before any
/// request (spec §3). Field names map to the wire schema in spec §6:
/// `MagicNumber`, `CodecType`, `ConnectionTimeout`, `HandleTimeout`, the
/// latter two carried as nanosecond counts for parity with the source
/// implementation's `time.Duration` encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HandshakeOptions {
    pub magic_number: i64,
    pub codec_type: String,
    /// Nanoseconds. Client-side only: bounds `dial` + handshake.
    #[serde(default)]
    pub connection_timeout: i64,
    /// Nanoseconds. Ignored by the server (spec §6); it applies its own
    /// configured value. Carried so older/newer peers round-trip it.
    #[serde(default)]
    pub handle_timeout: i64,
}

impl HandshakeOptions {
    pub fn connection_timeout(&self) -> Duration {
        nanos_to_duration(self.connection_timeout)
    }

    pub fn handle_timeout(&self) -> Duration {
        nanos_to_duration(self.handle_timeout)
    }
}

fn nanos_to_duration(nanos: i64) -> Duration {
    if nanos <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

impl Default for HandshakeOptions {
    /// `connection_timeout` defaults to 10s; `handle_timeout` defaults to 0
    /// (unbounded), per spec §3.
    fn default() -> Self {
        HandshakeOptions {
            magic_number: MAGIC_NUMBER,
            codec_type: JSON_CODEC_TYPE.to_string(),
            connection_timeout: Duration::from_secs(10).as_nanos() as i64,
            handle_timeout: 0,
        }
    }
}

/// Merges a partially-filled `HandshakeOptions` onto the defaults, the way
/// `dial` does: magic is always forced, an empty codec tag becomes the
/// default, and a missing `HandshakeOptions` altogether yields the defaults
/// unchanged (spec §4.6).
pub fn merge_with_defaults(opt: Option<HandshakeOptions>) -> HandshakeOptions {
    let defaults = HandshakeOptions::default();
    match opt {
        None => defaults,
        Some(mut opt) => {
            opt.magic_number = defaults.magic_number;
            if opt.codec_type.is_empty() {
                opt.codec_type = defaults.codec_type;
            }
            opt
        }
    }
}

/// Writes the one-time handshake `HandshakeOptions` record (spec §6: a
/// single JSON value, bytes `0..K` of the connection). Always goes out
/// before any codec-framed message.
pub async fn write_handshake<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opt: &HandshakeOptions,
) -> Result<(), CodecError> {
    let line = serde_json::to_string(opt).map_err(CodecError::Decode)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the one-time handshake record (spec §4.4 step 1, §6). `Err(EndOfStream)`
/// means the peer closed the connection before sending one.
pub async fn read_handshake<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<HandshakeOptions, CodecError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(CodecError::EndOfStream);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    serde_json::from_str(trimmed).map_err(CodecError::Decode)
}
