#![forbid(unsafe_code)]
//! Wire types, the `Codec` trait and its JSON implementation, the codec
//! registry, the `RpcError` taxonomy, and service registration for a
//! symmetric RPC session runtime.
//!
//! This crate has no opinion about transports or concurrency; `rpc-server`
//! and `rpc-client` build the dispatch and multiplexing engines on top of
//! the types here.

mod codec;
mod error;
mod header;
mod options;
mod registry;
mod service;

pub use codec::{split_stream, Codec, CodecReader, CodecWriter, JsonCodec};
pub use error::{CodecError, RpcError};
pub use header::Header;
pub use options::{
    merge_with_defaults, read_handshake, write_handshake, HandshakeOptions, JSON_CODEC_TYPE,
    MAGIC_NUMBER,
};
pub use registry::CodecRegistry;
pub use service::{MethodDescriptor, Service, ServiceBuilder};

/// The canonical empty-body sentinel sent in place of a reply when the
/// server returns an error (spec §6).
pub fn error_sentinel() -> serde_json::Value {
    serde_json::Value::Null
}

/// Splits a `"Service.Method"` string. Fails with
/// [`RpcError::IllFormedServiceMethod`] if there isn't exactly one `.`
/// separator with non-empty parts on both sides (spec §4.4, §7).
pub fn split_service_method(service_method: &str) -> Result<(&str, &str), RpcError> {
    let mut parts = service_method.splitn(2, '.');
    let service = parts.next().filter(|s| !s.is_empty());
    let method = parts.next().filter(|s| !s.is_empty());
    match (service, method) {
        (Some(service), Some(method)) => Ok((service, method)),
        _ => Err(RpcError::IllFormedServiceMethod(service_method.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_well_formed_service_method() {
        assert_eq!(split_service_method("Arith.Sum").unwrap(), ("Arith", "Sum"));
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(split_service_method("ArithSum").is_err());
    }

    #[test]
    fn rejects_empty_method() {
        assert!(split_service_method("Arith.").is_err());
    }
}
