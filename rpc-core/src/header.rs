use serde::{Deserialize, Serialize};

/// Per-message envelope, codec-independent (spec wire format §6).
///
/// `service_method` is `"Service.Method"`. `seq` is assigned by the client and
/// is unique per connection for the connection's lifetime. `error` is empty on
/// success and carries a server-side failure message on responses; it is
/// never populated on requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    pub service_method: String,
    pub seq: u64,
    #[serde(default)]
    pub error: String,
}

impl Header {
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
