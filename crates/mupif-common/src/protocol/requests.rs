use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

pub type RequestId = u64;
pub type MethodName = String;
pub type RpcArgs = serde_json::Value;

/// Wire method every registered application answers with its signature.
pub const GET_APPLICATION_SIGNATURE: &str = "get_application_signature";

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A remote call addressed to one registered object.
///
/// `hmac` is filled in by [`crate::auth::AuthConfig::sign_request`] when a
/// shared secret is configured and is left out of the signed bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub object: String,
    pub method: MethodName,
    pub args: RpcArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl Request {
    pub fn new(object: impl Into<String>, method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: generate_request_id(),
            object: object.into(),
            method: method.into(),
            args,
            hmac: None,
        }
    }

    /// Bytes covered by the message authentication code.
    pub fn signing_bytes(&self) -> Vec<u8> {
        // serde_json maps are ordered and float_roundtrip parses floats
        // exactly, so a decoded message re-encodes to the sender's bytes
        serde_json::to_vec(&(self.id, &self.object, &self.method, &self.args))
            .unwrap_or_default()
    }
}

fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // Upper 32 bits from the clock, lower 32 bits from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
