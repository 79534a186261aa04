//! MuPIF Response Types
//!
//! This module defines the RPC response structure and the fault categories a
//! daemon or naming service can report back to the caller.

use serde::{Deserialize, Serialize};
use super::error::{MupifError, Result};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Category of a failed call.
///
/// The category travels on the wire next to the human readable message so
/// that the caller can rebuild a typed [`MupifError`] instead of matching on
/// strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The request failed shared-secret verification
    Security,
    /// No object is registered under the addressed id
    UnknownObject,
    /// The object has no method with the requested name
    UnknownMethod,
    /// The arguments could not be decoded for the method
    InvalidArguments,
    /// A naming-service operation was rejected (unknown or duplicate name)
    Naming,
    /// The remote method itself raised an error
    Application,
}

/// An RPC response returned by a daemon or the naming service.
///
/// # Fields
///
/// - `id`: The request ID this response corresponds to
/// - `success`: Whether the request succeeded
/// - `result`: The result value (present on success)
/// - `error`: Error message (present on failure)
/// - `fault`: Error category (present on failure)
/// - `hmac`: Message authentication code when a shared secret is configured
///
/// # Example
///
/// ```
/// use mupif_common::protocol::{Fault, Response};
/// use serde_json::json;
///
/// let success = Response::success(123, json!({"value": 0.5}));
/// assert!(success.success);
///
/// let failure = Response::fault(123, Fault::Application, "Unknown property ID");
/// assert!(!failure.success);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub success: bool,
    pub result: Option<RpcResult>,
    pub error: Option<String>,
    pub fault: Option<Fault>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl Response {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            success: true,
            result: Some(result),
            error: None,
            fault: None,
            hmac: None,
        }
    }

    /// Creates an error response of the given category.
    pub fn fault(id: RequestId, fault: Fault, error: impl Into<String>) -> Self {
        Response {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
            fault: Some(fault),
            hmac: None,
        }
    }

    /// Bytes covered by the message authentication code.
    pub fn signing_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&(self.id, self.success, &self.result, &self.error, &self.fault))
            .unwrap_or_default()
    }

    /// Converts the response into the call result, rebuilding typed errors
    /// from the fault category.
    pub fn into_result(self) -> Result<RpcResult> {
        if self.success {
            // A null result is decoded as a missing one
            return Ok(self.result.unwrap_or(RpcResult::Null));
        }

        let message = self.error.unwrap_or_else(|| "Unknown error".to_string());
        Err(match self.fault {
            Some(Fault::Security) => MupifError::Authentication(message),
            Some(Fault::UnknownObject) => MupifError::UnknownObject(message),
            Some(Fault::UnknownMethod) => MupifError::UnknownMethod(message),
            Some(Fault::InvalidArguments) => MupifError::InvalidArguments(message),
            Some(Fault::Naming) => MupifError::Naming(message),
            Some(Fault::Application) | None => MupifError::Remote(message),
        })
    }
}
