use crate::protocol::{Request, Response};
use crate::protocol::error::Result;

/// JSON codec for encoding/decoding RPC messages
///
/// Uses JSON serialization for compatibility with `serde_json::Value` types
/// used in `Request` args and `Response` result fields.
///
/// # Example
///
/// ```
/// use mupif_common::transport::JsonCodec;
/// use mupif_common::protocol::{Request, Response};
/// use serde_json::json;
///
/// let request = Request::new("obj_1", "solve_step", json!({"tstep": {"number": 1}}));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Fault;
    use serde_json::json;

    #[test]
    fn test_signed_request_survives_codec() {
        let mut request = Request::new("obj", "set_property", json!({"value": 0.25}));
        request.hmac = Some("ab".repeat(32));

        let encoded = JsonCodec::encode_request(&request).unwrap();
        let decoded = JsonCodec::decode_request(&encoded).unwrap();

        assert_eq!(request, decoded);
    }

    #[test]
    fn test_fault_response_survives_codec() {
        let response = Response::fault(123, Fault::Naming, "unknown name Mupif.job1.app9");

        let encoded = JsonCodec::encode_response(&response).unwrap();
        let decoded = JsonCodec::decode_response(&encoded).unwrap();

        assert_eq!(response, decoded);
        assert_eq!(decoded.fault, Some(Fault::Naming));
    }

    #[test]
    fn test_request_without_hmac_field_decodes() {
        let raw = br#"{"id":7,"object":"o","method":"m","args":{}}"#;
        let decoded = JsonCodec::decode_request(raw).unwrap();
        assert_eq!(decoded.id, 7);
        assert!(decoded.hmac.is_none());
    }
}
