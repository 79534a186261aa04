//! Shared-secret message authentication
//!
//! Daemons, the naming service and proxies can be configured with an HMAC key
//! (the "hkey" shared secret). When a key is configured every request and
//! response carries `hmac = hex(HMAC-SHA256(key, signing_bytes))`, and peers
//! reject messages whose code does not verify.
//!
//! # Security Model
//!
//! - The key is a shared secret between every participant of a job
//! - Codes are compared in constant time
//! - A keyed peer rejects unsigned messages and an unkeyed peer rejects signed
//!   ones, so a key mismatch is detected in both directions
//!
//! # Example
//!
//! ```
//! use mupif_common::auth::AuthConfig;
//! use mupif_common::protocol::Request;
//! use serde_json::json;
//!
//! let auth = AuthConfig::with_hmac_key("mupif-secret-key");
//! let mut request = Request::new("Mupif.NameServer", "ping", json!(null));
//! auth.sign_request(&mut request);
//! assert!(auth.verify_request(&request));
//! assert!(!AuthConfig::disabled().verify_request(&request));
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::protocol::{Request, Response};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration shared by every MuPIF endpoint.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// The shared secret if authentication is enabled, None if disabled
    hmac_key: Option<String>,
}

impl AuthConfig {
    /// Creates a configuration that signs and verifies with `hmac_key`.
    pub fn with_hmac_key(hmac_key: impl Into<String>) -> Self {
        Self {
            hmac_key: Some(hmac_key.into()),
        }
    }

    /// Creates a configuration without authentication.
    pub fn disabled() -> Self {
        Self { hmac_key: None }
    }

    /// Builds a configuration from an optional key; empty keys disable
    /// authentication.
    pub fn from_optional_key(hmac_key: Option<&str>) -> Self {
        match hmac_key {
            Some(key) if !key.is_empty() => Self::with_hmac_key(key),
            _ => Self::disabled(),
        }
    }

    /// Returns whether a key is configured.
    pub fn requires_auth(&self) -> bool {
        self.hmac_key.is_some()
    }

    /// Short, non-reversible hint of the configured key for diagnostics.
    ///
    /// Shows the first two characters and the length, e.g. `mu***(16)`.
    pub fn key_hint(&self) -> String {
        match &self.hmac_key {
            Some(key) => {
                let prefix: String = key.chars().take(2).collect();
                format!("{}***({})", prefix, key.chars().count())
            }
            None => "<none>".to_string(),
        }
    }

    /// Computes the hex MAC of `payload`, or `None` without a key.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        let key = self.hmac_key.as_ref()?;
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verifies `signature` against `payload`.
    ///
    /// Without a key only unsigned payloads verify; with a key only payloads
    /// carrying a matching code verify.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> bool {
        match (&self.hmac_key, signature) {
            (None, None) => true,
            (Some(key), Some(signature)) => {
                let Ok(expected) = hex::decode(signature) else {
                    return false;
                };
                let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
                    return false;
                };
                mac.update(payload);
                // verify_slice compares in constant time
                mac.verify_slice(&expected).is_ok()
            }
            _ => false,
        }
    }

    pub fn sign_request(&self, request: &mut Request) {
        request.hmac = self.sign(&request.signing_bytes());
    }

    pub fn verify_request(&self, request: &Request) -> bool {
        self.verify(&request.signing_bytes(), request.hmac.as_deref())
    }

    pub fn sign_response(&self, response: &mut Response) {
        response.hmac = self.sign(&response.signing_bytes());
    }

    pub fn verify_response(&self, response: &Response) -> bool {
        self.verify(&response.signing_bytes(), response.hmac.as_deref())
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hmac_key {
            Some(_key) => write!(f, "Hmac(*****)"),
            None => write!(f, "Disabled"),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
