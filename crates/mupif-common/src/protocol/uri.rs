//! Remote object addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::MupifError;

/// Scheme prefix of every object URI.
pub const URI_SCHEME: &str = "MUPIF";

/// Location of a registered remote object: `MUPIF:<object>@<host>:<port>`.
///
/// The host and port are the ones the daemon advertises, which may be a
/// NAT or tunnel address rather than the socket the daemon is bound to.
///
/// ```
/// use mupif_common::protocol::Uri;
///
/// let uri: Uri = "MUPIF:obj_1@10.0.0.5:44382".parse().unwrap();
/// assert_eq!(uri.object_id, "obj_1");
/// assert_eq!(uri.address(), "10.0.0.5:44382");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri {
    pub object_id: String,
    pub host: String,
    pub port: u16,
}

impl Uri {
    pub fn new(object_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            object_id: object_id.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` suitable for `ToSocketAddrs`; IPv6 literals are bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", URI_SCHEME, self.object_id, self.address())
    }
}

impl FromStr for Uri {
    type Err = MupifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(URI_SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| MupifError::InvalidUri(format!("'{}' does not start with {}:", s, URI_SCHEME)))?;

        // Object ids may contain '@'-free dotted names; the location is after the last '@'
        let (object_id, location) = rest
            .rsplit_once('@')
            .ok_or_else(|| MupifError::InvalidUri(format!("'{}' has no '@' separator", s)))?;
        if object_id.is_empty() {
            return Err(MupifError::InvalidUri(format!("'{}' has an empty object id", s)));
        }

        let (host, port) = location
            .rsplit_once(':')
            .ok_or_else(|| MupifError::InvalidUri(format!("'{}' has no port", s)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(MupifError::InvalidUri(format!("'{}' has an empty host", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| MupifError::InvalidUri(format!("'{}' has an invalid port: {}", s, e)))?;

        Ok(Uri::new(object_id, host, port))
    }
}

impl TryFrom<String> for Uri {
    type Error = MupifError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.to_string()
    }
}
