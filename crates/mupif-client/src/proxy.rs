use mupif_common::auth::AuthConfig;
use mupif_common::protocol::error::{MupifError, Result};
use mupif_common::protocol::{Request, Uri, GET_APPLICATION_SIGNATURE};
use mupif_common::transport::TcpTransport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Client-side stand-in for one remote object.
///
/// Creates a fresh TCP connection for each call. A daemon serves one
/// connection at a time, so holding a connection open between calls would
/// lock every other client out of it.
#[derive(Clone)]
pub struct Proxy {
    uri: Uri,
    auth: AuthConfig,
    transport: TcpTransport,
}

impl Proxy {
    pub fn new(uri: Uri, auth: AuthConfig) -> Self {
        Self {
            uri,
            auth,
            transport: TcpTransport::new(),
        }
    }

    /// Sets the connect/read/write timeout used for every call.
    ///
    /// Also resets the reply timeout to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = TcpTransport::with_timeout(timeout);
        self
    }

    /// Sets how long a call waits for the reply. `None` waits until the
    /// remote method returns.
    pub fn with_reply_timeout(mut self, reply_timeout: Option<Duration>) -> Self {
        self.transport = self.transport.with_reply_timeout(reply_timeout);
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.transport.reply_timeout()
    }

    /// Invokes `method` on the remote object and returns its JSON result.
    ///
    /// # Errors
    ///
    /// - `Connection`/`Timeout` when the daemon cannot be reached
    /// - `Authentication` when the reply does not carry a valid code for our key
    /// - the typed error rebuilt from the reply's fault otherwise
    pub fn call(&self, method: &str, args: Value) -> Result<Value> {
        let mut request = Request::new(self.uri.object_id.clone(), method, args);
        self.auth.sign_request(&mut request);

        let mut stream = self.transport.connect(&self.uri.address())?;
        let response = self.transport.send_request(&mut stream, &request)?;
        // Connection is closed here when stream is dropped

        if !self.auth.verify_response(&response) {
            return Err(MupifError::Authentication(format!(
                "reply from {} failed HMAC verification",
                self.uri
            )));
        }

        response.into_result()
    }

    /// Invokes `method` and decodes the result into `T`.
    pub fn call_as<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T> {
        let value = self.call(method, args)?;
        serde_json::from_value(value).map_err(|e| {
            MupifError::InvalidResponse(format!("{} returned an unexpected value: {}", method, e))
        })
    }

    /// Lightweight liveness probe every registered application answers.
    pub fn get_application_signature(&self) -> Result<String> {
        self.call_as(GET_APPLICATION_SIGNATURE, Value::Null)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Proxy {}>", self.uri)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("uri", &self.uri.to_string())
            .field("auth", &self.auth)
            .field("timeout", &self.transport.timeout())
            .field("reply_timeout", &self.transport.reply_timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_proxy_display() {
        let proxy = Proxy::new(Uri::new("obj_1", "127.0.0.1", 4000), AuthConfig::disabled());
        assert_eq!(proxy.to_string(), "<Proxy MUPIF:obj_1@127.0.0.1:4000>");
    }

    #[test]
    fn test_proxy_debug_hides_key() {
        let proxy = Proxy::new(Uri::new("o", "h", 1), AuthConfig::with_hmac_key("secret"));
        let text = format!("{:?}", proxy);
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_call_unreachable_is_connection_error() {
        let proxy = Proxy::new(Uri::new("obj", "127.0.0.1", closed_port()), AuthConfig::disabled())
            .with_timeout(Duration::from_millis(500));
        let err = proxy.call("anything", json!(null)).unwrap_err();
        assert!(matches!(err, MupifError::Connection(_)), "{}", err);
    }

    #[test]
    fn test_with_timeout() {
        let proxy = Proxy::new(Uri::new("o", "h", 1), AuthConfig::disabled())
            .with_timeout(Duration::from_secs(2));
        assert_eq!(proxy.timeout(), Duration::from_secs(2));
        assert_eq!(proxy.reply_timeout(), Some(Duration::from_secs(2)));

        let proxy = proxy.with_reply_timeout(None);
        assert_eq!(proxy.timeout(), Duration::from_secs(2));
        assert_eq!(proxy.reply_timeout(), None);
    }
}
