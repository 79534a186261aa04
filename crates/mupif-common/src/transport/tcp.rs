use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::protocol::{Request, Response};
use crate::protocol::error::{Result, MupifError};
use crate::transport::codec::JsonCodec;

/// Default timeout for TCP operations (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum accepted frame size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Blocking TCP transport used by proxies and daemons.
///
/// # Wire Protocol
///
/// Messages are sent with a 4-byte length prefix (big-endian u32) followed
/// by the JSON-encoded data:
///
/// ```text
/// [4-byte length] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use mupif_common::transport::TcpTransport;
/// use mupif_common::protocol::Request;
/// use serde_json::json;
///
/// let transport = TcpTransport::new();
/// let mut stream = transport.connect("127.0.0.1:9090").unwrap();
///
/// let request = Request::new("Mupif.NameServer", "ping", json!(null));
/// let response = transport.send_request(&mut stream, &request).unwrap();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    timeout: Duration,
    reply_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Creates a transport with the default 5 second timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a transport whose connect, read and write operations time out
    /// after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            reply_timeout: Some(timeout),
        }
    }

    /// Replaces the read timeout applied while waiting for a reply. `None`
    /// waits for as long as the peer takes; connecting and sending keep the
    /// regular timeout.
    pub fn with_reply_timeout(mut self, reply_timeout: Option<Duration>) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout
    }

    /// Checks that something accepts TCP connections on `addr`, then closes
    /// the connection without sending anything.
    ///
    /// This tells a blocked or unreachable port apart from a port that is
    /// open but does not speak the protocol.
    pub fn probe(&self, addr: &str) -> Result<()> {
        let stream = self.connect_raw(addr)?;
        drop(stream);
        Ok(())
    }

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one succeeds. The returned stream has read and write
    /// timeouts configured.
    pub fn connect(&self, addr: &str) -> Result<TcpStream> {
        let stream = self.connect_raw(addr)?;
        stream
            .set_read_timeout(self.reply_timeout)
            .map_err(|e| MupifError::Connection(format!("Failed to set read timeout: {}", e)))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| MupifError::Connection(format!("Failed to set write timeout: {}", e)))?;
        Ok(stream)
    }

    fn connect_raw(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| MupifError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }

        Err(MupifError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    /// Sends a request and waits for the matching response.
    pub fn send_request(&self, stream: &mut TcpStream, request: &Request) -> Result<Response> {
        let encoded = JsonCodec::encode_request(request)?;
        Self::send_message(stream, &encoded).map_err(|e| self.retag_timeout(e))?;

        let response_data = Self::receive_frame(stream)
            .map_err(|e| self.retag_reply_timeout(e))?
            .ok_or_else(|| MupifError::Connection("Connection closed before response".to_string()))?;
        let response = JsonCodec::decode_response(&response_data)?;

        if response.id != request.id {
            return Err(MupifError::InvalidResponse(format!(
                "Response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        Ok(response)
    }

    /// Sends a message with length prefix.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    pub fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(MupifError::InvalidRequest(format!(
                "Message too large: {} bytes (max {} bytes)",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .map_err(|e| Self::map_io_error(e, "writing length prefix"))?;
        stream
            .write_all(data)
            .map_err(|e| Self::map_io_error(e, "writing data"))?;
        stream
            .flush()
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Receives one length-prefixed frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly before
    /// sending a new length prefix.
    pub fn receive_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match stream.read(&mut len_buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(MupifError::Connection(
                        "reading length prefix: Connection lost".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Self::map_io_error(e, "reading length prefix")),
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(MupifError::InvalidResponse(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(Some(buf))
    }

    /// Map IO errors to appropriate MupifError variants
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    fn map_io_error(err: std::io::Error, context: &str) -> MupifError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                MupifError::Timeout(DEFAULT_TIMEOUT.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => {
                MupifError::Connection(format!("{}: Connection lost", context))
            }
            _ => MupifError::Io(err),
        }
    }

    /// Reports the configured timeout rather than the default one.
    fn retag_timeout(&self, err: MupifError) -> MupifError {
        Self::retag(err, self.timeout)
    }

    fn retag_reply_timeout(&self, err: MupifError) -> MupifError {
        Self::retag(err, self.reply_timeout.unwrap_or(self.timeout))
    }

    fn retag(err: MupifError, timeout: Duration) -> MupifError {
        match err {
            MupifError::Timeout(_) => MupifError::Timeout(timeout.as_millis() as u64),
            other => other,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_transport_default_timeout() {
        assert_eq!(TcpTransport::default().timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_tcp_transport_custom_timeout() {
        let transport = TcpTransport::with_timeout(Duration::from_millis(250));
        assert_eq!(transport.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_reply_timeout_follows_timeout_until_replaced() {
        let transport = TcpTransport::with_timeout(Duration::from_millis(250));
        assert_eq!(transport.reply_timeout(), Some(Duration::from_millis(250)));

        let transport = transport.with_reply_timeout(None);
        assert_eq!(transport.reply_timeout(), None);
        assert_eq!(transport.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_unbounded_reply_timeout_applies_to_stream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let stream = TcpTransport::new().with_reply_timeout(None).connect(&addr).unwrap();
        assert_eq!(stream.read_timeout().unwrap(), None);
        assert_eq!(stream.write_timeout().unwrap(), Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_invalid_address_is_connection_error() {
        let transport = TcpTransport::new();
        let err = transport.connect("not an address").unwrap_err();
        assert!(matches!(err, MupifError::Connection(_)));
    }

    #[test]
    fn test_probe_listening_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(TcpTransport::new().probe(&addr).is_ok());
    }
}
