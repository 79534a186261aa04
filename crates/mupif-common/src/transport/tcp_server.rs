use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::{Fault, Request, Response};
use crate::protocol::error::{MupifError, Result};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::MAX_MESSAGE_SIZE;

/// Async TCP server for long-lived shared services such as the naming
/// service.
///
/// Each accepted connection is served by its own tokio task, so one slow
/// client never holds up lookups from the others.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:9090")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await
            .map_err(|e| MupifError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
            .map_err(|e| MupifError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the server with the given request handler.
    ///
    /// This accepts connections in a loop and spawns an async task for each connection.
    /// Each connection processes multiple requests (keep-alive) until closed.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await
                .map_err(|e| MupifError::Connection(format!("Failed to accept connection: {}", e)))?;

            tracing::debug!(%peer_addr, "Connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler).await {
                    tracing::warn!(%peer_addr, "Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single TCP connection (async)
///
/// Processes multiple requests until the connection is closed.
async fn handle_connection<F, Fut>(
    mut stream: TcpStream,
    handler: Arc<F>,
) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
{
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::trace!("Connection closed by peer");
                return Ok(());
            }
            Err(e) => {
                return Err(MupifError::Connection(format!("Failed to read length: {}", e)));
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
        stream.read_exact(&mut buf).await
            .map_err(|e| MupifError::Connection(format!("Failed to read data: {}", e)))?;

        let request = match JsonCodec::decode_request(&buf) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Failed to decode request: {}", e);
                let error_response = Response::fault(0, Fault::InvalidArguments, e.to_string());
                let _ = send_response(&mut stream, &error_response).await;
                continue;
            }
        };

        let request_id = request.id;
        let response = match handler(request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Handler error: {}", e);
                Response::fault(request_id, Fault::Application, e.to_string())
            }
        };

        send_response(&mut stream, &response).await?;
    }
}

/// Send a response with length prefix
async fn send_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let encoded = JsonCodec::encode_response(response)?;

    let len = encoded.len() as u32;
    stream.write_all(&len.to_be_bytes()).await
        .map_err(|e| MupifError::Connection(format!("Failed to send response length: {}", e)))?;
    stream.write_all(&encoded).await
        .map_err(|e| MupifError::Connection(format!("Failed to send response data: {}", e)))?;
    stream.flush().await
        .map_err(|e| MupifError::Connection(format!("Failed to flush response: {}", e)))?;

    Ok(())
}
