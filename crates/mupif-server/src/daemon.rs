use mupif_common::auth::AuthConfig;
use mupif_common::protocol::error::MupifError;
use mupif_common::protocol::{Fault, Request, Response, Uri};
use mupif_common::transport::{JsonCodec, TcpTransport};
use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::{Application, ApplicationError, ApplicationObject, RemoteObject};

/// Default read/write timeout on accepted connections.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause after the first failed accept; doubles per consecutive failure.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Can not bind daemon on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("An object is already registered with id {0}")]
    DuplicateId(String),

    #[error("Failed to accept connection: {0}")]
    Accept(std::io::Error),

    #[error("Daemon connection error: {0}")]
    Connection(#[from] MupifError),
}

/// Where a daemon listens and where callers should reach it.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub host: String,
    /// Bind port; 0 picks a free one
    pub port: u16,
    /// Host advertised in URIs when callers come through NAT or a tunnel
    pub nat_host: Option<String>,
    pub nat_port: Option<u16>,
    pub connection_timeout: Duration,
}

impl DaemonConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            nat_host: None,
            nat_port: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    pub fn with_nat(mut self, nat_host: impl Into<String>, nat_port: u16) -> Self {
        self.nat_host = Some(nat_host.into());
        self.nat_port = Some(nat_port);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Serves registered objects over TCP, one connection at a time.
///
/// The daemon is single-threaded: a connection is served until the peer
/// closes it, and only then is the next one accepted. Proxies open a fresh
/// connection per call, so in practice every call is serviced to completion
/// before the next begins.
pub struct Daemon {
    listener: TcpListener,
    local_addr: SocketAddr,
    advertised_host: String,
    advertised_port: u16,
    connection_timeout: Duration,
    objects: BTreeMap<String, Box<dyn RemoteObject>>,
    auth: AuthConfig,
}

impl Daemon {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// [`DaemonError::Bind`] when the address is invalid or already in use.
    pub fn new(config: &DaemonConfig, auth: AuthConfig) -> Result<Self, DaemonError> {
        let addr = config.bind_address();
        let bind_err = |source| DaemonError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let advertised_host = config.nat_host.clone().unwrap_or_else(|| config.host.clone());
        let advertised_port = config.nat_port.unwrap_or(local_addr.port());

        info!(
            %local_addr,
            advertised = %format!("{}:{}", advertised_host, advertised_port),
            auth = %auth,
            "Daemon listening"
        );
        if config.nat_host.is_none() && local_addr.ip().is_unspecified() {
            warn!(
                "Daemon bound to {} without a NAT host; published URIs will not be reachable",
                config.host
            );
        }

        Ok(Self {
            listener,
            local_addr,
            advertised_host,
            advertised_port,
            connection_timeout: config.connection_timeout,
            objects: BTreeMap::new(),
            auth,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Host and port written into URIs of registered objects.
    pub fn location(&self) -> (&str, u16) {
        (&self.advertised_host, self.advertised_port)
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// Registers `object` under a freshly generated id.
    pub fn register(&mut self, object: impl RemoteObject + 'static) -> Uri {
        let object_id = format!("obj_{}", Uuid::new_v4().simple());
        self.objects.insert(object_id.clone(), Box::new(object));
        self.uri(object_id)
    }

    /// Registers `object` under a caller chosen id.
    pub fn register_with_id(
        &mut self,
        object_id: &str,
        object: impl RemoteObject + 'static,
    ) -> Result<Uri, DaemonError> {
        if self.objects.contains_key(object_id) {
            return Err(DaemonError::DuplicateId(object_id.to_string()));
        }
        self.objects.insert(object_id.to_string(), Box::new(object));
        Ok(self.uri(object_id.to_string()))
    }

    /// Registers an application; it additionally answers the signature call.
    pub fn register_application(&mut self, app: impl Application + 'static) -> Uri {
        self.register(ApplicationObject::new(app))
    }

    pub fn unregister(&mut self, object_id: &str) -> bool {
        self.objects.remove(object_id).is_some()
    }

    pub fn uri_for(&self, object_id: &str) -> Option<Uri> {
        self.objects
            .contains_key(object_id)
            .then(|| self.uri(object_id.to_string()))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn uri(&self, object_id: String) -> Uri {
        Uri::new(object_id, self.advertised_host.clone(), self.advertised_port)
    }

    /// Accepts and serves connections forever.
    ///
    /// Errors on individual connections are logged and never stop the loop.
    /// Failed accepts (e.g. out of file descriptors) back off before retrying.
    pub fn request_loop(&mut self) -> ! {
        info!(objects = self.objects.len(), "Entering request loop");
        let mut accept_failures: u32 = 0;
        loop {
            match self.serve_next() {
                Ok(()) => accept_failures = 0,
                Err(DaemonError::Accept(e)) => {
                    let delay = accept_backoff(accept_failures);
                    accept_failures = accept_failures.saturating_add(1);
                    warn!(retry_in_ms = delay.as_millis() as u64, "Failed to accept connection: {}", e);
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    accept_failures = 0;
                    warn!("Connection error: {}", e);
                }
            }
        }
    }

    /// Accepts one connection and serves it until the peer closes it.
    pub fn serve_next(&mut self) -> Result<(), DaemonError> {
        let (stream, peer_addr) = self.listener.accept().map_err(DaemonError::Accept)?;
        debug!(%peer_addr, "Connection established");
        self.serve_connection(stream)
    }

    fn serve_connection(&mut self, mut stream: TcpStream) -> Result<(), DaemonError> {
        stream
            .set_read_timeout(Some(self.connection_timeout))
            .map_err(MupifError::from)?;
        stream
            .set_write_timeout(Some(self.connection_timeout))
            .map_err(MupifError::from)?;

        while let Some(frame) = TcpTransport::receive_frame(&mut stream)? {
            let response = match JsonCodec::decode_request(&frame) {
                Ok(request) => self.handle_request(request),
                Err(e) => {
                    warn!("Failed to decode request: {}", e);
                    Response::fault(0, Fault::InvalidArguments, e.to_string())
                }
            };
            let encoded = JsonCodec::encode_response(&response)?;
            TcpTransport::send_message(&mut stream, &encoded)?;
        }

        debug!("Connection closed by peer");
        Ok(())
    }

    /// Authenticates, routes and dispatches one request; the response is
    /// signed with the daemon's key.
    pub fn handle_request(&mut self, request: Request) -> Response {
        let mut response = if !self.auth.verify_request(&request) {
            warn!(object = %request.object, method = %request.method, "Rejected request with invalid HMAC");
            Response::fault(request.id, Fault::Security, "HMAC verification failed; is the hkey correct?")
        } else {
            match self.objects.get_mut(&request.object) {
                None => Response::fault(
                    request.id,
                    Fault::UnknownObject,
                    format!("no object registered as {}", request.object),
                ),
                Some(object) => {
                    debug!(object = %request.object, method = %request.method, "Dispatching");
                    match object.dispatch(&request.method, request.args) {
                        Ok(value) => Response::success(request.id, value),
                        Err(e) => {
                            debug!(method = %request.method, "Call failed: {}", e);
                            let fault = match e {
                                ApplicationError::UnknownMethod(_) => Fault::UnknownMethod,
                                ApplicationError::InvalidArguments(_) => Fault::InvalidArguments,
                                ApplicationError::Api(_) => Fault::Application,
                            };
                            Response::fault(request.id, fault, e.to_string())
                        }
                    }
                }
            }
        };

        self.auth.sign_response(&mut response);
        response
    }
}

/// Delay before retrying after `failures` consecutive failed accepts.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_RETRY_DELAY
        .saturating_mul(1 << failures.min(16))
        .min(MAX_ACCEPT_RETRY_DELAY)
}
