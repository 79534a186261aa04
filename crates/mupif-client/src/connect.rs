//! Connecting to the naming service and to applications published in it.

use mupif_common::auth::AuthConfig;
use mupif_common::protocol::error::MupifError;
use mupif_common::transport::TcpTransport;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::name_server_proxy::NameServerProxy;
use crate::proxy::Proxy;

/// Leading component of every published application name.
pub const NS_NAMESPACE: &str = "Mupif";

/// Default time allowed for reaching the naming service.
pub const DEFAULT_NS_TIMEOUT: Duration = Duration::from_secs(3);

/// Protocol version reported in naming-service diagnostics.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Failure to obtain a naming-service handle.
///
/// The two variants tell a network problem (nothing reachable on the port)
/// apart from a naming-service problem (something listens but does not answer
/// our authenticated ping).
#[derive(Error, Debug)]
pub enum NamingServiceError {
    #[error(
        "Can not connect to a LISTENING port of nameserver on {host}:{port}. \
         Does a firewall block INPUT or OUTPUT on the port? ({source})"
    )]
    Unreachable {
        host: String,
        port: u16,
        source: MupifError,
    },

    #[error(
        "Can not connect to NameServer on {host}:{port}. Is the NameServer running? \
         Does it run protocol version {version}? Do you have the correct hmac key \
         (key is now {key_hint})? ({source})"
    )]
    Locate {
        host: String,
        port: u16,
        version: &'static str,
        key_hint: String,
        source: MupifError,
    },
}

/// Connects to a naming service.
///
/// First checks that something accepts TCP connections on `host:port`, then
/// performs an authenticated ping with `auth`. A zero `timeout` falls back to
/// [`DEFAULT_NS_TIMEOUT`].
///
/// # Errors
///
/// Never exits the process; the caller decides whether a failure is fatal.
///
/// # Example
///
/// ```no_run
/// use mupif_client::{connect_name_server, DEFAULT_NS_TIMEOUT};
/// use mupif_common::AuthConfig;
///
/// let ns = connect_name_server("127.0.0.1", 9090, &AuthConfig::with_hmac_key("mupif-secret-key"), DEFAULT_NS_TIMEOUT)
///     .expect("naming service");
/// ```
pub fn connect_name_server(
    host: &str,
    port: u16,
    auth: &AuthConfig,
    timeout: Duration,
) -> Result<NameServerProxy, NamingServiceError> {
    let timeout = if timeout.is_zero() { DEFAULT_NS_TIMEOUT } else { timeout };
    let address = NameServerProxy::new(host, port, AuthConfig::disabled()).uri().address();

    if let Err(source) = TcpTransport::with_timeout(timeout).probe(&address) {
        let err = NamingServiceError::Unreachable {
            host: host.to_string(),
            port,
            source,
        };
        error!("{}", err);
        return Err(err);
    }
    debug!("Can connect to a LISTENING port of nameserver on {}:{}", host, port);

    match NameServerProxy::locate(host, port, auth.clone(), timeout) {
        Ok(ns) => {
            debug!(
                "Connected to NameServer on {}:{}. Protocol version on your local computer is {}",
                host, port, PROTOCOL_VERSION
            );
            Ok(ns)
        }
        Err(source) => {
            let err = NamingServiceError::Locate {
                host: host.to_string(),
                port,
                version: PROTOCOL_VERSION,
                key_hint: auth.key_hint(),
                source,
            };
            error!("{}", err);
            Err(err)
        }
    }
}

/// Resolves `name` through the naming service and returns a proxy that has
/// just answered a signature call.
///
/// Returns `None`, after logging why, when the name is not registered or the
/// registered application does not answer. The proxy uses the naming
/// service's key, and its timeout for connecting and for the signature
/// call. Later calls wait for their reply as long as the remote method
/// runs, since a solve step may take far longer than discovery. Liveness is
/// only checked once, here.
pub fn connect_app(ns: &NameServerProxy, name: &str) -> Option<Proxy> {
    let uri = match ns.lookup(name) {
        Ok(uri) => {
            debug!("Found URI {} from a nameServer {}", uri, ns);
            uri
        }
        Err(e) => {
            error!("Cannot find registered server {} on {}: {}", name, ns, e);
            return None;
        }
    };

    let app = Proxy::new(uri, ns.auth().clone()).with_timeout(ns.timeout());
    match app.get_application_signature() {
        Ok(signature) => {
            debug!("Connected to {}", signature);
            Some(app.with_reply_timeout(None))
        }
        Err(e) => {
            error!("Cannot connect to application {}. Is the server running? {}", name, e);
            None
        }
    }
}

/// Name under which application `app` of job `job` is published:
/// `Mupif.<job>.<app>`.
pub fn ns_app_name(job: &str, app: &str) -> String {
    format!("{}.{}.{}", NS_NAMESPACE, job, app)
}
