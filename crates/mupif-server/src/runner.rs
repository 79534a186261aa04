//! Publishing an application: bind a daemon, register the application with it
//! and with the naming service, then serve requests.

use mupif_client::{connect_name_server, NameServerProxy, NamingServiceError, DEFAULT_NS_TIMEOUT};
use mupif_common::auth::AuthConfig;
use mupif_common::protocol::error::MupifError;
use mupif_common::protocol::{Uri, DEFAULT_NS_PORT};
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::application::Application;
use crate::daemon::{Daemon, DaemonConfig, DaemonError};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    NamingService(#[from] NamingServiceError),

    /// The object is registered with the daemon but not with the naming
    /// service. `server` still holds the bound daemon; running its request
    /// loop serves the object by URI only.
    #[error("Registered {} with the daemon but could not publish it as {name}: {source}", .server.uri())]
    Registration {
        name: String,
        source: MupifError,
        server: Box<RunningServer>,
    },

    #[error("Naming service call failed: {0}")]
    Remote(#[from] MupifError),
}

/// Everything [`start_app_server`] needs.
#[derive(Debug, Clone)]
pub struct AppServerConfig {
    pub daemon: DaemonConfig,
    pub ns_host: String,
    pub ns_port: u16,
    pub ns_timeout: Duration,
    /// Symbolic name to publish, usually built with `ns_app_name`
    pub name: String,
    pub auth: AuthConfig,
}

impl AppServerConfig {
    pub fn new(daemon: DaemonConfig, ns_host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            daemon,
            ns_host: ns_host.into(),
            ns_port: DEFAULT_NS_PORT,
            ns_timeout: DEFAULT_NS_TIMEOUT,
            name: name.into(),
            auth: AuthConfig::disabled(),
        }
    }

    pub fn with_ns_port(mut self, port: u16) -> Self {
        self.ns_port = port;
        self
    }

    pub fn with_ns_timeout(mut self, timeout: Duration) -> Self {
        self.ns_timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// A published application whose daemon has not started serving yet.
pub struct RunningServer {
    daemon: Daemon,
    ns: NameServerProxy,
    name: String,
    uri: Uri,
}

impl RunningServer {
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_server(&self) -> &NameServerProxy {
        &self.ns
    }

    pub fn daemon(&self) -> &Daemon {
        &self.daemon
    }

    pub fn daemon_mut(&mut self) -> &mut Daemon {
        &mut self.daemon
    }

    /// Serves requests until the process is killed. There is no
    /// deregistration; a restarted server replaces its own name binding.
    pub fn request_loop(mut self) -> ! {
        self.daemon.request_loop()
    }
}

impl fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningServer")
            .field("name", &self.name)
            .field("uri", &self.uri.to_string())
            .field("local_addr", &self.daemon.local_addr())
            .field("ns", &self.ns)
            .finish()
    }
}

/// Binds the daemon, connects to the naming service, runs the application's
/// registration hook, then registers the application with the daemon and
/// publishes its URI under `config.name`.
///
/// # Errors
///
/// - [`ServerError::Daemon`] when the daemon cannot bind
/// - [`ServerError::NamingService`] when the naming service is unreachable or
///   rejects the key
/// - [`ServerError::Registration`] when publishing the name fails; the daemon
///   registration is not rolled back and the error hands back the server
pub fn start_app_server<A: Application + 'static>(
    config: &AppServerConfig,
    mut app: A,
) -> Result<RunningServer, ServerError> {
    let mut daemon = Daemon::new(&config.daemon, config.auth.clone()).map_err(|e| {
        error!("{}", e);
        e
    })?;

    let ns = connect_name_server(&config.ns_host, config.ns_port, &config.auth, config.ns_timeout)?;

    app.register_hook(&mut daemon, &ns)?;

    let uri = daemon.register_application(app);
    let registered = ns.register(&config.name, &uri);
    let server = RunningServer {
        daemon,
        ns,
        name: config.name.clone(),
        uri,
    };

    if let Err(source) = registered {
        error!(
            "Could not register {} as {} on {}; it can only be served by URI: {}",
            server.uri, config.name, server.ns, source
        );
        return Err(ServerError::Registration {
            name: config.name.clone(),
            source,
            server: Box::new(server),
        });
    }

    info!(name = %config.name, uri = %server.uri, "Application published");
    Ok(server)
}

/// [`start_app_server`] followed by the request loop. Only returns on a
/// startup failure.
pub fn run_app_server<A: Application + 'static>(
    config: &AppServerConfig,
    app: A,
) -> Result<Infallible, ServerError> {
    let server = start_app_server(config, app)?;
    server.request_loop()
}
