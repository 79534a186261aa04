pub mod application;
pub mod daemon;
pub mod runner;

pub use application::{decode_args, Application, ApplicationError, RemoteObject};
pub use daemon::{Daemon, DaemonConfig, DaemonError, DEFAULT_CONNECTION_TIMEOUT};
pub use runner::{run_app_server, start_app_server, AppServerConfig, RunningServer, ServerError};
