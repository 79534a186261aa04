//! Publishes an [`AverageApplication`] on a daemon and serves it until killed.
//!
//! ```bash
//! # Daemon reachable directly
//! average-server --host 0.0.0.0 --nat-host 10.0.0.5 --ns-host 10.0.0.2 --hkey mupif-secret-key
//!
//! # Daemon reached through an SSH tunnel forwarding local port 5555
//! average-server --host 127.0.0.1 --port 44382 --nat-host 127.0.0.1 --nat-port 5555
//! ```

use anyhow::Result;
use argh::FromArgs;
use average_server::AverageApplication;
use mupif_cli::{init_logging, NsSettings};
use mupif_client::ns_app_name;
use mupif_server::{run_app_server, AppServerConfig, DaemonConfig};
use std::path::PathBuf;

#[derive(FromArgs)]
/// serve the averaging demo application
struct Args {
    /// address the daemon binds to
    #[argh(option, default = "\"127.0.0.1\".into()")]
    host: String,

    /// port the daemon binds to
    #[argh(option, default = "44382")]
    port: u16,

    /// host advertised to clients (default: the bind host)
    #[argh(option)]
    nat_host: Option<String>,

    /// port advertised to clients (default: the bind port)
    #[argh(option)]
    nat_port: Option<u16>,

    /// naming service host (default: $MUPIF_NS_HOST or 127.0.0.1)
    #[argh(option)]
    ns_host: Option<String>,

    /// naming service port (default: $MUPIF_NS_PORT or 9090)
    #[argh(option)]
    ns_port: Option<u16>,

    /// shared HMAC secret (default: $MUPIF_HKEY)
    #[argh(option)]
    hkey: Option<String>,

    /// job identifier used in the published name
    #[argh(option, default = "\"job1\".into()")]
    job: String,

    /// application identifier used in the published name
    #[argh(option, default = "\"app2\".into()")]
    app: String,

    /// append log output to this file instead of stderr
    #[argh(option)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_logging(args.log_file.as_deref())?;

    let ns = NsSettings::resolve(args.ns_host, args.ns_port, args.hkey, None)?;

    let mut daemon = DaemonConfig::new(args.host, args.port);
    daemon.nat_host = args.nat_host;
    daemon.nat_port = args.nat_port;

    let config = AppServerConfig::new(daemon, ns.host, ns_app_name(&args.job, &args.app))
        .with_ns_port(ns.port)
        .with_ns_timeout(ns.timeout)
        .with_auth(ns.auth);

    match run_app_server(&config, AverageApplication::new()) {
        Ok(never) => match never {},
        // The error can hold the bound daemon, which is not Sync
        Err(e) => {
            tracing::error!("{}", e);
            Err(anyhow::anyhow!("{}", e))
        }
    }
}
