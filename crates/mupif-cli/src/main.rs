//! # MuPIF CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Run a naming service
//! mupif --hkey mupif-secret-key ns --bind 0.0.0.0:9090
//!
//! # Resolve and list published applications
//! mupif --ns-host 10.0.0.2 lookup Mupif.job1.app1
//! mupif list --prefix Mupif.job1.
//!
//! # Call a method on a published application (outputs raw JSON)
//! mupif call Mupif.job1.app1 get_property --args '{"property_id": "PID_CumulativeConcentration"}'
//!
//! # Forward local port 5555 to a daemon behind a gateway
//! mupif tunnel --remote-host 10.0.0.5 --user mupif --local-port 5555 --remote-port 44382 \
//!     --tunnel-host gateway.example.org --option -i --option ~/.ssh/id_rsa
//! ```
//!
//! Every failure is returned from `main`, which exits with status 1.

use anyhow::{anyhow, Context, Result};
use argh::FromArgs;
use mupif_cli::{init_logging, NsSettings};
use mupif_client::{
    connect_app, connect_name_server, ns_app_name, open_tunnel, NameServerProxy, TunnelClient, TunnelConfig,
};
use mupif_naming::RunningNameServer;
use std::path::PathBuf;

#[derive(FromArgs)]
/// MuPIF - naming service, remote application access and SSH tunnels
struct Cli {
    /// naming service host (default: $MUPIF_NS_HOST or 127.0.0.1)
    #[argh(option, long = "ns-host")]
    ns_host: Option<String>,

    /// naming service port (default: $MUPIF_NS_PORT or 9090)
    #[argh(option, long = "ns-port")]
    ns_port: Option<u16>,

    /// shared HMAC secret (default: $MUPIF_HKEY; empty disables authentication)
    #[argh(option, long = "hkey")]
    hkey: Option<String>,

    /// timeout for reaching the naming service, in milliseconds
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// append log output to this file instead of stderr
    #[argh(option, long = "log-file")]
    log_file: Option<PathBuf>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Ns(NsArgs),
    Lookup(LookupArgs),
    List(ListArgs),
    Call(CallArgs),
    Tunnel(TunnelArgs),
    AppName(AppNameArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "ns")]
/// run a naming service
struct NsArgs {
    /// address to bind (default: 0.0.0.0 and the naming service port)
    #[argh(option, short = 'b')]
    bind: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "lookup")]
/// print the URI registered under a name
struct LookupArgs {
    /// published name, e.g. Mupif.job1.app1
    #[argh(positional)]
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// list registered names and URIs
struct ListArgs {
    /// only names starting with this prefix
    #[argh(option, short = 'p')]
    prefix: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method on a published application
struct CallArgs {
    /// published name of the application
    #[argh(positional)]
    name: String,

    /// method to invoke
    #[argh(positional)]
    method: String,

    /// JSON arguments (default: null)
    #[argh(option, short = 'a', default = "\"null\".into()")]
    args: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "tunnel")]
/// open an SSH tunnel and keep it running in the foreground
struct TunnelArgs {
    /// host running the daemon
    #[argh(option)]
    remote_host: String,

    /// login on the tunnel host
    #[argh(option)]
    user: String,

    /// local port to forward
    #[argh(option)]
    local_port: u16,

    /// daemon port on the remote host
    #[argh(option)]
    remote_port: u16,

    /// ssh, autossh, manual or a path to a putty executable (default: ssh)
    #[argh(option, default = "\"ssh\".into()")]
    client: String,

    /// host to tunnel through (default: the remote host)
    #[argh(option)]
    tunnel_host: Option<String>,

    /// extra argument for the ssh client; repeat for several
    #[argh(option, long = "option")]
    options: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "app-name")]
/// print the published name of a job's application
struct AppNameArgs {
    /// job identifier
    #[argh(positional)]
    job: String,

    /// application identifier within the job
    #[argh(positional)]
    app: String,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();
    init_logging(cli.log_file.as_deref())?;

    let result = run(cli);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn run(cli: Cli) -> Result<()> {
    let settings = NsSettings::resolve(cli.ns_host, cli.ns_port, cli.hkey, cli.timeout_ms)?;

    match cli.command {
        Commands::Ns(args) => run_ns(&settings, args),
        Commands::Lookup(args) => {
            let ns = connect(&settings)?;
            let uri = ns
                .lookup(&args.name)
                .with_context(|| format!("Cannot find registered server {} on {}", args.name, ns))?;
            println!("{}", uri);
            Ok(())
        }
        Commands::List(args) => {
            let ns = connect(&settings)?;
            for (name, uri) in ns.list(args.prefix.as_deref())? {
                println!("{} {}", name, uri);
            }
            Ok(())
        }
        Commands::Call(args) => run_call(&settings, args),
        Commands::Tunnel(args) => run_tunnel(args),
        Commands::AppName(args) => {
            println!("{}", ns_app_name(&args.job, &args.app));
            Ok(())
        }
    }
}

fn connect(settings: &NsSettings) -> Result<NameServerProxy> {
    Ok(connect_name_server(
        &settings.host,
        settings.port,
        &settings.auth,
        settings.timeout,
    )?)
}

fn run_ns(settings: &NsSettings, args: NsArgs) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| format!("0.0.0.0:{}", settings.port));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let ns = RunningNameServer::spawn(&bind, settings.auth.clone())
            .await
            .with_context(|| format!("Can not start naming service on {}", bind))?;
        tracing::info!("Naming service ready at {}", ns.uri());
        ns.join().await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn run_call(settings: &NsSettings, args: CallArgs) -> Result<()> {
    let call_args: serde_json::Value =
        serde_json::from_str(&args.args).map_err(|e| anyhow!("Invalid JSON in args: {}", e))?;

    let ns = connect(settings)?;
    let app = connect_app(&ns, &args.name)
        .ok_or_else(|| anyhow!("Application {} is not reachable", args.name))?;
    let result = app.call(&args.method, call_args)?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_tunnel(args: TunnelArgs) -> Result<()> {
    let client: TunnelClient = args.client.parse()?;
    let mut config = TunnelConfig::new(args.remote_host, args.user, args.local_port, args.remote_port)
        .with_client(client)
        .with_options(args.options);
    if let Some(host) = args.tunnel_host {
        config = config.with_tunnel_host(host);
    }

    match open_tunnel(&config)? {
        Some(mut tunnel) => {
            tracing::info!(pid = tunnel.pid(), "Tunnel running on local port {}", tunnel.local_port());
            let status = tunnel.wait()?;
            tracing::info!("Tunnel process exited: {}", status);
            Ok(())
        }
        None => Ok(()),
    }
}
