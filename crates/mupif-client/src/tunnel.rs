//! SSH port forwarding for reaching daemons behind firewalls or NAT.
//!
//! A tunnel forwards `127.0.0.1:<local_port>` through `<user>@<tunnel_host>`
//! to `<remote_host>:<remote_port>`. The forwarding client runs as a separate
//! process that outlives the call which started it.
//!
//! The command is always built as an argument vector; no value is ever passed
//! through a shell. Public keys must be installed on the tunnel host, since
//! the client cannot answer a password prompt.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Unknown ssh client '{0}'; expected ssh, autossh, a path to a putty executable, or manual")]
    UnknownClient(String),

    #[error("Tunnel process error: {0}")]
    Io(#[from] std::io::Error),
}

/// Program used to establish the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelClient {
    /// OpenSSH `ssh`
    Ssh,
    /// `autossh`, which restarts the forward when it drops
    Autossh,
    /// A PuTTY-family executable given by path (typically on Windows)
    Putty(PathBuf),
    /// Spawn nothing; log the commands the user should run instead
    Manual,
}

impl TunnelClient {
    /// Executable to spawn, `None` for manual mode.
    pub fn program(&self) -> Option<PathBuf> {
        match self {
            TunnelClient::Ssh => Some(PathBuf::from("ssh")),
            TunnelClient::Autossh => Some(PathBuf::from("autossh")),
            TunnelClient::Putty(path) => Some(path.clone()),
            TunnelClient::Manual => None,
        }
    }
}

impl FromStr for TunnelClient {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(TunnelClient::Ssh),
            "autossh" => Ok(TunnelClient::Autossh),
            "manual" => Ok(TunnelClient::Manual),
            other if other.to_lowercase().contains("putty") => {
                Ok(TunnelClient::Putty(PathBuf::from(other)))
            }
            other => Err(TunnelError::UnknownClient(other.to_string())),
        }
    }
}

/// Bounded, exponentially backed-off wait for the forwarded port to accept.
///
/// - Attempt 0: probe immediately
/// - Attempt n: wait `initial_backoff_ms * multiplier^(n-1)`, capped at
///   `max_backoff_ms`, then probe
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Total number of probes before giving up
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Connect timeout of each probe
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            probe_timeout_ms: 500,
        }
    }
}

impl ReadinessConfig {
    /// Delay before probe number `attempt` (1-based; attempt 0 has none).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let backoff_ms = (self.initial_backoff_ms as f64 * multiplier) as u64;
        Duration::from_millis(backoff_ms.min(self.max_backoff_ms))
    }
}

/// Everything needed to open one tunnel.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub remote_host: String,
    pub user: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub client: TunnelClient,
    /// Extra client arguments, e.g. `["-i", "/home/user/.ssh/id_rsa"]`
    pub options: Vec<String>,
    /// Host to tunnel through; defaults to `remote_host`
    pub tunnel_host: Option<String>,
    pub readiness: ReadinessConfig,
}

impl TunnelConfig {
    pub fn new(remote_host: impl Into<String>, user: impl Into<String>, local_port: u16, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            user: user.into(),
            local_port,
            remote_port,
            client: TunnelClient::Ssh,
            options: Vec::new(),
            tunnel_host: None,
            readiness: ReadinessConfig::default(),
        }
    }

    pub fn with_client(mut self, client: TunnelClient) -> Self {
        self.client = client;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tunnel_host(mut self, tunnel_host: impl Into<String>) -> Self {
        self.tunnel_host = Some(tunnel_host.into());
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// Host the client logs into; an empty or missing value means `remote_host`.
    pub fn tunnel_host(&self) -> &str {
        match self.tunnel_host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => &self.remote_host,
        }
    }

    /// `-L` forward specification: `<local>:<remote_host>:<remote_port>`.
    pub fn forward_spec(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.tunnel_host())
    }

    /// Client arguments: `-L <spec> <user>@<host> -N <options...>`.
    ///
    /// OpenSSH clients also get `-o ExitOnForwardFailure=yes` before the
    /// options, so a forward that cannot bind ends the process.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-L".to_string(),
            self.forward_spec(),
            self.destination(),
            "-N".to_string(),
        ];
        if matches!(self.client, TunnelClient::Ssh | TunnelClient::Autossh) {
            args.push("-o".to_string());
            args.push("ExitOnForwardFailure=yes".to_string());
        }
        args.extend(self.options.iter().cloned());
        args
    }

    /// Commands a user can run by hand, as printed in manual mode.
    pub fn manual_instructions(&self) -> [String; 2] {
        let ssh = format!("ssh -L {} {}", self.forward_spec(), self.destination());
        let mut putty = format!("putty.exe -L {} {}", self.forward_spec(), self.destination());
        for option in &self.options {
            putty.push(' ');
            putty.push_str(option);
        }
        [ssh, putty]
    }

    fn command(&self) -> Option<Command> {
        let program = self.client.program()?;
        let mut command = Command::new(program);
        command.args(self.args()).stdin(Stdio::null());
        Some(command)
    }
}

/// A running tunnel process.
///
/// Dropping the handle leaves the process running; call [`Tunnel::close`] to
/// stop it.
#[derive(Debug)]
pub struct Tunnel {
    child: Child,
    local_port: u16,
}

impl Tunnel {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Returns the exit status if the process has already stopped.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, TunnelError> {
        Ok(self.child.try_wait()?)
    }

    /// Blocks until the tunnel process exits.
    pub fn wait(&mut self) -> Result<ExitStatus, TunnelError> {
        Ok(self.child.wait()?)
    }

    /// Kills the tunnel process and reaps it.
    pub fn close(mut self) -> Result<(), TunnelError> {
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        self.child.wait()?;
        info!(local_port = self.local_port, "Tunnel closed");
        Ok(())
    }
}

/// Outcome of waiting for a freshly spawned tunnel.
#[derive(Debug)]
enum Readiness {
    Ready { attempts: u32 },
    Exited(ExitStatus),
    TimedOut,
}

/// Opens a tunnel as described by `config`.
///
/// Returns `Ok(None)` without raising when:
/// - the client is [`TunnelClient::Manual`] (instructions are logged instead)
/// - another process already listens on the local port
/// - the client executable cannot be started
/// - the client exits, or the forwarded port never accepts connections,
///   within the readiness budget (the process is killed)
///
/// # Errors
///
/// Only I/O errors while killing a failed tunnel process. Unknown client
/// names are rejected earlier, by [`TunnelClient::from_str`].
pub fn open_tunnel(config: &TunnelConfig) -> Result<Option<Tunnel>, TunnelError> {
    let Some(mut command) = config.command() else {
        let [ssh, putty] = config.manual_instructions();
        info!(
            "If ssh tunnel does not exist, do it manually using a command e.g. {} , or {}",
            ssh, putty
        );
        return Ok(None);
    };

    // Readiness is judged by connecting to the local port, so it must not
    // already belong to someone else
    if let Err(e) = TcpListener::bind((Ipv4Addr::LOCALHOST, config.local_port)) {
        error!(
            local_port = config.local_port,
            "Creation of a tunnel failed. Local port is not available: {}", e
        );
        return Ok(None);
    }

    debug!("Creating tunnel via command: {:?}", command);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(
                "Creation of a tunnel failed. Can not execute the command {:?}: {}",
                command, e
            );
            return Ok(None);
        }
    };

    match wait_until_ready(&mut child, config.local_port, &config.readiness) {
        Readiness::Ready { attempts } => {
            info!(
                pid = child.id(),
                local_port = config.local_port,
                attempts,
                "Tunnel to {}:{} via {} is up",
                config.remote_host,
                config.remote_port,
                config.tunnel_host()
            );
            Ok(Some(Tunnel {
                child,
                local_port: config.local_port,
            }))
        }
        Readiness::Exited(status) => {
            error!("Tunnel process exited before the forward was up: {}", status);
            Ok(None)
        }
        Readiness::TimedOut => {
            warn!(
                local_port = config.local_port,
                "Tunnel did not accept connections after {} attempts; killing it",
                config.readiness.max_attempts
            );
            child.kill()?;
            child.wait()?;
            Ok(None)
        }
    }
}

fn wait_until_ready(child: &mut Child, local_port: u16, readiness: &ReadinessConfig) -> Readiness {
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, local_port));
    let probe_timeout = Duration::from_millis(readiness.probe_timeout_ms.max(1));

    for attempt in 0..readiness.max_attempts {
        std::thread::sleep(readiness.backoff(attempt));

        if let Ok(Some(status)) = child.try_wait() {
            return Readiness::Exited(status);
        }
        if TcpStream::connect_timeout(&target, probe_timeout).is_ok() {
            return Readiness::Ready { attempts: attempt + 1 };
        }
    }

    match child.try_wait() {
        Ok(Some(status)) => Readiness::Exited(status),
        _ => Readiness::TimedOut,
    }
}
