//! # MuPIF CLI
//!
//! Shared setup for MuPIF binaries: logging initialisation and resolution of
//! naming-service settings from flags and the environment.
//!
//! The `mupif` binary built from this crate covers:
//!
//! - `mupif ns`: run a naming service
//! - `mupif lookup` / `mupif list`: query it
//! - `mupif call`: invoke a method on a published application
//! - `mupif tunnel`: open an SSH tunnel to a daemon
//! - `mupif app-name`: print the published name of a job's application

pub mod config;
pub mod logging;

pub use config::NsSettings;
pub use logging::init_logging;
