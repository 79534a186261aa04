//! MuPIF Naming Service
//!
//! A directory mapping symbolic names (by convention `Mupif.<job>.<app>`) to
//! the URIs of registered remote objects. Servers publish themselves here and
//! clients resolve names to proxies.
//!
//! The service is itself reachable as the object
//! [`NAMESERVER_OBJECT_ID`](mupif_common::NAMESERVER_OBJECT_ID) and speaks the
//! same framed JSON protocol as every daemon. State is kept in memory only.

pub mod name_server;

pub use name_server::{NameServer, RunningNameServer};
