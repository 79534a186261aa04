//! Wire arguments of the naming-service methods.

use serde::{Deserialize, Serialize};

use super::uri::Uri;

/// Object id under which every naming service is reachable.
pub const NAMESERVER_OBJECT_ID: &str = "Mupif.NameServer";

/// Port a naming service listens on unless told otherwise.
pub const DEFAULT_NS_PORT: u16 = 9090;

/// Method names understood by the naming service.
pub mod methods {
    pub const PING: &str = "ping";
    pub const REGISTER: &str = "register";
    pub const LOOKUP: &str = "lookup";
    pub const REMOVE: &str = "remove";
    pub const LIST: &str = "list";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterArgs {
    pub name: String,
    pub uri: Uri,
    /// Reject the registration instead of replacing an existing binding
    #[serde(default)]
    pub safe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListArgs {
    #[serde(default)]
    pub prefix: Option<String>,
}
