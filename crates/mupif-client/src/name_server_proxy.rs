use mupif_common::auth::AuthConfig;
use mupif_common::protocol::error::Result;
use mupif_common::protocol::naming::{methods, ListArgs, NameArgs, RegisterArgs};
use mupif_common::protocol::{Uri, NAMESERVER_OBJECT_ID};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::proxy::Proxy;

/// Handle on a naming service, able to both resolve and publish names.
#[derive(Clone, Debug)]
pub struct NameServerProxy {
    proxy: Proxy,
}

impl NameServerProxy {
    /// Builds a handle without contacting the naming service.
    pub fn new(host: impl Into<String>, port: u16, auth: AuthConfig) -> Self {
        let uri = Uri::new(NAMESERVER_OBJECT_ID, host, port);
        Self {
            proxy: Proxy::new(uri, auth),
        }
    }

    /// Builds a handle and confirms, with an authenticated ping, that a naming
    /// service accepting our key answers on `host:port`.
    pub fn locate(host: impl Into<String>, port: u16, auth: AuthConfig, timeout: Duration) -> Result<Self> {
        let ns = Self::new(host, port, auth).with_timeout(timeout);
        ns.ping()?;
        Ok(ns)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.proxy = self.proxy.with_timeout(timeout);
        self
    }

    pub fn uri(&self) -> &Uri {
        self.proxy.uri()
    }

    pub fn auth(&self) -> &AuthConfig {
        self.proxy.auth()
    }

    pub fn timeout(&self) -> Duration {
        self.proxy.timeout()
    }

    pub fn ping(&self) -> Result<()> {
        self.proxy.call(methods::PING, Value::Null).map(|_| ())
    }

    /// Resolves `name` to the URI it was registered under.
    pub fn lookup(&self, name: &str) -> Result<Uri> {
        self.proxy.call_as(methods::LOOKUP, json!(NameArgs { name: name.to_string() }))
    }

    /// Binds `name` to `uri`, replacing an existing binding.
    pub fn register(&self, name: &str, uri: &Uri) -> Result<()> {
        self.register_with(name, uri, false)
    }

    /// Binds `name` to `uri`, failing if the name is already taken.
    pub fn register_safe(&self, name: &str, uri: &Uri) -> Result<()> {
        self.register_with(name, uri, true)
    }

    fn register_with(&self, name: &str, uri: &Uri, safe: bool) -> Result<()> {
        let args = RegisterArgs {
            name: name.to_string(),
            uri: uri.clone(),
            safe,
        };
        self.proxy.call(methods::REGISTER, json!(args)).map(|_| ())
    }

    /// Removes the binding of `name`; returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.proxy.call_as(methods::REMOVE, json!(NameArgs { name: name.to_string() }))
    }

    /// Lists bindings, optionally restricted to names starting with `prefix`.
    pub fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Uri>> {
        let args = ListArgs {
            prefix: prefix.map(str::to_string),
        };
        self.proxy.call_as(methods::LIST, json!(args))
    }
}

impl fmt::Display for NameServerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<NameServer {}>", self.uri())
    }
}
