//! Naming-service settings shared by every command that talks to one.
//!
//! Each setting comes from its command-line flag when given, else from the
//! environment, else from a default.

use anyhow::{Context, Result};
use mupif_client::DEFAULT_NS_TIMEOUT;
use mupif_common::protocol::DEFAULT_NS_PORT;
use mupif_common::AuthConfig;
use std::time::Duration;

/// Shared secret of the job
pub const ENV_HKEY: &str = "MUPIF_HKEY";
pub const ENV_NS_HOST: &str = "MUPIF_NS_HOST";
pub const ENV_NS_PORT: &str = "MUPIF_NS_PORT";

pub const DEFAULT_NS_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct NsSettings {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
    pub timeout: Duration,
}

impl NsSettings {
    /// Resolves settings against the process environment.
    pub fn resolve(
        host: Option<String>,
        port: Option<u16>,
        hkey: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<Self> {
        Self::resolve_with(host, port, hkey, timeout_ms, |name| std::env::var(name).ok())
    }

    /// Resolves settings with `env` standing in for the environment.
    pub fn resolve_with(
        host: Option<String>,
        port: Option<u16>,
        hkey: Option<String>,
        timeout_ms: Option<u64>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let host = host
            .or_else(|| env(ENV_NS_HOST))
            .unwrap_or_else(|| DEFAULT_NS_HOST.to_string());

        let port = match port {
            Some(port) => port,
            None => match env(ENV_NS_PORT) {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("{}={} is not a valid port", ENV_NS_PORT, value))?,
                None => DEFAULT_NS_PORT,
            },
        };

        let hkey = hkey.or_else(|| env(ENV_HKEY));
        let auth = AuthConfig::from_optional_key(hkey.as_deref());

        let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_NS_TIMEOUT);

        Ok(Self {
            host,
            port,
            auth,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = NsSettings::resolve_with(None, None, None, None, env_of(&[])).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9090);
        assert!(!settings.auth.requires_auth());
        assert_eq!(settings.timeout, DEFAULT_NS_TIMEOUT);
    }

    #[test]
    fn test_environment_fallback() {
        let env = env_of(&[("MUPIF_NS_HOST", "ns.example.org"), ("MUPIF_NS_PORT", "10000"), ("MUPIF_HKEY", "k")]);
        let settings = NsSettings::resolve_with(None, None, None, Some(250), env).unwrap();
        assert_eq!(settings.host, "ns.example.org");
        assert_eq!(settings.port, 10000);
        assert!(settings.auth.requires_auth());
        assert_eq!(settings.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_flags_win_over_environment() {
        let env = env_of(&[("MUPIF_NS_HOST", "env-host"), ("MUPIF_NS_PORT", "1"), ("MUPIF_HKEY", "env-key")]);
        let settings =
            NsSettings::resolve_with(Some("flag-host".into()), Some(2), Some(String::new()), None, env).unwrap();
        assert_eq!(settings.host, "flag-host");
        assert_eq!(settings.port, 2);
        // An empty flag disables authentication even when the environment has a key
        assert!(!settings.auth.requires_auth());
    }

    #[test]
    fn test_invalid_port_in_environment() {
        let err = NsSettings::resolve_with(None, None, None, None, env_of(&[("MUPIF_NS_PORT", "ninety")]))
            .unwrap_err();
        assert!(err.to_string().contains("MUPIF_NS_PORT"));
    }
}
