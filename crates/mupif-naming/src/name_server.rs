use mupif_common::auth::AuthConfig;
use mupif_common::protocol::naming::{methods, ListArgs, NameArgs, RegisterArgs};
use mupif_common::protocol::error::{MupifError, Result};
use mupif_common::protocol::{Fault, Request, Response, Uri, NAMESERVER_OBJECT_ID};
use mupif_common::transport::TcpServer;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Directory of symbolic names and the object URIs published under them.
///
/// A name maps to at most one URI at any time. Plain registration replaces an
/// existing binding so that a restarted server (which never deregisters) can
/// publish itself again; safe registration refuses to replace.
///
/// # Example
///
/// ```
/// # use mupif_naming::NameServer;
/// # use mupif_common::{AuthConfig, Uri};
/// # #[tokio::main]
/// # async fn main() {
/// let ns = NameServer::new(AuthConfig::disabled());
/// let uri = Uri::new("obj_1", "127.0.0.1", 44382);
/// ns.register("Mupif.job1.app1", uri.clone(), false).await.unwrap();
/// assert_eq!(ns.lookup("Mupif.job1.app1").await, Some(uri));
/// # }
/// ```
pub struct NameServer {
    registry: RwLock<BTreeMap<String, Uri>>,
    auth: AuthConfig,
}

impl NameServer {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            registry: RwLock::new(BTreeMap::new()),
            auth,
        }
    }

    /// Binds `name` to `uri`.
    ///
    /// # Errors
    ///
    /// Returns `MupifError::Naming` for an empty name, or when `safe` is set
    /// and the name is already bound.
    pub async fn register(&self, name: &str, uri: Uri, safe: bool) -> Result<()> {
        if name.is_empty() {
            return Err(MupifError::Naming("name must not be empty".to_string()));
        }

        let mut registry = self.registry.write().await;
        if safe {
            if let Some(existing) = registry.get(name) {
                return Err(MupifError::Naming(format!(
                    "name {} is already registered to {}",
                    name, existing
                )));
            }
        }

        match registry.insert(name.to_string(), uri.clone()) {
            Some(previous) if previous != uri => {
                info!(%name, %uri, %previous, "Replaced registration");
            }
            _ => info!(%name, %uri, "Registered"),
        }
        Ok(())
    }

    pub async fn lookup(&self, name: &str) -> Option<Uri> {
        self.registry.read().await.get(name).cloned()
    }

    /// Removes the binding of `name`; returns whether one existed.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.registry.write().await.remove(name).is_some();
        if removed {
            info!(%name, "Removed registration");
        }
        removed
    }

    /// Returns every binding whose name starts with `prefix`, sorted by name.
    pub async fn list(&self, prefix: Option<&str>) -> BTreeMap<String, Uri> {
        let registry = self.registry.read().await;
        registry
            .iter()
            .filter(|(name, _)| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|(name, uri)| (name.clone(), uri.clone()))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Handles one wire request and returns the signed response.
    ///
    /// Requests that fail shared-secret verification never reach the
    /// directory.
    pub async fn handle_request(&self, request: Request) -> Response {
        let mut response = if !self.auth.verify_request(&request) {
            warn!(method = %request.method, "Rejected request with invalid HMAC");
            Response::fault(request.id, Fault::Security, "HMAC verification failed; is the hkey correct?")
        } else if request.object != NAMESERVER_OBJECT_ID {
            Response::fault(
                request.id,
                Fault::UnknownObject,
                format!("{} is a naming service, not {}", NAMESERVER_OBJECT_ID, request.object),
            )
        } else {
            self.dispatch(&request).await
        };

        self.auth.sign_response(&mut response);
        response
    }

    async fn dispatch(&self, request: &Request) -> Response {
        debug!(method = %request.method, "Naming request");
        let id = request.id;

        match request.method.as_str() {
            methods::PING => Response::success(id, json!("pong")),
            methods::REGISTER => match decode::<RegisterArgs>(request) {
                Ok(args) => match self.register(&args.name, args.uri, args.safe).await {
                    Ok(()) => Response::success(id, json!(null)),
                    Err(e) => Response::fault(id, Fault::Naming, e.to_string()),
                },
                Err(resp) => resp,
            },
            methods::LOOKUP => match decode::<NameArgs>(request) {
                Ok(args) => match self.lookup(&args.name).await {
                    Some(uri) => Response::success(id, json!(uri)),
                    None => Response::fault(id, Fault::Naming, format!("unknown name: {}", args.name)),
                },
                Err(resp) => resp,
            },
            methods::REMOVE => match decode::<NameArgs>(request) {
                Ok(args) => {
                    let removed = self.remove(&args.name).await;
                    Response::success(id, json!(removed))
                }
                Err(resp) => resp,
            },
            methods::LIST => match decode::<ListArgs>(request) {
                Ok(args) => {
                    let entries = self.list(args.prefix.as_deref()).await;
                    Response::success(id, json!(entries))
                }
                Err(resp) => resp,
            },
            other => Response::fault(
                id,
                Fault::UnknownMethod,
                format!("naming service has no method {}", other),
            ),
        }
    }
}

/// Decodes method arguments; a `null` payload decodes as an empty object.
fn decode<T: DeserializeOwned>(request: &Request) -> std::result::Result<T, Response> {
    let args = if request.args.is_null() {
        json!({})
    } else {
        request.args.clone()
    };
    serde_json::from_value(args).map_err(|e| {
        Response::fault(
            request.id,
            Fault::InvalidArguments,
            format!("{}: {}", request.method, e),
        )
    })
}

/// A naming service accepting connections on a background tokio task.
pub struct RunningNameServer {
    local_addr: SocketAddr,
    name_server: Arc<NameServer>,
    task: JoinHandle<Result<()>>,
}

impl RunningNameServer {
    /// Binds `bind_addr` and starts serving on the current tokio runtime.
    pub async fn spawn(bind_addr: &str, auth: AuthConfig) -> Result<Self> {
        let server = TcpServer::new(bind_addr).await?;
        let local_addr = server.local_addr()?;
        let name_server = Arc::new(NameServer::new(auth));

        info!(%local_addr, auth = %name_server.auth, "Naming service listening");

        let ns = name_server.clone();
        let task = tokio::spawn(async move {
            server
                .run_with_handler(move |request| {
                    let ns = ns.clone();
                    async move { Ok::<_, MupifError>(ns.handle_request(request).await) }
                })
                .await
        });

        Ok(Self {
            local_addr,
            name_server,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn uri(&self) -> Uri {
        Uri::new(
            NAMESERVER_OBJECT_ID,
            self.local_addr.ip().to_string(),
            self.local_addr.port(),
        )
    }

    pub fn name_server(&self) -> &Arc<NameServer> {
        &self.name_server
    }

    /// Waits until the accept loop stops, which only happens on error.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| MupifError::Transport(format!("naming service task failed: {}", e)))?
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(n: u16) -> Uri {
        Uri::new(format!("obj_{}", n), "127.0.0.1", 40000 + n)
    }

    fn ns_request(method: &str, args: serde_json::Value) -> Request {
        Request::new(NAMESERVER_OBJECT_ID, method, args)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let ns = NameServer::new(AuthConfig::disabled());
        ns.register("Mupif.job1.app1", uri(1), false).await.unwrap();
        assert_eq!(ns.lookup("Mupif.job1.app1").await, Some(uri(1)));
        assert_eq!(ns.lookup("Mupif.job1.app2").await, None);
    }

    #[tokio::test]
    async fn test_plain_register_replaces() {
        let ns = NameServer::new(AuthConfig::disabled());
        ns.register("Mupif.job1.app1", uri(1), false).await.unwrap();
        ns.register("Mupif.job1.app1", uri(2), false).await.unwrap();
        assert_eq!(ns.lookup("Mupif.job1.app1").await, Some(uri(2)));
        assert_eq!(ns.count().await, 1);
    }

    #[tokio::test]
    async fn test_safe_register_rejects_duplicate() {
        let ns = NameServer::new(AuthConfig::disabled());
        ns.register("Mupif.job1.app1", uri(1), true).await.unwrap();
        let err = ns.register("Mupif.job1.app1", uri(2), true).await.unwrap_err();
        assert!(matches!(err, MupifError::Naming(_)));
        assert_eq!(ns.lookup("Mupif.job1.app1").await, Some(uri(1)));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let ns = NameServer::new(AuthConfig::disabled());
        assert!(ns.register("", uri(1), false).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_list_prefix() {
        let ns = NameServer::new(AuthConfig::disabled());
        ns.register("Mupif.job1.app1", uri(1), false).await.unwrap();
        ns.register("Mupif.job1.app2", uri(2), false).await.unwrap();
        ns.register("Mupif.job2.app1", uri(3), false).await.unwrap();

        let job1 = ns.list(Some("Mupif.job1.")).await;
        assert_eq!(job1.keys().collect::<Vec<_>>(), vec!["Mupif.job1.app1", "Mupif.job1.app2"]);
        assert_eq!(ns.list(None).await.len(), 3);

        assert!(ns.remove("Mupif.job1.app1").await);
        assert!(!ns.remove("Mupif.job1.app1").await);
        assert_eq!(ns.list(Some("Mupif.job1.")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_request_dispatch() {
        let ns = NameServer::new(AuthConfig::disabled());

        let ping = ns.handle_request(ns_request("ping", json!(null))).await;
        assert_eq!(ping.result, Some(json!("pong")));

        let register = ns
            .handle_request(ns_request("register", json!({"name": "Mupif.j.a", "uri": uri(5)})))
            .await;
        assert!(register.success, "{:?}", register.error);

        let lookup = ns.handle_request(ns_request("lookup", json!({"name": "Mupif.j.a"}))).await;
        assert_eq!(lookup.result, Some(json!("MUPIF:obj_5@127.0.0.1:40005")));

        let missing = ns.handle_request(ns_request("lookup", json!({"name": "nope"}))).await;
        assert_eq!(missing.fault, Some(Fault::Naming));

        let list = ns.handle_request(ns_request("list", json!(null))).await;
        assert_eq!(list.result, Some(json!({"Mupif.j.a": "MUPIF:obj_5@127.0.0.1:40005"})));
    }

    #[tokio::test]
    async fn test_handle_request_faults() {
        let ns = NameServer::new(AuthConfig::disabled());

        let wrong_object = ns.handle_request(Request::new("obj_1", "ping", json!(null))).await;
        assert_eq!(wrong_object.fault, Some(Fault::UnknownObject));

        let wrong_method = ns.handle_request(ns_request("shutdown", json!(null))).await;
        assert_eq!(wrong_method.fault, Some(Fault::UnknownMethod));

        let bad_args = ns.handle_request(ns_request("register", json!({"name": 5}))).await;
        assert_eq!(bad_args.fault, Some(Fault::InvalidArguments));

        let bad_uri = ns
            .handle_request(ns_request("register", json!({"name": "x", "uri": "http://x"})))
            .await;
        assert_eq!(bad_uri.fault, Some(Fault::InvalidArguments));
    }

    #[tokio::test]
    async fn test_keyed_server_rejects_unsigned_and_signs_replies() {
        let auth = AuthConfig::with_hmac_key("mupif-secret-key");
        let ns = NameServer::new(auth.clone());

        let unsigned = ns.handle_request(ns_request("ping", json!(null))).await;
        assert_eq!(unsigned.fault, Some(Fault::Security));
        assert!(auth.verify_response(&unsigned));

        let mut signed = ns_request("ping", json!(null));
        auth.sign_request(&mut signed);
        let reply = ns.handle_request(signed).await;
        assert!(reply.success);
        assert!(auth.verify_response(&reply));
    }

    #[tokio::test]
    async fn test_rejected_request_does_not_register() {
        let ns = NameServer::new(AuthConfig::with_hmac_key("right"));
        let mut request = ns_request("register", json!({"name": "Mupif.j.a", "uri": uri(1)}));
        AuthConfig::with_hmac_key("wrong").sign_request(&mut request);
        let reply = ns.handle_request(request).await;
        assert_eq!(reply.fault, Some(Fault::Security));
        assert_eq!(ns.count().await, 0);
    }
}
