// Integration tests for the naming service over TCP
//
// These tests start a real naming service on an ephemeral port and talk to it
// with the blocking transport, the way proxies do.

use mupif_common::protocol::error::MupifError;
use mupif_common::protocol::{Fault, Request, Response, Uri, NAMESERVER_OBJECT_ID};
use mupif_common::transport::TcpTransport;
use mupif_common::AuthConfig;
use mupif_naming::RunningNameServer;
use serde_json::json;

/// Sends one request to the naming service from a blocking thread.
async fn call(addr: String, auth: AuthConfig, method: &str, args: serde_json::Value) -> Result<Response, MupifError> {
    let mut request = Request::new(NAMESERVER_OBJECT_ID, method, args);
    auth.sign_request(&mut request);
    tokio::task::spawn_blocking(move || {
        let transport = TcpTransport::new();
        let mut stream = transport.connect(&addr)?;
        transport.send_request(&mut stream, &request)
    })
    .await
    .expect("blocking task panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_then_lookup_over_tcp() {
    let ns = RunningNameServer::spawn("127.0.0.1:0", AuthConfig::disabled()).await.unwrap();
    let addr = ns.local_addr().to_string();
    let uri = Uri::new("obj_1", "127.0.0.1", 44382);

    let reply = call(addr.clone(), AuthConfig::disabled(), "register", json!({"name": "Mupif.job1.app1", "uri": uri})).await.unwrap();
    assert!(reply.success, "{:?}", reply.error);

    let reply = call(addr.clone(), AuthConfig::disabled(), "lookup", json!({"name": "Mupif.job1.app1"})).await.unwrap();
    let found: Uri = serde_json::from_value(reply.into_result().unwrap()).unwrap();
    assert_eq!(found, uri);

    assert_eq!(ns.name_server().count().await, 1);
    ns.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_key_is_rejected_over_tcp() {
    let ns = RunningNameServer::spawn("127.0.0.1:0", AuthConfig::with_hmac_key("right-key")).await.unwrap();
    let addr = ns.local_addr().to_string();

    let reply = call(addr.clone(), AuthConfig::with_hmac_key("wrong-key"), "ping", json!(null)).await.unwrap();
    assert_eq!(reply.fault, Some(Fault::Security));

    let good = AuthConfig::with_hmac_key("right-key");
    let reply = call(addr, good.clone(), "ping", json!(null)).await.unwrap();
    assert!(good.verify_response(&reply));
    assert_eq!(reply.into_result().unwrap(), json!("pong"));
    ns.shutdown();
}

#[tokio::test]
async fn test_uri_reports_bound_port() {
    let ns = RunningNameServer::spawn("127.0.0.1:0", AuthConfig::disabled()).await.unwrap();
    let uri = ns.uri();
    assert_eq!(uri.object_id, NAMESERVER_OBJECT_ID);
    assert_eq!(uri.port, ns.local_addr().port());
    ns.shutdown();
}
