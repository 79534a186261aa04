// Tunnel lifecycle against a stand-in forwarding client
//
// The stand-in is a shell script; all scenarios share one test so that no
// other test thread forks while the script file is being written.

#![cfg(unix)]

use mupif_client::{open_tunnel, ReadinessConfig, TunnelClient, TunnelConfig};
use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn quick_readiness() -> ReadinessConfig {
    ReadinessConfig {
        max_attempts: 4,
        initial_backoff_ms: 20,
        max_backoff_ms: 50,
        backoff_multiplier: 2.0,
        probe_timeout_ms: 100,
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Plays the part of the forward: once the stand-in client has started,
/// listens on `port` and hands the listener back.
fn forward_when_started(marker: PathBuf, port: u16) -> JoinHandle<TcpListener> {
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() {
            assert!(Instant::now() < deadline, "stand-in client never started");
            thread::sleep(Duration::from_millis(5));
        }
        TcpListener::bind(("127.0.0.1", port)).unwrap()
    })
}

#[test]
fn test_tunnel_lifecycle_with_stand_in_client() {
    let dir = tempfile::tempdir().unwrap();
    let started = dir.path().join("started");
    let long_running = write_script(
        dir.path(),
        "fake-putty-forward",
        &format!("touch '{}'\nexec sleep 30", started.display()),
    );
    let failing = write_script(dir.path(), "fake-putty-fail", "exit 3");

    // Local port already taken: nothing is spawned
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let config = TunnelConfig::new("127.0.0.1", "mupif", port, 44382)
        .with_client(TunnelClient::Putty(long_running.clone()))
        .with_readiness(quick_readiness());
    assert!(open_tunnel(&config).unwrap().is_none());
    assert!(!started.exists(), "client must not start on an occupied port");
    drop(occupied);

    // Forward comes up after the client starts: the tunnel is reported up
    // and can be closed
    let port = free_port();
    let forward = forward_when_started(started.clone(), port);
    let config = TunnelConfig::new("127.0.0.1", "mupif", port, 44382)
        .with_client(TunnelClient::Putty(long_running.clone()))
        .with_readiness(ReadinessConfig {
            max_attempts: 20,
            ..quick_readiness()
        });
    let mut tunnel = open_tunnel(&config).unwrap().expect("tunnel should be up");
    let forward = forward.join().unwrap();
    assert_eq!(tunnel.local_port(), port);
    assert!(tunnel.pid() > 0);
    assert!(tunnel.try_wait().unwrap().is_none());
    tunnel.close().unwrap();
    drop(forward);

    // Client exits before the forward is up
    let port = free_port();
    let config = TunnelConfig::new("127.0.0.1", "mupif", port, 44382)
        .with_client(TunnelClient::Putty(failing))
        .with_readiness(quick_readiness());
    assert!(open_tunnel(&config).unwrap().is_none());

    // Client keeps running but nothing ever listens: it is killed, no handle
    let config = TunnelConfig::new("127.0.0.1", "mupif", port, 44382)
        .with_client(TunnelClient::Putty(long_running))
        .with_readiness(quick_readiness());
    assert!(open_tunnel(&config).unwrap().is_none());
}
