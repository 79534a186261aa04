//! MuPIF Transport Layer
//!
//! This module provides the TCP framing used between proxies, daemons and the
//! naming service.
//!
//! - **Transport**: plain TCP, one request/response exchange at a time
//! - **Codec**: JSON serialization for protocol messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode protocol messages to JSON
//! - **[`TcpTransport`]**: Blocking transport (proxies and the single-threaded daemon)
//! - **[`TcpServer`]**: Async server (naming service)
//!
//! All implementations enforce a maximum message size of 100 MB.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use tcp::{TcpTransport, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE};
pub use tcp_server::TcpServer;
