//! MuPIF Common Types and Transport
//!
//! This crate provides the protocol definitions, TCP transport and
//! shared-secret authentication used by every MuPIF remote-object component:
//!
//! - **Protocol Layer**: [`Request`], [`Response`], [`Fault`], [`Uri`] and [`MupifError`]
//! - **Transport Layer**: length-prefixed JSON over TCP
//! - **Auth**: HMAC-SHA256 message codes keyed by a shared secret
//!
//! # Example
//!
//! ```
//! use mupif_common::{Request, Response, Uri};
//! use serde_json::json;
//!
//! let uri: Uri = "MUPIF:obj_1@127.0.0.1:44382".parse().unwrap();
//! let request = Request::new(uri.object_id.clone(), "get_critical_time_step", json!(null));
//! let response = Response::success(request.id, json!(1.0));
//! assert_eq!(response.into_result().unwrap(), json!(1.0));
//! ```

pub mod auth;
pub mod protocol;
pub mod transport;

pub use auth::AuthConfig;
pub use protocol::*;
