//! Objects served by a daemon.
//!
//! A [`RemoteObject`] receives calls by method name with JSON arguments. An
//! [`Application`] is the top-level object a server publishes under a
//! symbolic name; besides its own methods it answers
//! `get_application_signature`, which clients use as a liveness probe.

use mupif_client::NameServerProxy;
use mupif_common::protocol::GET_APPLICATION_SIGNATURE;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::daemon::Daemon;
use crate::runner::ServerError;

/// Failure of one dispatched call, reported back to the caller.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("no method named {0}")]
    UnknownMethod(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("{0}")]
    Api(String),
}

impl ApplicationError {
    pub fn api(message: impl Into<String>) -> Self {
        ApplicationError::Api(message.into())
    }
}

/// An object whose methods can be invoked through a daemon.
///
/// The daemon serves one call at a time, so `dispatch` gets exclusive access
/// and implementations need no interior locking.
pub trait RemoteObject: Send {
    fn dispatch(&mut self, method: &str, args: Value) -> Result<Value, ApplicationError>;
}

/// A remotely accessible simulation application.
pub trait Application: RemoteObject {
    /// Human readable identification returned by `get_application_signature`.
    fn application_signature(&self) -> String;

    /// Runs before the application itself is registered, with the daemon and
    /// naming service it is about to be published on. Applications exposing
    /// additional objects register them here.
    fn register_hook(&mut self, _daemon: &mut Daemon, _ns: &NameServerProxy) -> Result<(), ServerError> {
        Ok(())
    }
}

/// Decodes call arguments into `T`; a `null` payload decodes as `{}`.
pub fn decode_args<T: DeserializeOwned>(args: Value) -> Result<T, ApplicationError> {
    let args = if args.is_null() { json!({}) } else { args };
    Ok(serde_json::from_value(args)?)
}

/// Serves an [`Application`] through a daemon, answering the signature call
/// before the application's own dispatch.
pub(crate) struct ApplicationObject<A> {
    app: A,
}

impl<A: Application> ApplicationObject<A> {
    pub(crate) fn new(app: A) -> Self {
        Self { app }
    }
}

impl<A: Application> RemoteObject for ApplicationObject<A> {
    fn dispatch(&mut self, method: &str, args: Value) -> Result<Value, ApplicationError> {
        if method == GET_APPLICATION_SIGNATURE {
            return Ok(json!(self.app.application_signature()));
        }
        self.app.dispatch(method, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Counter {
        total: i64,
    }

    #[derive(Debug, Deserialize)]
    struct AddArgs {
        amount: i64,
    }

    impl RemoteObject for Counter {
        fn dispatch(&mut self, method: &str, args: Value) -> Result<Value, ApplicationError> {
            match method {
                "add" => {
                    let args: AddArgs = decode_args(args)?;
                    self.total += args.amount;
                    Ok(json!(self.total))
                }
                "fail" => Err(ApplicationError::api("refused")),
                other => Err(ApplicationError::UnknownMethod(other.to_string())),
            }
        }
    }

    impl Application for Counter {
        fn application_signature(&self) -> String {
            "Counter@test".to_string()
        }
    }

    #[test]
    fn test_signature_is_answered_by_wrapper() {
        let mut object = ApplicationObject::new(Counter { total: 0 });
        let value = object.dispatch(GET_APPLICATION_SIGNATURE, Value::Null).unwrap();
        assert_eq!(value, json!("Counter@test"));
    }

    #[test]
    fn test_calls_reach_application() {
        let mut object = ApplicationObject::new(Counter { total: 0 });
        object.dispatch("add", json!({"amount": 2})).unwrap();
        assert_eq!(object.dispatch("add", json!({"amount": 3})).unwrap(), json!(5));
        assert!(matches!(object.dispatch("fail", Value::Null), Err(ApplicationError::Api(_))));
        assert!(matches!(object.dispatch("nope", Value::Null), Err(ApplicationError::UnknownMethod(_))));
    }

    #[test]
    fn test_decode_args_errors() {
        let err = decode_args::<AddArgs>(Value::Null).unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidArguments(_)));
        let err = decode_args::<AddArgs>(json!({"amount": "two"})).unwrap_err();
        assert!(err.to_string().starts_with("invalid arguments"));
    }
}
