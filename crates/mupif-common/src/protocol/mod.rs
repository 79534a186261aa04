pub mod error;
pub mod naming;
pub mod requests;
pub mod responses;
pub mod uri;


pub use error::{MupifError, Result};
pub use requests::{Request, RequestId, MethodName, RpcArgs, GET_APPLICATION_SIGNATURE};
pub use responses::{Fault, Response, RpcResult};
pub use naming::{NAMESERVER_OBJECT_ID, DEFAULT_NS_PORT};
pub use uri::{Uri, URI_SCHEME};
