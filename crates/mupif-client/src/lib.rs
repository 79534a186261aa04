pub mod connect;
pub mod name_server_proxy;
pub mod proxy;
pub mod tunnel;

pub use connect::{
    connect_app, connect_name_server, ns_app_name, NamingServiceError, DEFAULT_NS_TIMEOUT, NS_NAMESPACE,
};
pub use name_server_proxy::NameServerProxy;
pub use proxy::Proxy;
pub use tunnel::{open_tunnel, ReadinessConfig, Tunnel, TunnelClient, TunnelConfig, TunnelError};
