use thiserror::Error;

#[derive(Error, Debug)]
pub enum MupifError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown object: {0}")]
    UnknownObject(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Naming error: {0}")]
    Naming(String),

    #[error("Remote application error: {0}")]
    Remote(String),
}

impl From<std::net::AddrParseError> for MupifError {
    fn from(err: std::net::AddrParseError) -> Self {
        MupifError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MupifError>;
