use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: f64, required: f64 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Settlement failed: {0}")]
    Settlement(String),

    #[error("Invalid session transition: {0}")]
    Session(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err.to_string())
    }
}
