use shared::types::ServiceId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PollerError>;

#[derive(Error, Debug)]
pub enum PollerError {
    /// Bad input, rejected locally or by the registry
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Registry unreachable or answered unexpectedly
    #[error("Network error: {0}")]
    Network(String),
    #[error("Service not found: {0}")]
    NotFound(ServiceId),
    /// Malformed push message
    #[error("Decode error: {0}")]
    Decode(String),
    /// Push channel transport failure
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Sync engine is shut down")]
    EngineClosed,
}

impl From<reqwest::Error> for PollerError {
    fn from(e: reqwest::Error) -> Self {
        PollerError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PollerError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PollerError::Transport(e.to_string())
    }
}
