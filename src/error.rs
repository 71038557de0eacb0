use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed request: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for failures reported by (or on the way to) a remote server.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
