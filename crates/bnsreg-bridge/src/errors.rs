/// Failures talking to the bridge before a response body is read
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to bridge failed: {0}")]
    Connect(String),

    #[error("Bridge request timed out")]
    Timeout,

    #[error("Bridge request failed: {0}")]
    Request(String),

    #[error("Failed to build http client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::Client(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid bridge url {url}: {reason}")]
    InvalidBridgeUrl { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Unknown cascade callback mode: {0} (expected fan-out or merged)")]
    UnknownCascadeMode(String),
}
