//! Error types for the GraphQL backend

use partysync::SyncError;

/// Result type alias for GraphQL operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server answered with a non-empty `errors` array
    #[error("GraphQL error: {0}")]
    Graphql(String),

    /// The response has no `data.<field>` entry
    #[error("Missing field in GraphQL response: {0}")]
    MissingData(String),

    /// Unexpected graphql-transport-ws message
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timeout")]
    Timeout,

    /// Configuration error (from partyconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<Error> for SyncError {
    fn from(error: Error) -> Self {
        SyncError::backend(error.to_string())
    }
}
