//! Error types for the fieldlink network adapters

use thiserror::Error;

use fieldlink_core::{CredentialError, TransportError};
use fieldlink_update::StoreError;

/// Errors that can occur when talking to remote services
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Token could not be signed
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Service returned an error status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body from the service
        message: String,
    },

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(e.to_string())
    }
}

impl From<ClientError> for TransportError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Api { status, message } => TransportError::Rejected { status, message },
            ClientError::ConnectionClosed(reason) => TransportError::Closed(reason),
            ClientError::Credential(e) => TransportError::Credential(e),
            other => TransportError::Request(other.to_string()),
        }
    }
}

impl From<ClientError> for StoreError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Json(_) | ClientError::InvalidResponse(_) => {
                StoreError::InvalidResponse(e.to_string())
            }
            other => StoreError::Request(other.to_string()),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Turn a non-success response into `ClientError::Api`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api { status, message })
}

/// Base URL for a host name that may or may not carry a scheme
pub(crate) fn endpoint_url(endpoint: &str, default_scheme: &str) -> Result<url::Url> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.contains("://") {
        Ok(url::Url::parse(endpoint)?)
    } else {
        Ok(url::Url::parse(&format!("{default_scheme}://{endpoint}"))?)
    }
}
