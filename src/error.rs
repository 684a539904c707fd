//! Client error types and decoding of JSON API error bodies.

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::ApiErrorBody;

/// Errors produced while configuring or using a [`StorageClient`](crate::StorageClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint configuration is unusable. Raised before any client exists.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure, passed through from the HTTP stack unchanged.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The requested bucket or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success response from the storage API.
    #[error("storage API returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        reason: Option<String>,
    },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Downloaded content does not match the object's recorded MD5.
    #[error("checksum mismatch for {bucket}/{object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        bucket: String,
        object: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a configuration error with the given message.
    pub fn configuration(message: impl Into<String>) -> Self {
        ClientError::Configuration(message.into())
    }

    /// Builds an error from a non-success status and the raw response body.
    ///
    /// The body is decoded as a JSON API error when possible; otherwise the
    /// raw text (or the canonical reason phrase) becomes the message.
    pub fn from_response(status: StatusCode, resource: &str, body: &str) -> Self {
        let decoded = serde_json::from_str::<ApiErrorBody>(body).ok();

        if status == StatusCode::NOT_FOUND {
            return ClientError::NotFound(resource.to_string());
        }

        match decoded {
            Some(ApiErrorBody { error }) => ClientError::Api {
                status: status.as_u16(),
                reason: error.errors.first().map(|e| e.reason.clone()),
                message: error.message,
            },
            None => {
                let message = if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body.trim().to_string()
                };
                ClientError::Api {
                    status: status.as_u16(),
                    message,
                    reason: None,
                }
            }
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::NotFound(_) => Some(404),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true for a 409 response, which bucket creation reports for
    /// names that are already taken.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
