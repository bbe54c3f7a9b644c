//! Error taxonomy for backend calls and review actions

use shared_types::{ClauseKey, ValidationError};
use thiserror::Error;

/// Failure of one backend request.
///
/// HTTP status classification and the body-level `success:false` flag both
/// end up here, so callers check a single `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Session expired")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Endpoint not found: {0}")]
    NotFound(String),

    #[error("Server error ({status})")]
    Server { status: u16, message: Option<String> },

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Not logged in")]
    NotAuthenticated,
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, path: &str, message: Option<String>) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(path.to_string()),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Http {
                status,
                message: message.unwrap_or_else(|| "Request failed".to_string()),
            },
        }
    }

    /// Message shown to the user for this failure
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => {
                "Unable to reach the server. Check your connection.".to_string()
            }
            ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            ApiError::Forbidden => "You do not have permission to perform this action.".to_string(),
            ApiError::NotFound(_) => "The requested endpoint was not found.".to_string(),
            ApiError::Server { .. } => "Server error. Please try again later.".to_string(),
            ApiError::Http { message, .. } => message.clone(),
            ApiError::Rejected(message) => message.clone(),
            ApiError::Decode(_) => "Unexpected response from the server.".to_string(),
            ApiError::NotAuthenticated => "Please log in first.".to_string(),
        }
    }

    /// True when the stored credentials should be discarded
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Caller mistakes when invoking a review action
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewError {
    #[error("Document has not been loaded")]
    NotLoaded,

    #[error("Unknown clause: {0}")]
    UnknownClause(ClauseKey),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Failed to load document: {0}")]
    Load(#[from] ApiError),
}
