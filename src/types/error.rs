//! Error types for the event broker
//!
//! Pattern adapted from the doorway gateway error type.

use hyper::StatusCode;

use crate::resource::Status;

/// Main error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The graph store rejected or failed a query/update
    #[error("Store error: {0}")]
    Store(String),

    /// The decision service could not be reached or refused the call
    #[error("Decision service error: {0}")]
    Decision(String),

    /// A resource row is missing fields required to build a payload
    #[error("Malformed resource {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Illegal status transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: Status, to: Status },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Build a malformed-resource error
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Decision(_) => StatusCode::BAD_GATEWAY,
            Self::Malformed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for BrokerError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
