//! Decision service client
//!
//! The decision service is the external collaborator that performs the
//! actual publish, sign and burn actions. The broker only cares whether a
//! call succeeded; on failure it records the message from [`DecisionError`]
//! in the error ledger.

pub mod http;
pub mod payload;

use serde_json::Value;

use crate::resource::Action;

pub use http::HttpDecisionClient;
pub use payload::{DecisionPayload, Oit};

/// Failure of a decision-service call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    /// The request never produced a response (connect, timeout, body)
    #[error("Decision service unreachable: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status
    #[error("Decision service returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl DecisionError {
    /// Message stored on the error record of a failed attempt
    pub fn ledger_message(&self) -> String {
        match self {
            Self::Transport(reason) => reason.clone(),
            Self::Rejected { message, .. } => message.clone(),
        }
    }
}

/// Calls into the decision service (allows mocking in tests)
#[async_trait::async_trait]
pub trait DecisionClient: Send + Sync {
    /// Ask the service to perform `action` for the payload. Any 2xx is success.
    async fn invoke(&self, action: Action, payload: &DecisionPayload) -> Result<(), DecisionError>;

    /// Ask the service to validate a published resource, returning its verdict
    async fn validate(&self, payload: &DecisionPayload) -> Result<Value, DecisionError>;
}
