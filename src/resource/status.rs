//! Publication status state machine
//!
//! ```text
//!                 ┌─────────────┐
//!                 │ UNPUBLISHED │
//!                 └─────────────┘
//!                        │ selected for dispatch
//!                        ▼
//!                 ┌────────────┐   malformed payload   ┌────────┐
//!                 │ PUBLISHING │──────────────────────▶│ FAILED │
//!                 └────────────┘                       └────────┘
//!            success │      │ failure                       ▲
//!                    │      ▼                               │ attempts
//!                    │  ┌───────────────────┐               │ exhausted
//!                    │  │ WAITING_FOR_RETRY │───────────────┘
//!                    │  └───────────────────┘
//!                    │      │ ▲ retry fails
//!                    │      └─┘
//!                    ▼      │ retry succeeds
//!          ┌───────────┐ ┌────────┐
//!          │ PUBLISHED │ │ BURNED │
//!          └───────────┘ └────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::BrokerError;

/// IRI prefix under which status values are stored in the graph
pub const STATUS_IRI_PREFIX: &str =
    "http://mu.semte.ch/vocabularies/ext/signing/publication-status/";

/// Publication status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Created externally, not yet picked up
    #[serde(rename = "unpublished")]
    Unpublished,
    /// Selected for dispatch, decision call in flight
    #[serde(rename = "publishing")]
    Publishing,
    /// Publish or sign accepted by the decision service
    #[serde(rename = "published")]
    Published,
    /// Burn accepted by the decision service
    #[serde(rename = "burned")]
    Burned,
    /// Last attempt failed, a retry is (or was) scheduled
    #[serde(rename = "waiting_for_retry")]
    WaitingForRetry,
    /// Attempts exhausted or resource malformed
    #[serde(rename = "publication_failed")]
    Failed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Unpublished,
        Status::Publishing,
        Status::Published,
        Status::Burned,
        Status::WaitingForRetry,
        Status::Failed,
    ];

    /// Storage name of the status
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unpublished => "unpublished",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Burned => "burned",
            Self::WaitingForRetry => "waiting_for_retry",
            Self::Failed => "publication_failed",
        }
    }

    /// Full IRI of the status as stored in the graph
    pub fn iri(&self) -> String {
        format!("{}{}", STATUS_IRI_PREFIX, self.as_str())
    }

    /// Returns true if no further transitions are possible
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Burned | Self::Failed)
    }

    /// Returns true if the transition from self to target is legal
    pub fn can_transition_to(&self, target: Status) -> bool {
        match self {
            Self::Unpublished => matches!(target, Self::Publishing | Self::Failed),
            Self::Publishing => matches!(
                target,
                Self::Published | Self::Burned | Self::WaitingForRetry | Self::Failed
            ),
            Self::WaitingForRetry => matches!(
                target,
                Self::Published | Self::Burned | Self::WaitingForRetry | Self::Failed
            ),
            Self::Published | Self::Burned | Self::Failed => false,
        }
    }

    /// Returns all legal target states from the current state
    pub fn valid_transitions(&self) -> Vec<Status> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(STATUS_IRI_PREFIX).unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == name)
            .ok_or_else(|| BrokerError::BadRequest(format!("Unknown status: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in Status::ALL {
            if status.is_terminal() {
                assert!(status.valid_transitions().is_empty(), "{status} should be terminal");
            } else {
                assert!(!status.valid_transitions().is_empty(), "{status} should have exits");
            }
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Status::Unpublished.can_transition_to(Status::Publishing));
        assert!(Status::Publishing.can_transition_to(Status::Published));
        assert!(Status::Publishing.can_transition_to(Status::Burned));
        assert!(!Status::Unpublished.can_transition_to(Status::Published));
    }

    #[test]
    fn test_retry_transitions() {
        assert!(Status::Publishing.can_transition_to(Status::WaitingForRetry));
        assert!(Status::WaitingForRetry.can_transition_to(Status::WaitingForRetry));
        assert!(Status::WaitingForRetry.can_transition_to(Status::Failed));
        assert!(Status::WaitingForRetry.can_transition_to(Status::Burned));
        assert!(!Status::Unpublished.can_transition_to(Status::WaitingForRetry));
        assert!(!Status::Failed.can_transition_to(Status::WaitingForRetry));
    }

    #[test]
    fn test_parse_roundtrip_names_and_iris() {
        assert_eq!("publication_failed".parse::<Status>().unwrap(), Status::Failed);
        assert_eq!(
            Status::WaitingForRetry.iri().parse::<Status>().unwrap(),
            Status::WaitingForRetry
        );
        assert!("failed".parse::<Status>().is_err());
    }

    #[test]
    fn test_serde_uses_storage_names() {
        let json = serde_json::to_string(&Status::Failed).unwrap();
        assert_eq!(json, "\"publication_failed\"");
    }
}
