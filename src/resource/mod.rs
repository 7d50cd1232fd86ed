//! Resource model
//!
//! Rows as read from the graph store, the resource types the broker knows
//! about, the decision-service action each type maps to, and the error
//! records attached to failed attempts.

pub mod status;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{BrokerError, Result};

pub use status::{Status, STATUS_IRI_PREFIX};

/// Namespace of the signing vocabulary
pub const SIGNING_NS: &str = "http://mu.semte.ch/vocabularies/ext/signing/";

/// Kind of resource, stored as the `rdf:type` of the resource node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Publish,
    Sign,
    Burn,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [Self::Publish, Self::Sign, Self::Burn];

    /// Local name of the type in the signing vocabulary
    pub const fn local_name(&self) -> &'static str {
        match self {
            Self::Publish => "PublishedResource",
            Self::Sign => "SignedResource",
            Self::Burn => "BurnedResource",
        }
    }

    pub fn iri(&self) -> String {
        format!("{}{}", SIGNING_NS, self.local_name())
    }

    /// Resolve a type from its IRI (or bare local name)
    pub fn from_iri(iri: &str) -> Option<Self> {
        let name = iri.strip_prefix(SIGNING_NS).unwrap_or(iri);
        Self::ALL.into_iter().find(|t| t.local_name() == name)
    }

    /// Decision-service action for this type
    pub const fn action(&self) -> Action {
        match self {
            Self::Publish => Action::Publish,
            Self::Sign => Action::Sign,
            Self::Burn => Action::Burn,
        }
    }
}

/// Action invoked on the decision service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Publish,
    Sign,
    /// The `sign` endpoint with `burn=true`
    Burn,
}

impl Action {
    /// Path segment under `/decision/`
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Sign | Self::Burn => "sign",
        }
    }

    /// Extra query parameters for the endpoint
    pub const fn query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Burn => &[("burn", "true")],
            Self::Publish | Self::Sign => &[],
        }
    }

    /// Status recorded when the decision service accepts the action
    pub const fn success_status(&self) -> Status {
        match self {
            Self::Burn => Status::Burned,
            Self::Publish | Self::Sign => Status::Published,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish => f.write_str("publish"),
            Self::Sign => f.write_str("sign"),
            Self::Burn => f.write_str("sign?burn=true"),
        }
    }
}

/// Which resource types a status read covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    All,
    /// Publish-shaped rows
    Publish,
    /// Sign-shaped rows (sign and burn)
    Sign,
}

impl ResourceScope {
    pub fn types(&self) -> &'static [ResourceType] {
        match self {
            Self::All => &ResourceType::ALL,
            Self::Publish => &[ResourceType::Publish],
            Self::Sign => &[ResourceType::Sign, ResourceType::Burn],
        }
    }

    pub fn includes(&self, resource_type: ResourceType) -> bool {
        self.types().contains(&resource_type)
    }
}

/// One row of a status read
///
/// The store may return several rows per resource (one per attached error,
/// or one per graph). Every field except `id` is optional because rows are
/// only validated when a payload is built for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    /// IRI of the resource node
    pub id: String,
    /// `rdf:type` IRI
    pub resource_type: Option<String>,
    pub content: Option<String>,
    /// IRI of the signing person
    pub signatory: Option<String>,
    /// Comma-joined role list
    pub roles: Option<String>,
    pub secret: Option<String>,
    /// IRI of the resource being acted upon
    pub subject: Option<String>,
    /// Creation timestamp as stored
    pub created: Option<String>,
    /// Error node attached to the resource (retry reads only)
    pub has_error: Option<String>,
}

impl ResourceRow {
    /// Key used to collapse duplicate rows
    pub fn identity_key(&self) -> &str {
        self.subject.as_deref().unwrap_or(&self.id)
    }

    /// Key used for per-identity exclusivity
    pub fn signatory_key(&self) -> &str {
        self.signatory.as_deref().unwrap_or(&self.id)
    }

    pub fn kind(&self) -> Result<ResourceType> {
        let iri = self
            .resource_type
            .as_deref()
            .ok_or_else(|| BrokerError::malformed(&self.id, "missing resource type"))?;
        ResourceType::from_iri(iri)
            .ok_or_else(|| BrokerError::malformed(&self.id, format!("unknown resource type {}", iri)))
    }
}

/// Error record attached to a failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    /// Resource the error belongs to
    pub resource_id: String,
    /// IRI of the error node
    pub error_id: String,
    pub attempt_count: u32,
    pub message: String,
}

/// A resource to insert when seeding a development store
#[derive(Debug, Clone)]
pub struct NewResource {
    /// uuid of the resource node
    pub uuid: String,
    pub resource_type: ResourceType,
    pub signatory: String,
    pub subject: String,
    pub roles: Vec<String>,
    pub content: String,
    pub secret: String,
    pub created: String,
}

impl NewResource {
    /// IRI the resource node will be stored under
    pub fn iri(&self) -> String {
        format!("http://lblod.info/signed-resources/{}", self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_action_mapping() {
        let burn = ResourceType::from_iri(&ResourceType::Burn.iri()).unwrap();
        assert_eq!(burn.action(), Action::Burn);
        assert_eq!(burn.action().endpoint(), "sign");
        assert_eq!(burn.action().query(), &[("burn", "true")]);
        assert_eq!(burn.action().success_status(), Status::Burned);
        assert_eq!(ResourceType::Sign.action().success_status(), Status::Published);
        assert_eq!(Action::Burn.to_string(), "sign?burn=true");
    }

    #[test]
    fn test_scope_membership() {
        assert!(ResourceScope::Sign.includes(ResourceType::Burn));
        assert!(!ResourceScope::Publish.includes(ResourceType::Sign));
        assert_eq!(ResourceScope::All.types().len(), 3);
    }

    #[test]
    fn test_row_keys_fall_back_to_id() {
        let row = ResourceRow {
            id: "http://x/r1".into(),
            ..Default::default()
        };
        assert_eq!(row.identity_key(), "http://x/r1");
        assert_eq!(row.signatory_key(), "http://x/r1");
        assert!(matches!(row.kind(), Err(BrokerError::Malformed { .. })));
    }
}
