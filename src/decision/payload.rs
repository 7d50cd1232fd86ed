//! Outbound payload built from a resource row

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resource::{ResourceRow, ResourceType};
use crate::types::{BrokerError, Result};

/// Payload format version understood by the decision service
pub const PAYLOAD_VERSION: u32 = 1;

/// Identity of the signing person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oit {
    /// Last path segment of the signatory IRI
    pub identifier: String,
    pub roles: Vec<String>,
    pub secret: String,
    /// Full signatory IRI
    pub full_identifier: String,
}

/// Body posted to the decision service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    /// IRI of the resource node
    pub id: String,
    /// Lowercase hex SHA-256 of the content
    pub content: String,
    pub oit: Oit,
    /// IRI of the resource being acted upon
    pub resource_id: String,
    /// Type IRI of the resource node
    pub subject: String,
    pub timestamp: String,
    pub version: u32,
}

/// Lowercase hex SHA-256 of a string
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn required<'a>(row: &'a ResourceRow, field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| BrokerError::malformed(&row.id, format!("missing {}", name)))
}

impl DecisionPayload {
    /// Build the payload for a row. Any missing field is fatal for the
    /// resource and reported as [`BrokerError::Malformed`].
    pub fn from_row(row: &ResourceRow) -> Result<(ResourceType, Self)> {
        let kind = row.kind()?;
        let type_iri = required(row, &row.resource_type, "resource type")?;
        let content = required(row, &row.content, "content")?;
        let signatory = required(row, &row.signatory, "signatory")?;
        let roles = required(row, &row.roles, "signatory roles")?;
        let secret = required(row, &row.secret, "signatory secret")?;
        let subject = required(row, &row.subject, "subject")?;
        let timestamp = required(row, &row.created, "timestamp")?;

        let identifier = signatory.rsplit('/').next().unwrap_or_default();
        if identifier.is_empty() {
            return Err(BrokerError::malformed(
                &row.id,
                format!("no identifier in signatory {}", signatory),
            ));
        }

        let payload = Self {
            id: row.id.clone(),
            content: content_hash(content),
            oit: Oit {
                identifier: identifier.to_string(),
                roles: roles.split(',').map(str::to_string).collect(),
                secret: secret.to_string(),
                full_identifier: signatory.to_string(),
            },
            resource_id: subject.to_string(),
            subject: type_iri.to_string(),
            timestamp: timestamp.to_string(),
            version: PAYLOAD_VERSION,
        };

        Ok((kind, payload))
    }
}
