//! Development fixtures
//!
//! Inserts unpublished resources so a development stack has something to
//! dispatch.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use crate::resource::{NewResource, ResourceType};

/// Signatory namespace of the fixture persons
pub const PERSON_NS: &str = "http://data.lblod.info/id/persoon/";

/// Subject namespace of seeded resources
pub const SUBJECT_NS: &str = "http://lblod.info/prepublished-agendas/";

/// Fixture persons selectable by index
pub const FIXTURE_PERSONS: [&str; 3] = [
    "45e2842b-e4ae-4593-a66f-551b8379d6b3",
    "385893a9-75d7-4557-9977-29999044b8aa",
    "eab29f18-3a50-4a89-842a-2255c8711ce6",
];

const FIXTURE_ROLES: [&str; 5] = [
    "GelinktNotuleren-ondertekenaar",
    "GelinktNotuleren-publiceerder",
    "GelinktNotuleren-lezer",
    "GelinktNotuleren-sjablonen_valideerder",
    "GelinktNotuleren-schrijver",
];

const FIXTURE_CONTENT: &str = "<div> rdfa stuff</div>";
const FIXTURE_SECRET: &str = "helloworldsecretbehere";
const FIXTURE_CREATED: &str = "2019-01-02T19:00:00.299Z";

/// Body of a single-resource seed request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRequest {
    /// Subject id; random when absent
    pub id: Option<String>,
    /// `publish` for a publish resource, anything else signs
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// Index into the fixture persons; random signatory when absent
    pub person: Option<usize>,
}

fn fixture(resource_type: ResourceType, subject_id: &str, signatory_id: &str) -> NewResource {
    NewResource {
        uuid: Uuid::new_v4().to_string(),
        resource_type,
        signatory: format!("{}{}", PERSON_NS, signatory_id),
        subject: format!("{}{}", SUBJECT_NS, subject_id),
        roles: FIXTURE_ROLES.iter().map(|r| r.to_string()).collect(),
        content: FIXTURE_CONTENT.to_string(),
        secret: FIXTURE_SECRET.to_string(),
        created: FIXTURE_CREATED.to_string(),
    }
}

fn random_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resource described by a seed request
pub fn from_request(request: &SeedRequest) -> NewResource {
    let subject = request.id.clone().unwrap_or_else(random_id);
    let signatory = request
        .person
        .and_then(|i| FIXTURE_PERSONS.get(i))
        .map(|p| p.to_string())
        .unwrap_or_else(random_id);
    let resource_type = match request.resource_type.as_deref() {
        Some("publish") => ResourceType::Publish,
        _ => ResourceType::Sign,
    };
    fixture(resource_type, &subject, &signatory)
}

/// Largest `amount` accepted for a bulk seed
pub const MAX_SEED_AMOUNT: usize = 1000;

/// Resources inserted by a bulk seed of `amount` entries. Even indices queue
/// five actions against one shared subject; odd indices add a single random
/// resource.
pub fn batch(amount: usize) -> Vec<NewResource> {
    let mut rng = rand::thread_rng();
    let mut resources = Vec::new();

    for index in 0..amount {
        if index % 2 == 0 {
            let subject = random_id();
            for resource_type in [
                ResourceType::Publish,
                ResourceType::Sign,
                ResourceType::Sign,
                ResourceType::Burn,
                ResourceType::Burn,
            ] {
                resources.push(fixture(resource_type, &subject, &random_signatory(&mut rng)));
            }
        } else {
            let resource_type = *ResourceType::ALL
                .choose(&mut rng)
                .unwrap_or(&ResourceType::Publish);
            resources.push(fixture(resource_type, &random_id(), &random_signatory(&mut rng)));
        }
    }

    resources
}

fn random_signatory(rng: &mut impl Rng) -> String {
    format!("{}{}", rng.gen::<u32>(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_fixture_person() {
        let resource = from_request(&SeedRequest {
            id: Some("agenda-1".into()),
            resource_type: Some("publish".into()),
            person: Some(1),
        });
        assert_eq!(resource.resource_type, ResourceType::Publish);
        assert_eq!(
            resource.signatory,
            "http://data.lblod.info/id/persoon/385893a9-75d7-4557-9977-29999044b8aa"
        );
        assert_eq!(resource.subject, "http://lblod.info/prepublished-agendas/agenda-1");
        assert_eq!(resource.roles.len(), 5);
    }

    #[test]
    fn test_request_defaults_to_sign() {
        let resource = from_request(&SeedRequest::default());
        assert_eq!(resource.resource_type, ResourceType::Sign);
        assert!(resource.signatory.starts_with(PERSON_NS));
    }

    #[test]
    fn test_batch_shape() {
        let resources = batch(3);
        // 5 + 1 + 5
        assert_eq!(resources.len(), 11);

        let shared = &resources[0].subject;
        assert!(resources[..5].iter().all(|r| &r.subject == shared));
        let types: Vec<_> = resources[..5].iter().map(|r| r.resource_type).collect();
        assert_eq!(
            types,
            vec![
                ResourceType::Publish,
                ResourceType::Sign,
                ResourceType::Sign,
                ResourceType::Burn,
                ResourceType::Burn
            ]
        );
        assert_ne!(&resources[5].subject, shared);
    }
}
