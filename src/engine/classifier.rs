//! Classification of unpublished rows into exclusive and deferred sets
//!
//! A store read may return several rows for one resource and several
//! resources queued against the same subject. Rows are first collapsed to one
//! per subject; the survivors are then split so that each signing identity
//! has exactly one resource in the exclusive set. Everything else is
//! deferred.

use std::collections::HashSet;

use crate::resource::ResourceRow;

/// Result of classifying a batch of rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// One resource per signing identity, awaited by the caller
    pub exclusive: Vec<ResourceRow>,
    /// The remaining collapsed resources, dispatched in the background
    pub deferred: Vec<ResourceRow>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.exclusive.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exclusive.is_empty() && self.deferred.is_empty()
    }

    /// All collapsed resources, exclusive first
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRow> {
        self.exclusive.iter().chain(self.deferred.iter())
    }
}

/// Keep the first row per identity key after ordering by `(created, id)`
pub fn collapse(mut rows: Vec<ResourceRow>) -> Vec<ResourceRow> {
    rows.sort_by(|a, b| (&a.created, &a.id).cmp(&(&b.created, &b.id)));

    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.identity_key().to_string()))
        .collect()
}

/// Collapse rows and split them by signing identity (first seen wins)
pub fn partition(rows: Vec<ResourceRow>) -> Partition {
    let mut seen = HashSet::new();
    let mut result = Partition::default();

    for row in collapse(rows) {
        if seen.insert(row.signatory_key().to_string()) {
            result.exclusive.push(row);
        } else {
            result.deferred.push(row);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, subject: &str, signatory: &str, created: &str) -> ResourceRow {
        ResourceRow {
            id: id.to_string(),
            subject: Some(subject.to_string()),
            signatory: Some(signatory.to_string()),
            created: Some(created.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input() {
        let result = partition(Vec::new());
        assert!(result.is_empty());
        assert_eq!(result, Partition::default());
    }

    #[test]
    fn test_collapse_keeps_earliest_per_subject() {
        let rows = vec![
            row("r2", "s1", "p1", "2019-01-02T00:00:00Z"),
            row("r1", "s1", "p2", "2019-01-01T00:00:00Z"),
            row("r3", "s2", "p1", "2019-01-03T00:00:00Z"),
            // duplicate row of r3 (one per graph)
            row("r3", "s2", "p1", "2019-01-03T00:00:00Z"),
        ];
        let collapsed = collapse(rows);
        let ids: Vec<_> = collapsed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[test]
    fn test_one_exclusive_per_signatory() {
        let rows = vec![
            row("r1", "s1", "p1", "2019-01-01T00:00:00Z"),
            row("r2", "s2", "p1", "2019-01-02T00:00:00Z"),
            row("r3", "s3", "p2", "2019-01-03T00:00:00Z"),
            row("r4", "s4", "p2", "2019-01-04T00:00:00Z"),
            row("r5", "s5", "p1", "2019-01-05T00:00:00Z"),
        ];
        let result = partition(rows);

        let exclusive: Vec<_> = result.exclusive.iter().map(|r| r.id.as_str()).collect();
        let deferred: Vec<_> = result.deferred.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(exclusive, vec!["r1", "r3"]);
        assert_eq!(deferred, vec!["r2", "r4", "r5"]);
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_rows_without_signatory_do_not_block_each_other() {
        let rows = vec![
            ResourceRow {
                id: "r1".into(),
                ..Default::default()
            },
            ResourceRow {
                id: "r2".into(),
                ..Default::default()
            },
        ];
        let result = partition(rows);
        assert_eq!(result.exclusive.len(), 2);
        assert!(result.deferred.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Small alphabets so subjects and signatories collide often
        fn arb_row() -> impl Strategy<Value = ResourceRow> {
            (
                "r[0-9]{1,2}",
                prop::option::of("s[0-4]"),
                prop::option::of("p[0-3]"),
                prop::option::of("2019-01-0[1-9]"),
            )
                .prop_map(|(id, subject, signatory, created)| ResourceRow {
                    id,
                    subject,
                    signatory,
                    created,
                    ..Default::default()
                })
        }

        proptest! {
            #[test]
            fn collapsed_identities_are_unique(rows in prop::collection::vec(arb_row(), 0..40)) {
                let distinct: HashSet<String> =
                    rows.iter().map(|r| r.identity_key().to_string()).collect();
                let collapsed = collapse(rows);

                let mut seen = HashSet::new();
                for row in &collapsed {
                    prop_assert!(seen.insert(row.identity_key().to_string()));
                }
                prop_assert_eq!(seen, distinct);
            }

            #[test]
            fn exclusive_holds_one_per_signatory(rows in prop::collection::vec(arb_row(), 0..40)) {
                let collapsed = collapse(rows.clone());
                let result = partition(rows);

                let mut exclusive_keys = HashSet::new();
                for row in &result.exclusive {
                    prop_assert!(exclusive_keys.insert(row.signatory_key().to_string()));
                }
                let signatories: HashSet<String> =
                    collapsed.iter().map(|r| r.signatory_key().to_string()).collect();
                prop_assert_eq!(&exclusive_keys, &signatories);

                for row in &result.deferred {
                    prop_assert!(exclusive_keys.contains(row.signatory_key()));
                }

                // exclusive and deferred together are exactly the collapsed rows
                let mut split: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
                let mut expected: Vec<&str> = collapsed.iter().map(|r| r.id.as_str()).collect();
                split.sort_unstable();
                expected.sort_unstable();
                prop_assert_eq!(split, expected);
            }
        }
    }
}
