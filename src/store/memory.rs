//! In-memory resource store
//!
//! Mirrors the observable behaviour of the SPARQL store closely enough to run
//! the engine without a triple store: reads filter by status and type, retry
//! reads return one row per attached error, and writes against a resource
//! without a status are silent no-ops. Unlike the graph store it also checks
//! every status write against the transition table and keeps a per-resource
//! status history, which makes it the test double of choice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::queries::ERROR_IRI_BASE;
use super::ResourceStore;
use crate::resource::{ErrorEntry, NewResource, ResourceRow, ResourceScope, ResourceType, Status};
use crate::types::{BrokerError, Result};

#[derive(Debug, Clone)]
struct StoredResource {
    row: ResourceRow,
    status: Option<Status>,
    content_hash: Option<String>,
    /// Error IRIs attached by retries, oldest first
    errors: Vec<String>,
    history: Vec<Status>,
}

#[derive(Debug, Clone)]
struct StoredError {
    entry: ErrorEntry,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<String, StoredResource>,
    /// Insertion order, so reads are stable
    order: Vec<String>,
    errors: Vec<StoredError>,
}

/// Resource store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw row with the given status. Rows may be incomplete, which
    /// is how malformed resources are simulated.
    pub async fn insert_row(&self, row: ResourceRow, status: Status) {
        let mut inner = self.inner.write().await;
        let id = row.id.clone();
        if !inner.resources.contains_key(&id) {
            inner.order.push(id.clone());
        }
        inner.resources.insert(
            id,
            StoredResource {
                row: ResourceRow {
                    has_error: None,
                    ..row
                },
                status: Some(status),
                content_hash: None,
                errors: Vec::new(),
                history: vec![status],
            },
        );
    }

    /// Make every subsequent write fail with a store error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn status_of(&self, id: &str) -> Option<Status> {
        self.inner.read().await.resources.get(id).and_then(|r| r.status)
    }

    /// Every status the resource has held, in order
    pub async fn history(&self, id: &str) -> Vec<Status> {
        self.inner
            .read()
            .await
            .resources
            .get(id)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    pub async fn content_hash(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .resources
            .get(id)
            .and_then(|r| r.content_hash.clone())
    }

    /// Number of resources that still have a status
    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .resources
            .values()
            .filter(|r| r.status.is_some())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(BrokerError::Store("memory store is failing writes".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Move a stored resource to `target`, enforcing the transition table.
/// Returns false when the resource has no status (write is a no-op).
fn transition(resource: &mut StoredResource, target: Status) -> Result<bool> {
    let Some(current) = resource.status else {
        return Ok(false);
    };
    if !current.can_transition_to(target) {
        return Err(BrokerError::InvalidTransition {
            id: resource.row.id.clone(),
            from: current,
            to: target,
        });
    }
    resource.status = Some(target);
    resource.history.push(target);
    Ok(true)
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn read_by_status(&self, status: Status, scope: ResourceScope) -> Result<Vec<ResourceRow>> {
        let inner = self.inner.read().await;
        let mut rows = Vec::new();

        for id in &inner.order {
            let Some(resource) = inner.resources.get(id) else {
                continue;
            };
            if resource.status != Some(status) {
                continue;
            }
            let in_scope = resource
                .row
                .resource_type
                .as_deref()
                .and_then(ResourceType::from_iri)
                .is_some_and(|t| scope.includes(t));
            if !in_scope {
                continue;
            }

            if status == Status::WaitingForRetry {
                for error in &resource.errors {
                    rows.push(ResourceRow {
                        has_error: Some(error.clone()),
                        ..resource.row.clone()
                    });
                }
            } else {
                rows.push(resource.row.clone());
            }
        }

        Ok(rows)
    }

    async fn write_status(&self, id: &str, status: Status, content_hash: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let Some(resource) = inner.resources.get_mut(id) else {
            debug!(resource = %id, "Status write for unknown resource ignored");
            return Ok(());
        };
        if transition(resource, status)? && status == Status::Published {
            if let Some(hash) = content_hash {
                resource.content_hash = Some(hash.to_string());
            }
        }
        Ok(())
    }

    async fn write_retry(&self, id: &str, attempt: u32, error_uuid: &str, message: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let error_id = format!("{}{}", ERROR_IRI_BASE, error_uuid);

        let Some(resource) = inner.resources.get_mut(id) else {
            debug!(resource = %id, "Retry write for unknown resource ignored");
            return Ok(());
        };
        if !transition(resource, Status::WaitingForRetry)? {
            return Ok(());
        }
        resource.errors.push(error_id.clone());

        inner.errors.push(StoredError {
            entry: ErrorEntry {
                resource_id: id.to_string(),
                error_id,
                attempt_count: attempt,
                message: message.to_string(),
            },
            deleted: false,
        });
        Ok(())
    }

    async fn read_errors(&self) -> Result<Vec<ErrorEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .errors
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.entry.clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(resource) = inner.resources.get_mut(id) {
            resource.status = None;
        }
        Ok(())
    }

    async fn delete_error(&self, error_id: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        for error in inner.errors.iter_mut().filter(|e| e.entry.error_id == error_id) {
            error.deleted = true;
        }
        Ok(())
    }

    async fn insert_resource(&self, resource: &NewResource) -> Result<()> {
        self.check_writable()?;
        let row = ResourceRow {
            id: resource.iri(),
            resource_type: Some(resource.resource_type.iri()),
            content: Some(resource.content.clone()),
            signatory: Some(resource.signatory.clone()),
            roles: Some(resource.roles.join(",")),
            secret: Some(resource.secret.clone()),
            subject: Some(resource.subject.clone()),
            created: Some(resource.created.clone()),
            has_error: None,
        };
        self.insert_row(row, Status::Unpublished).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, resource_type: ResourceType) -> ResourceRow {
        ResourceRow {
            id: id.to_string(),
            resource_type: Some(resource_type.iri()),
            signatory: Some("http://data.lblod.info/id/persoon/p1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reads_filter_by_status_and_scope() {
        let store = MemoryStore::new();
        store.insert_row(row("r1", ResourceType::Publish), Status::Unpublished).await;
        store.insert_row(row("r2", ResourceType::Burn), Status::Unpublished).await;
        store.insert_row(row("r3", ResourceType::Sign), Status::Published).await;

        let all = store
            .read_by_status(Status::Unpublished, ResourceScope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let sign = store
            .read_by_status(Status::Unpublished, ResourceScope::Sign)
            .await
            .unwrap();
        assert_eq!(sign.len(), 1);
        assert_eq!(sign[0].id, "r2");
    }

    #[tokio::test]
    async fn test_rejects_illegal_transition() {
        let store = MemoryStore::new();
        store.insert_row(row("r1", ResourceType::Publish), Status::Published).await;

        let result = store.write_status("r1", Status::Publishing, None).await;
        assert!(matches!(result, Err(BrokerError::InvalidTransition { .. })));
        assert_eq!(store.status_of("r1").await, Some(Status::Published));
    }

    #[tokio::test]
    async fn test_retry_rows_one_per_error() {
        let store = MemoryStore::new();
        store.insert_row(row("r1", ResourceType::Sign), Status::Publishing).await;
        store.write_retry("r1", 1, "e1", "boom").await.unwrap();
        store.write_retry("r1", 2, "e2", "boom again").await.unwrap();

        let rows = store
            .read_by_status(Status::WaitingForRetry, ResourceScope::All)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].has_error.as_deref(),
            Some("http://lblod.info/blockchain/errors/e2")
        );
        assert_eq!(store.read_errors().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_writes_after_delete_are_noops() {
        let store = MemoryStore::new();
        store.insert_row(row("r1", ResourceType::Publish), Status::Publishing).await;
        store.delete("r1").await.unwrap();

        store.write_status("r1", Status::Published, Some("abc")).await.unwrap();
        assert_eq!(store.status_of("r1").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryStore::new();
        store.insert_row(row("r1", ResourceType::Publish), Status::Unpublished).await;
        store.set_fail_writes(true);

        let result = store.write_status("r1", Status::Publishing, None).await;
        assert!(matches!(result, Err(BrokerError::Store(_))));
    }
}
