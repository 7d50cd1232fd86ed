//! Resource publication engine
//!
//! One dispatch cycle (`notify`) reads every unpublished resource, collapses
//! and partitions it, marks everything `PUBLISHING` and hands the exclusive
//! set to the dispatcher in await mode and the deferred set in detach mode.
//!
//! ```text
//! store ──▶ classifier ──▶ dispatcher ──▶ pipeline ──▶ decision service
//!                                            │
//!                                            ├─ success ─▶ store
//!                                            └─ failure ─▶ retry scheduler ─▶ store
//!                                                                 └──────────▶ pipeline
//! ```

pub mod classifier;
pub mod dispatcher;
pub mod ledger;
pub mod pipeline;
pub mod retry;
pub mod seed;

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::decision::{DecisionClient, DecisionPayload};
use crate::resource::{ErrorEntry, ResourceRow, ResourceScope, ResourceType, Status};
use crate::store::ResourceStore;
use crate::types::{BrokerError, Result};

pub use classifier::Partition;
pub use dispatcher::{BatchDispatcher, DispatchMode};
pub use pipeline::{Delivery, NotificationPipeline, Outcome};
pub use retry::{BackoffTable, PendingRetry, RetryPolicy, RetryScheduler, MAX_ATTEMPTS};
pub use seed::{SeedRequest, MAX_SEED_AMOUNT};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum chunks per dispatch
    pub fanout: usize,
    /// Concurrent detached chunks
    pub deferred_workers: usize,
    pub max_attempts: u32,
    pub backoff: BackoffTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fanout: 5,
            deferred_workers: 5,
            max_attempts: MAX_ATTEMPTS,
            backoff: BackoffTable::short(),
        }
    }
}

/// Counts of one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifySummary {
    pub exclusive: usize,
    pub deferred: usize,
}

/// Whether a row was read as publish-shaped or sign-shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Publishing,
    Signing,
}

/// A resource as reported by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub id: String,
    pub content: Option<String>,
    pub signatory: Option<String>,
    pub resource_id: Option<String>,
    pub timestamp: Option<String>,
    pub resource_type: Option<String>,
    /// SHA-256 of the content
    pub hash: Option<String>,
    pub has_error: Option<String>,
    #[serde(rename = "type")]
    pub category: Category,
}

impl StatusView {
    fn from_row(row: ResourceRow, category: Category) -> Self {
        Self {
            hash: row.content.as_deref().map(crate::decision::payload::content_hash),
            id: row.id,
            content: row.content,
            signatory: row.signatory,
            resource_id: row.subject,
            timestamp: row.created,
            resource_type: row.resource_type,
            has_error: row.has_error,
            category,
        }
    }
}

/// Owns the store, the decision client and the dispatch machinery
pub struct PublicationEngine {
    store: Arc<dyn ResourceStore>,
    decision: Arc<dyn DecisionClient>,
    pipeline: Arc<NotificationPipeline>,
    dispatcher: BatchDispatcher,
}

impl PublicationEngine {
    pub fn new(store: Arc<dyn ResourceStore>, decision: Arc<dyn DecisionClient>, config: EngineConfig) -> Self {
        let policy = RetryPolicy::new(config.max_attempts, config.backoff);
        let pipeline = Arc::new(NotificationPipeline::new(
            Arc::clone(&store),
            Arc::clone(&decision),
            policy,
        ));
        let dispatcher = BatchDispatcher::new(Arc::clone(&pipeline), config.fanout, config.deferred_workers);

        Self {
            store,
            decision,
            pipeline,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        self.pipeline.scheduler()
    }

    /// Run one dispatch cycle. Returns once the exclusive set has been
    /// attempted; the deferred set continues in the background.
    ///
    /// Every resource marked `PUBLISHING` is dispatched even when a store
    /// write fails along the way; the first such error is returned afterwards.
    pub async fn notify(&self) -> Result<NotifySummary> {
        info!("Notified, querying unpublished resources");
        let rows = self
            .store
            .read_by_status(Status::Unpublished, ResourceScope::All)
            .await?;

        let (marked, mark_error) = self.mark_publishing(classifier::partition(rows)).await;

        let summary = NotifySummary {
            exclusive: marked.exclusive.len(),
            deferred: marked.deferred.len(),
        };
        info!(
            exclusive = summary.exclusive,
            deferred = summary.deferred,
            "{} resources ready to be published/signed/burned",
            marked.len()
        );

        let awaited = self
            .dispatcher
            .dispatch(marked.exclusive, DispatchMode::Await)
            .await;
        let detached = self
            .dispatcher
            .dispatch(marked.deferred, DispatchMode::Detach)
            .await;

        if let Some(e) = mark_error {
            return Err(e);
        }
        awaited?;
        detached?;
        Ok(summary)
    }

    /// Mark rows `PUBLISHING`, exclusive first. Stops at the first failed
    /// write; unmarked rows stay `UNPUBLISHED` for the next cycle.
    async fn mark_publishing(&self, partition: Partition) -> (Partition, Option<BrokerError>) {
        let mut marked = Partition::default();
        let rows = partition
            .exclusive
            .into_iter()
            .map(|row| (row, true))
            .chain(partition.deferred.into_iter().map(|row| (row, false)));

        for (row, exclusive) in rows {
            if let Err(e) = self.store.write_status(&row.id, Status::Publishing, None).await {
                error!(resource = %row.id, error = %e, "Failed to mark resource publishing");
                return (marked, Some(e));
            }
            if exclusive {
                marked.exclusive.push(row);
            } else {
                marked.deferred.push(row);
            }
        }

        (marked, None)
    }

    /// Publish-shaped then sign-shaped rows of a status. Retry reads only
    /// keep rows attached to the current error of their resource.
    pub async fn by_status(&self, status: Status) -> Result<Vec<StatusView>> {
        let published = self.store.read_by_status(status, ResourceScope::Publish).await?;
        let signed = self.store.read_by_status(status, ResourceScope::Sign).await?;

        let views = published
            .into_iter()
            .map(|row| (row, Category::Publishing))
            .chain(signed.into_iter().map(|row| (row, Category::Signing)));

        if status != Status::WaitingForRetry {
            return Ok(views.map(|(row, category)| StatusView::from_row(row, category)).collect());
        }

        let current = self.errors().await?;
        Ok(views
            .filter(|(row, _)| ledger::is_current(row, &current))
            .map(|(row, category)| StatusView::from_row(row, category))
            .collect())
    }

    /// The current error of every resource that has one
    pub async fn errors(&self) -> Result<Vec<ErrorEntry>> {
        let entries = self.store.read_errors().await?;
        Ok(ledger::reduce_errors(entries))
    }

    /// Ask the decision service to validate every published resource.
    /// Returns the verdicts in order; empty when nothing is published.
    pub async fn validate_all(&self) -> Result<Vec<Value>> {
        let published = self.store.read_by_status(Status::Published, ResourceScope::Publish).await?;
        let signed = self.store.read_by_status(Status::Published, ResourceScope::Sign).await?;

        let mut seen = HashSet::new();
        let mut responses = Vec::new();
        for row in published.into_iter().chain(signed) {
            if !seen.insert(row.id.clone()) {
                continue;
            }
            if matches!(row.kind(), Ok(ResourceType::Burn)) {
                continue;
            }
            let payload = match DecisionPayload::from_row(&row) {
                Ok((_, payload)) => payload,
                Err(e) => {
                    warn!(resource = %row.id, error = %e, "Skipping validation of malformed resource");
                    continue;
                }
            };
            let verdict = self
                .decision
                .validate(&payload)
                .await
                .map_err(|e| BrokerError::Decision(e.to_string()))?;
            responses.push(verdict);
        }

        Ok(responses)
    }

    /// Insert one development resource
    pub async fn seed(&self, request: &SeedRequest) -> Result<String> {
        let resource = seed::from_request(request);
        self.store.insert_resource(&resource).await?;
        info!(resource = %resource.iri(), "Seeded resource");
        Ok(resource.iri())
    }

    /// Insert a bulk development batch, returning the number of resources
    pub async fn seed_many(&self, amount: usize) -> Result<usize> {
        if amount > seed::MAX_SEED_AMOUNT {
            return Err(BrokerError::BadRequest(format!(
                "amount must be at most {}",
                seed::MAX_SEED_AMOUNT
            )));
        }
        let resources = seed::batch(amount);
        for resource in &resources {
            self.store.insert_resource(resource).await?;
        }
        info!(amount, inserted = resources.len(), "Seeded resources");
        Ok(resources.len())
    }

    /// Cancel pending retries and remove every resource status and error
    pub async fn reset(&self) -> Result<()> {
        let cancelled = self.scheduler().cancel_all();

        let mut deleted = HashSet::new();
        for status in Status::ALL {
            for row in self.store.read_by_status(status, ResourceScope::All).await? {
                if deleted.insert(row.id.clone()) {
                    self.store.delete(&row.id).await?;
                }
            }
        }

        let errors = self.store.read_errors().await?;
        for error in &errors {
            self.store.delete_error(&error.error_id).await?;
        }

        info!(
            cancelled,
            resources = deleted.len(),
            errors = errors.len(),
            "Reset resource store"
        );
        Ok(())
    }

    /// Snapshot of scheduled retries
    pub fn pending_retries(&self) -> Vec<PendingRetry> {
        self.scheduler().pending()
    }

    /// Reschedule retries orphaned by a previous process. Only resources
    /// whose attached error is their current error are resumed, continuing
    /// from the recorded attempt count.
    pub async fn resume_orphaned_retries(&self) -> Result<usize> {
        let rows = self
            .store
            .read_by_status(Status::WaitingForRetry, ResourceScope::All)
            .await?;
        let current = self.errors().await?;
        let rows = ledger::current_retry_rows(rows, &current);

        let mut resumed = 0;
        for row in rows {
            let Some(attempt) = current
                .iter()
                .find(|e| e.resource_id == row.id)
                .map(|e| e.attempt_count)
            else {
                continue;
            };

            let (kind, payload) = match DecisionPayload::from_row(&row) {
                Ok(built) => built,
                Err(e) => {
                    warn!(resource = %row.id, error = %e, "Cannot resume malformed resource, marking failed");
                    self.store.write_status(&row.id, Status::Failed, None).await?;
                    continue;
                }
            };

            let delay = self.pipeline.policy().backoff.delay_for(attempt);
            let delivery = Delivery {
                resource_id: row.id,
                action: kind.action(),
                payload,
            };
            self.pipeline.schedule_retry(delivery, attempt, delay);
            resumed += 1;
        }

        if resumed > 0 {
            info!(resumed, "Resumed pending retries");
        }
        Ok(resumed)
    }
}
