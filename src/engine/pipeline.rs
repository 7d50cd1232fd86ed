//! Notification pipeline
//!
//! Handles one resource end to end: build the payload, call the decision
//! service and record the outcome. Failures of the decision call go through
//! the retry policy; malformed rows are failed immediately without a retry
//! record. Only store errors escape, and only after the rest of the chunk has
//! been processed.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::retry::{PendingRetry, RetryDecision, RetryPolicy, RetryScheduler};
use crate::decision::{DecisionClient, DecisionError, DecisionPayload};
use crate::resource::{Action, ResourceRow, Status};
use crate::store::ResourceStore;
use crate::types::{BrokerError, Result};

/// A resource ready to be sent to the decision service
#[derive(Debug, Clone)]
pub struct Delivery {
    pub resource_id: String,
    pub action: Action,
    pub payload: DecisionPayload,
}

/// Final or intermediate result of processing one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Burned,
    /// The call failed and a retry was scheduled
    RetryScheduled { attempt: u32, delay: Duration },
    /// Attempts exhausted, resource marked failed
    Failed { attempts: u32 },
    /// Payload could not be built, resource marked failed
    Malformed { reason: String },
}

pub struct NotificationPipeline {
    store: Arc<dyn ResourceStore>,
    decision: Arc<dyn DecisionClient>,
    policy: RetryPolicy,
    scheduler: RetryScheduler,
}

impl NotificationPipeline {
    pub fn new(store: Arc<dyn ResourceStore>, decision: Arc<dyn DecisionClient>, policy: RetryPolicy) -> Self {
        Self {
            store,
            decision,
            policy,
            scheduler: RetryScheduler::new(),
        }
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process a chunk sequentially. Every resource is attempted; the first
    /// store error is returned once the chunk is done.
    pub async fn process_chunk(self: &Arc<Self>, rows: Vec<ResourceRow>) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(rows.len());
        let mut first_error = None;

        for row in rows {
            let id = row.id.clone();
            match self.process(row).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(resource = %id, error = %e, "Failed to record outcome");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Process one resource that is already in `PUBLISHING`
    pub async fn process(self: &Arc<Self>, row: ResourceRow) -> Result<Outcome> {
        match DecisionPayload::from_row(&row) {
            Ok((kind, payload)) => {
                let delivery = Delivery {
                    resource_id: row.id,
                    action: kind.action(),
                    payload,
                };
                Arc::clone(self).deliver(delivery, 0).await
            }
            Err(e) => {
                let reason = match e {
                    BrokerError::Malformed { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(resource = %row.id, reason = %reason, "Malformed resource, marking failed");
                self.store.write_status(&row.id, Status::Failed, None).await?;
                Ok(Outcome::Malformed { reason })
            }
        }
    }

    /// Call the decision service for a delivery and record the result.
    /// `previous_attempt` is the attempt count already recorded for it.
    pub fn deliver(self: Arc<Self>, delivery: Delivery, previous_attempt: u32) -> BoxFuture<'static, Result<Outcome>> {
        async move {
            let result = self.decision.invoke(delivery.action, &delivery.payload).await;
            match result {
                Ok(()) => {
                    let status = delivery.action.success_status();
                    let hash = (status == Status::Published).then_some(delivery.payload.content.as_str());
                    self.store.write_status(&delivery.resource_id, status, hash).await?;
                    info!(resource = %delivery.resource_id, status = %status, "Decision accepted");

                    Ok(match status {
                        Status::Burned => Outcome::Burned,
                        _ => Outcome::Published,
                    })
                }
                Err(e) => self.handle_failure(delivery, previous_attempt, e).await,
            }
        }
        .boxed()
    }

    /// Re-deliver after `delay`, continuing from `attempt`
    pub fn schedule_retry(self: &Arc<Self>, delivery: Delivery, attempt: u32, delay: Duration) {
        let info = PendingRetry {
            resource_id: delivery.resource_id.clone(),
            action: delivery.action,
            attempt,
            fire_at: chrono::Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        };

        let pipeline = Arc::clone(self);
        self.scheduler.schedule(info, delay, async move {
            let id = delivery.resource_id.clone();
            if let Err(e) = pipeline.deliver(delivery, attempt).await {
                error!(resource = %id, attempt, error = %e, "Retry failed to record outcome");
            }
        });
    }

    async fn handle_failure(
        self: &Arc<Self>,
        delivery: Delivery,
        previous_attempt: u32,
        failure: DecisionError,
    ) -> Result<Outcome> {
        match self.policy.next(previous_attempt) {
            RetryDecision::Retry { attempt, delay } => {
                let error_uuid = Uuid::new_v4().to_string();
                self.store
                    .write_retry(&delivery.resource_id, attempt, &error_uuid, &failure.ledger_message())
                    .await?;
                info!(
                    resource = %delivery.resource_id,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %failure,
                    "Decision call failed, retry scheduled"
                );

                self.schedule_retry(delivery, attempt, delay);

                Ok(Outcome::RetryScheduled { attempt, delay })
            }
            RetryDecision::GiveUp { attempts } => {
                self.store
                    .write_status(&delivery.resource_id, Status::Failed, None)
                    .await?;
                warn!(
                    resource = %delivery.resource_id,
                    attempts,
                    error = %failure,
                    "Attempts exhausted, marking failed"
                );
                Ok(Outcome::Failed { attempts })
            }
        }
    }
}
