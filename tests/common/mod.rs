//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use event_broker::decision::{DecisionClient, DecisionError, DecisionPayload};
use event_broker::engine::{EngineConfig, PublicationEngine};
use event_broker::resource::{Action, ErrorEntry, NewResource, ResourceRow, ResourceScope, ResourceType, Status};
use event_broker::store::{MemoryStore, ResourceStore};
use event_broker::{BrokerError, Result};
use serde_json::{json, Value};
use tokio::time::Instant;

/// A recorded decision call
#[derive(Debug, Clone)]
pub struct Call {
    pub resource_id: String,
    pub action: Action,
    pub at: Instant,
}

/// Decision client whose answers are scripted per resource
#[derive(Default)]
pub struct ScriptedDecision {
    /// Remaining failures per resource; `u32::MAX` fails forever
    failures: Mutex<HashMap<String, u32>>,
    fail_everything: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
    /// Time each call takes
    latency: Duration,
}

impl ScriptedDecision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let client = Self::default();
        *client.fail_everything.lock().unwrap() = true;
        client
    }

    /// Fail the next `times` calls for a resource
    pub fn fail_times(&self, resource_id: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, resource_id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.resource_id == resource_id)
            .collect()
    }

    fn should_fail(&self, resource_id: &str) -> bool {
        if *self.fail_everything.lock().unwrap() {
            return true;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(resource_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl DecisionClient for ScriptedDecision {
    async fn invoke(&self, action: Action, payload: &DecisionPayload) -> std::result::Result<(), DecisionError> {
        self.calls.lock().unwrap().push(Call {
            resource_id: payload.id.clone(),
            action,
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail(&payload.id) {
            Err(DecisionError::Rejected {
                status: 502,
                message: "Bad Gateway".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn validate(&self, payload: &DecisionPayload) -> std::result::Result<Value, DecisionError> {
        Ok(json!({ "id": payload.id, "valid": true }))
    }
}

/// A complete resource row
pub fn resource(id: &str, subject: &str, signatory: &str, resource_type: ResourceType) -> ResourceRow {
    ResourceRow {
        id: format!("http://lblod.info/signed-resources/{}", id),
        resource_type: Some(resource_type.iri()),
        content: Some(format!("<div>{}</div>", id)),
        signatory: Some(format!("http://data.lblod.info/id/persoon/{}", signatory)),
        roles: Some("GelinktNotuleren-ondertekenaar,GelinktNotuleren-lezer".to_string()),
        secret: Some("helloworldsecretbehere".to_string()),
        subject: Some(format!("http://lblod.info/prepublished-agendas/{}", subject)),
        created: Some("2019-01-02T19:00:00.299Z".to_string()),
        has_error: None,
    }
}

pub async fn insert_unpublished(store: &MemoryStore, rows: Vec<ResourceRow>) -> Vec<String> {
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.id.clone());
        store.insert_row(row, Status::Unpublished).await;
    }
    ids
}

pub fn engine(store: &Arc<MemoryStore>, decision: &Arc<ScriptedDecision>, config: EngineConfig) -> PublicationEngine {
    PublicationEngine::new(store.clone(), decision.clone(), config)
}

/// Store that fails chosen status writes and delegates everything else
pub struct SelectiveFailStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<Vec<(String, Status)>>,
}

impl SelectiveFailStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Fail every write of `status` for resource `id`
    pub fn fail_status_write(&self, id: &str, status: Status) {
        self.failing.lock().unwrap().push((id.to_string(), status));
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl ResourceStore for SelectiveFailStore {
    async fn read_by_status(&self, status: Status, scope: ResourceScope) -> Result<Vec<ResourceRow>> {
        self.inner.read_by_status(status, scope).await
    }

    async fn write_status(&self, id: &str, status: Status, content_hash: Option<&str>) -> Result<()> {
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|(failing_id, failing_status)| failing_id == id && *failing_status == status);
        if fails {
            return Err(BrokerError::Store("boom".to_string()));
        }
        self.inner.write_status(id, status, content_hash).await
    }

    async fn write_retry(&self, id: &str, attempt: u32, error_uuid: &str, message: &str) -> Result<()> {
        self.inner.write_retry(id, attempt, error_uuid, message).await
    }

    async fn read_errors(&self) -> Result<Vec<ErrorEntry>> {
        self.inner.read_errors().await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn delete_error(&self, error_id: &str) -> Result<()> {
        self.inner.delete_error(error_id).await
    }

    async fn insert_resource(&self, resource: &NewResource) -> Result<()> {
        self.inner.insert_resource(resource).await
    }
}

pub fn engine_over(store: &Arc<SelectiveFailStore>, decision: &Arc<ScriptedDecision>, config: EngineConfig) -> PublicationEngine {
    PublicationEngine::new(store.clone(), decision.clone(), config)
}
