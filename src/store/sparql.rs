//! SPARQL-backed resource store
//!
//! Talks SPARQL 1.1 protocol over HTTP: SELECTs are posted as the `query`
//! form field and answered as `application/sparql-results+json`, updates are
//! posted as the `update` form field.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::queries;
use super::ResourceStore;
use crate::resource::{ErrorEntry, NewResource, ResourceRow, ResourceScope, Status};
use crate::types::{BrokerError, Result};

/// Connection settings for the SPARQL endpoint
#[derive(Debug, Clone)]
pub struct SparqlConfig {
    /// Query/update endpoint
    pub endpoint: String,
    /// Graph that seeded resources are written to
    pub application_graph: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://database:8890/sparql".to_string(),
            application_graph: "http://mu.semte.ch/application".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    value: String,
}

type Bindings = HashMap<String, Binding>;

fn take(binding: &mut Bindings, name: &str) -> Option<String> {
    binding.remove(name).map(|b| b.value)
}

fn row_from_binding(mut binding: Bindings) -> Option<ResourceRow> {
    let id = take(&mut binding, "resource")?;
    Some(ResourceRow {
        id,
        resource_type: take(&mut binding, "type"),
        content: take(&mut binding, "content"),
        signatory: take(&mut binding, "signatory"),
        // GROUP_CONCAT binds an empty string when there are no roles
        roles: take(&mut binding, "roles").filter(|r| !r.is_empty()),
        secret: take(&mut binding, "secret"),
        subject: take(&mut binding, "subject"),
        created: take(&mut binding, "timestamp"),
        has_error: take(&mut binding, "hasError"),
    })
}

fn error_from_binding(mut binding: Bindings) -> Option<ErrorEntry> {
    let error_id = take(&mut binding, "error")?;
    let count = take(&mut binding, "count")?;
    let attempt_count = match count.parse() {
        Ok(n) => n,
        Err(_) => {
            warn!(error = %error_id, count = %count, "Skipping error record with invalid count");
            return None;
        }
    };
    Some(ErrorEntry {
        resource_id: take(&mut binding, "origin")?,
        error_id,
        attempt_count,
        message: take(&mut binding, "err").unwrap_or_default(),
    })
}

fn check_iri(value: &str) -> Result<()> {
    if queries::is_safe_iri(value) {
        Ok(())
    } else {
        Err(BrokerError::BadRequest(format!("Not a usable IRI: {}", value)))
    }
}

/// Resource store reached over the SPARQL protocol
pub struct SparqlStore {
    config: SparqlConfig,
    http_client: reqwest::Client,
}

impl SparqlStore {
    pub fn new(config: SparqlConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BrokerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &SparqlConfig {
        &self.config
    }

    async fn select(&self, query: String) -> Result<Vec<Bindings>> {
        debug!(endpoint = %self.config.endpoint, "SPARQL select");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query)])
            .send()
            .await
            .map_err(|e| BrokerError::Store(format!("Query failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Store(format!("Query returned HTTP {}: {}", status, body)));
        }

        let parsed: SparqlResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Store(format!("Invalid query response: {}", e)))?;

        Ok(parsed.results.bindings)
    }

    async fn update(&self, update: String) -> Result<()> {
        debug!(endpoint = %self.config.endpoint, "SPARQL update");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .form(&[("update", update)])
            .send()
            .await
            .map_err(|e| BrokerError::Store(format!("Update failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Store(format!("Update returned HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceStore for SparqlStore {
    async fn read_by_status(&self, status: Status, scope: ResourceScope) -> Result<Vec<ResourceRow>> {
        let bindings = self.select(queries::select_resources(status, scope)).await?;
        Ok(bindings.into_iter().filter_map(row_from_binding).collect())
    }

    async fn write_status(&self, id: &str, status: Status, content_hash: Option<&str>) -> Result<()> {
        check_iri(id)?;
        let update = match (status, content_hash) {
            (Status::Published, Some(hash)) => queries::update_published(id, hash),
            _ => queries::update_status(id, status),
        };
        self.update(update).await
    }

    async fn write_retry(&self, id: &str, attempt: u32, error_uuid: &str, message: &str) -> Result<()> {
        check_iri(id)?;
        check_iri(error_uuid)?;
        self.update(queries::insert_retry(id, attempt, error_uuid, message))
            .await
    }

    async fn read_errors(&self) -> Result<Vec<ErrorEntry>> {
        let bindings = self.select(queries::select_errors()).await?;
        Ok(bindings.into_iter().filter_map(error_from_binding).collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check_iri(id)?;
        self.update(queries::delete_status(id)).await
    }

    async fn delete_error(&self, error_id: &str) -> Result<()> {
        check_iri(error_id)?;
        self.update(queries::delete_error(error_id)).await
    }

    async fn insert_resource(&self, resource: &NewResource) -> Result<()> {
        check_iri(&resource.signatory)?;
        check_iri(&resource.subject)?;
        self.update(queries::insert_resource(&self.config.application_graph, resource))
            .await
    }
}
