//! Resource store gateway
//!
//! The graph store is the single source of truth for resource status. The
//! broker reaches it through [`ResourceStore`], which has two backends:
//!
//! - **SparqlStore**: SPARQL 1.1 query/update over HTTP (production)
//! - **MemoryStore**: in-process store for development and tests

pub mod memory;
pub mod queries;
pub mod sparql;

use crate::resource::{ErrorEntry, NewResource, ResourceRow, ResourceScope, Status};
use crate::types::Result;

pub use memory::MemoryStore;
pub use sparql::{SparqlConfig, SparqlStore};

/// Read/write access to resource state (allows mocking in tests)
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// All rows with the given status, restricted to the scope's types.
    /// Rows in `WAITING_FOR_RETRY` carry the attached error node.
    async fn read_by_status(&self, status: Status, scope: ResourceScope) -> Result<Vec<ResourceRow>>;

    /// Replace the status of a resource. The content hash is only stored
    /// alongside `PUBLISHED`.
    async fn write_status(&self, id: &str, status: Status, content_hash: Option<&str>) -> Result<()>;

    /// Attach a new error record and move the resource to `WAITING_FOR_RETRY`.
    /// The record is stored under [`queries::ERROR_IRI_BASE`] + `error_uuid`.
    async fn write_retry(&self, id: &str, attempt: u32, error_uuid: &str, message: &str) -> Result<()>;

    /// Every error record, unreduced
    async fn read_errors(&self) -> Result<Vec<ErrorEntry>>;

    /// Remove the status of a resource so it drops out of every status read
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove the message of an error record (by its full IRI)
    async fn delete_error(&self, error_id: &str) -> Result<()>;

    /// Insert a resource in `UNPUBLISHED` (development seeding)
    async fn insert_resource(&self, resource: &NewResource) -> Result<()>;
}
