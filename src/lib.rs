//! Event broker - publication engine for signed and published resources
//!
//! Tracks resources through their publication lifecycle and hands each one
//! off to the external decision service, retrying transient failures with
//! bounded backoff while never running two actions for the same signing
//! identity at once.
//!
//! ## Components
//!
//! - **Store**: resource status in a SPARQL graph store (or in memory)
//! - **Decision**: client for the decision service (`publish`, `sign`, burn, `validate`)
//! - **Engine**: classifier, batch dispatcher, notification pipeline, retry scheduler
//! - **Routes**: HTTP surface (`/notify`, `/getByStatus`, `/getErrors`, ...)

pub mod config;
pub mod decision;
pub mod engine;
pub mod resource;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use engine::{EngineConfig, PublicationEngine};
pub use server::{run, AppState};
pub use types::{BrokerError, Result};
