//! Configuration for the event broker
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::retry::BackoffTable;
use crate::engine::EngineConfig;
use crate::store::SparqlConfig;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Production,
    Test,
    Provision,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Seeding and reset routes are only mounted in development
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
            Self::Provision => "provision",
        };
        f.write_str(name)
    }
}

/// Which resource store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// SPARQL 1.1 endpoint
    Sparql,
    /// In-process store (development only)
    Memory,
}

/// Event broker - publication engine for signed and published resources
#[derive(Parser, Debug, Clone)]
#[command(name = "event-broker")]
#[command(about = "Dispatches resources to the decision service and tracks their publication status")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:80")]
    pub listen: SocketAddr,

    /// Deployment environment (selects the backoff table and dev routes)
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Resource store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "sparql")]
    pub store_backend: StoreBackend,

    /// SPARQL query/update endpoint
    #[arg(long, env = "MU_SPARQL_ENDPOINT", default_value = "http://database:8890/sparql")]
    pub sparql_endpoint: String,

    /// Graph that seeded resources are written to
    #[arg(long, env = "MU_APPLICATION_GRAPH", default_value = "http://mu.semte.ch/application")]
    pub application_graph: String,

    /// Base URL of the decision service
    #[arg(long, env = "DECISION_SERVICE_URL", default_value = "http://decisionservice")]
    pub decision_service_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Timeout for store and decision-service requests in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Maximum number of chunks a resource list is split into
    #[arg(long, env = "DISPATCH_FANOUT", default_value = "5")]
    pub dispatch_fanout: usize,

    /// Concurrent detached chunks for deferred dispatch
    #[arg(long, env = "DEFERRED_WORKERS", default_value = "5")]
    pub deferred_workers: usize,

    /// Attempts before a resource is marked failed
    #[arg(long, env = "MAX_ATTEMPTS", default_value = "6")]
    pub max_attempts: u32,

    /// Reschedule retries left pending by a previous process on startup
    #[arg(long, env = "RESUME_RETRIES", default_value = "true")]
    pub resume_retries: bool,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff table for the configured environment
    pub fn backoff(&self) -> BackoffTable {
        if self.environment.is_production() {
            BackoffTable::production()
        } else {
            BackoffTable::short()
        }
    }

    pub fn sparql_config(&self) -> SparqlConfig {
        SparqlConfig {
            endpoint: self.sparql_endpoint.clone(),
            application_graph: self.application_graph.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fanout: self.dispatch_fanout,
            deferred_workers: self.deferred_workers,
            max_attempts: self.max_attempts,
            backoff: self.backoff(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatch_fanout == 0 {
            return Err("DISPATCH_FANOUT must be at least 1".to_string());
        }

        if self.deferred_workers == 0 {
            return Err("DEFERRED_WORKERS must be at least 1".to_string());
        }

        if self.max_attempts < 1 {
            return Err("MAX_ATTEMPTS must be at least 1".to_string());
        }

        if self.environment.is_production() && self.store_backend == StoreBackend::Memory {
            return Err("The memory store cannot be used in production".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["event-broker"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--environment", "development", "--store-backend", "sparql"]);
        assert_eq!(args.dispatch_fanout, 5);
        assert_eq!(args.max_attempts, 6);
        assert!(args.validate().is_ok());
        assert_eq!(args.backoff(), BackoffTable::short());
    }

    #[test]
    fn test_production_backoff() {
        let args = parse(&["--environment", "production", "--store-backend", "sparql"]);
        assert_eq!(args.backoff(), BackoffTable::production());
    }

    #[test]
    fn test_validate_rejects_memory_in_production() {
        let args = parse(&["--environment", "production", "--store-backend", "memory"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let args = parse(&[
            "--environment",
            "test",
            "--store-backend",
            "memory",
            "--dispatch-fanout",
            "0",
        ]);
        assert!(args.validate().is_err());
    }
}
