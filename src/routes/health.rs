//! Health and version endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub msg: &'static str,
    pub version: &'static str,
    pub environment: String,
    /// Uptime in seconds
    pub uptime: u64,
    /// Retries waiting for their timer
    #[serde(rename = "pendingRetries")]
    pub pending_retries: usize,
}

/// Liveness probe
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        msg: "Event broker up and running!",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.args.environment.to_string(),
        uptime: state.started.elapsed().as_secs(),
        pending_retries: state.engine.scheduler().len(),
    };
    json_response(StatusCode::OK, &response)
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    #[serde(rename = "commitFull")]
    pub commit_full: &'static str,
    #[serde(rename = "buildTime")]
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Build information for deployment verification
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "event-broker",
    };
    json_response(StatusCode::OK, &response)
}
