//! Publication endpoints
//!
//! - `POST /notify`: run one dispatch cycle
//! - `GET /getByStatus/{status}`: resources in a status
//! - `POST|GET /getErrors`: current error of each resource
//! - `POST /validateAll`: validate every published resource
//! - `GET /retries`: scheduled retries

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::{error_response, json_response};
use crate::resource::Status;
use crate::server::AppState;

pub async fn notify(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.engine.notify().await {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(e) => {
            error!("Error during notify: {}", e);
            error_response(e)
        }
    }
}

/// `status` is the path segment after `/getByStatus/`
pub async fn get_by_status(state: Arc<AppState>, status: &str) -> Response<Full<Bytes>> {
    let status: Status = match status.parse() {
        Ok(status) => status,
        Err(e) => return error_response(e),
    };

    match state.engine.by_status(status).await {
        Ok(result) => json_response(StatusCode::OK, &json!({ "result": result })),
        Err(e) => {
            error!("Error during query by status: {}", e);
            error_response(e)
        }
    }
}

pub async fn get_errors(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.engine.errors().await {
        Ok(result) => json_response(StatusCode::OK, &json!({ "result": result })),
        Err(e) => {
            error!("Error during query on errors: {}", e);
            error_response(e)
        }
    }
}

pub async fn validate_all(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.engine.validate_all().await {
        Ok(responses) if responses.is_empty() => {
            info!("No resources found to validate");
            json_response(StatusCode::OK, &json!({ "msg": "No resources found" }))
        }
        Ok(responses) => json_response(StatusCode::OK, &json!({ "responses": responses })),
        Err(e) => {
            error!("Error during validation: {}", e);
            error_response(e)
        }
    }
}

pub fn list_retries(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let pending = state.engine.pending_retries();
    json_response(StatusCode::OK, &json!({ "result": pending }))
}
