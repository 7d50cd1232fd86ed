//! Development seeding endpoints
//!
//! Only routed when the broker runs in the development environment.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::{error_response, json_response, read_json};
use crate::engine::SeedRequest;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct SetupByNumberRequest {
    #[serde(default)]
    amount: usize,
}

/// `POST /setup`: insert one resource
pub async fn setup(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let request: SeedRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    info!("Adding resource");
    match state.engine.seed(&request).await {
        Ok(id) => json_response(StatusCode::OK, &json!({ "id": id })),
        Err(e) => {
            error!("Error during setup: {}", e);
            error_response(e)
        }
    }
}

/// `POST /setupByNumber`: insert a bulk batch
pub async fn setup_by_number(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let request: SetupByNumberRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    info!("Adding {} resources", request.amount);
    match state.engine.seed_many(request.amount).await {
        Ok(inserted) => json_response(StatusCode::OK, &json!({ "inserted": inserted })),
        Err(e) => {
            error!("Error during setupByNumber: {}", e);
            error_response(e)
        }
    }
}

/// `POST /reset`: cancel retries and clear every status and error
pub async fn reset(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.engine.reset().await {
        Ok(()) => json_response(StatusCode::OK, &json!({ "msg": "Reset complete" })),
        Err(e) => {
            error!("Error during reset: {}", e);
            error_response(e)
        }
    }
}
