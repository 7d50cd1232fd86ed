//! HTTP routes for the event broker

pub mod broker;
pub mod health;
pub mod seed;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::{BrokerError, Result};

pub use broker::{get_by_status, get_errors, list_retries, notify, validate_all};
pub use health::{health_check, version_info};
pub use seed::{reset, setup, setup_by_number};

/// JSON response with CORS header
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal Server Error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Error response with the status code of the error
pub fn error_response(err: BrokerError) -> Response<Full<Bytes>> {
    let (status, message) = err.into_status_code_and_body();
    let body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    });
    json_response(status, &body)
}

/// Read a JSON request body. An empty body decodes as `T::default()`.
pub async fn read_json<T>(req: Request<Incoming>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let body = req.into_body().collect().await?.to_bytes();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&body)
        .map_err(|e| BrokerError::BadRequest(format!("Invalid JSON body: {}", e)))
}
