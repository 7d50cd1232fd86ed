//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::engine::PublicationEngine;
use crate::routes;
use crate::types::BrokerError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub engine: Arc<PublicationEngine>,
    pub started: Instant,
}

impl AppState {
    pub fn new(args: Args, engine: Arc<PublicationEngine>) -> Self {
        Self {
            args,
            engine,
            started: Instant::now(),
        }
    }
}

/// Accept connections until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<(), BrokerError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Event broker listening on {}", state.args.listen);

    if state.args.environment.is_development() {
        warn!("Development environment - /setup, /reset and /setupByNumber are enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
pub async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let dev_routes = state.args.environment.is_development();

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health-check") => routes::health_check(Arc::clone(&state)),
        (Method::GET, "/version") => routes::version_info(),

        (Method::POST, "/notify") => routes::notify(Arc::clone(&state)).await,
        (Method::GET, p) if p.starts_with("/getByStatus/") => {
            let status = &p["/getByStatus/".len()..];
            routes::get_by_status(Arc::clone(&state), status).await
        }
        (Method::POST, "/getErrors") | (Method::GET, "/getErrors") => {
            routes::get_errors(Arc::clone(&state)).await
        }
        (Method::POST, "/validateAll") => routes::validate_all(Arc::clone(&state)).await,
        (Method::GET, "/retries") => routes::list_retries(Arc::clone(&state)),

        (Method::POST, "/setup") if dev_routes => routes::setup(Arc::clone(&state), req).await,
        (Method::POST, "/reset") if dev_routes => routes::reset(Arc::clone(&state)).await,
        (Method::POST, "/setupByNumber") if dev_routes => {
            routes::setup_by_number(Arc::clone(&state), req).await
        }

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(BrokerError::NotFound(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_response() {
        let response = not_found_response("/nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["message"], "Not found: /nope");
    }
}
