//! Decision service over HTTP

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{DecisionClient, DecisionError, DecisionPayload};
use crate::resource::Action;
use crate::types::{BrokerError, Result};

/// JSON:API error document
#[derive(Debug, Deserialize)]
struct ErrorDocument {
    errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    title: Option<String>,
}

/// Pick the message for a non-2xx response: the first JSON:API error title,
/// falling back to the HTTP status text.
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorDocument>(body)
        .ok()
        .and_then(|doc| doc.errors.into_iter().next())
        .and_then(|error| error.title)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        })
}

/// Decision service reached over HTTP
pub struct HttpDecisionClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpDecisionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/decision/{}", self.base_url, endpoint)
    }

    async fn post(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        payload: &DecisionPayload,
    ) -> std::result::Result<reqwest::Response, DecisionError> {
        let url = self.url(endpoint);
        debug!(url = %url, resource = %payload.id, "Calling decision service");

        let response = self
            .http_client
            .post(&url)
            .query(query)
            .json(payload)
            .send()
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DecisionError::Rejected {
            status: status.as_u16(),
            message: rejection_message(status, &body),
        })
    }
}

#[async_trait::async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn invoke(&self, action: Action, payload: &DecisionPayload) -> std::result::Result<(), DecisionError> {
        self.post(action.endpoint(), action.query(), payload).await?;
        Ok(())
    }

    async fn validate(&self, payload: &DecisionPayload) -> std::result::Result<Value, DecisionError> {
        let response = self.post("validate", &[], payload).await?;
        let body = response
            .text()
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;
        // Non-JSON verdicts are passed through as strings
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_prefers_json_api_title() {
        let body = r#"{"errors":[{"title":"Signature mismatch"},{"title":"other"}]}"#;
        assert_eq!(
            rejection_message(reqwest::StatusCode::BAD_REQUEST, body),
            "Signature mismatch"
        );
    }

    #[test]
    fn test_rejection_message_falls_back_to_status() {
        assert_eq!(
            rejection_message(reqwest::StatusCode::BAD_GATEWAY, "<html>"),
            "Bad Gateway"
        );
    }

    #[test]
    fn test_url_building() {
        let client = HttpDecisionClient::new("http://decisionservice/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("sign"), "http://decisionservice/decision/sign");
    }
}
