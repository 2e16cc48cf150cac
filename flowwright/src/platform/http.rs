//! Reqwest-backed platform client with per-call timeouts.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::flow::Credential;

use super::{Chatflow, ChatflowSummary, PlatformClient, PlatformError, PredictOutcome};

/// HTTP client for a platform deployment.
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPlatformClient {
    /// Builds a client for `base_url` (no trailing slash) with the default
    /// 30 s per-call timeout.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, PlatformError> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, PlatformError> {
        let response = self.authorize(req).send().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Timeout
            } else {
                PlatformError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::status(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<Value, PlatformError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn list_chatflows(&self) -> Result<Vec<ChatflowSummary>, PlatformError> {
        let value = self.get_json("chatflows").await?;
        serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn get_chatflow(&self, id: &str) -> Result<Chatflow, PlatformError> {
        let value = self.get_json(&format!("chatflows/{}", id)).await?;
        serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn create_chatflow(
        &self,
        name: &str,
        flow_data: Value,
    ) -> Result<Chatflow, PlatformError> {
        let body = serde_json::json!({
            "name": name,
            "flowData": flow_data.to_string(),
        });
        let response = self
            .send(self.client.post(self.url("chatflows")).json(&body))
            .await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn update_chatflow(
        &self,
        id: &str,
        flow_data: Value,
    ) -> Result<Chatflow, PlatformError> {
        let body = serde_json::json!({"flowData": flow_data.to_string()});
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("chatflows/{}", id)))
                    .json(&body),
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn predict(&self, id: &str, question: &str) -> Result<PredictOutcome, PlatformError> {
        let body = serde_json::json!({"question": question});
        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("prediction/{}", id)))
                    .json(&body),
            )
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlatformError::Timeout
                } else {
                    PlatformError::Transport(e.to_string())
                }
            })?;
        // Prediction outcomes keep non-2xx statuses: the test node records
        // them instead of failing the session.
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(PredictOutcome {
            status,
            body_excerpt: crate::message::clamp_visible(body, super::MAX_BODY_EXCERPT_CHARS),
        })
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, PlatformError> {
        let value = self.get_json("credentials").await?;
        serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn get_node_schema(&self, name: &str) -> Result<Value, PlatformError> {
        self.get_json(&format!("nodes/{}", name)).await
    }

    async fn list_node_schemas(&self) -> Result<Vec<Value>, PlatformError> {
        let value = self.get_json("nodes").await?;
        serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: URL building normalizes the trailing slash.
    #[test]
    fn url_building() {
        let client = HttpPlatformClient::new("http://localhost:3000/", None).unwrap();
        assert_eq!(
            client.url("chatflows/cf-1"),
            "http://localhost:3000/api/v1/chatflows/cf-1"
        );
    }

    /// **Scenario**: Calls against an unreachable host surface a transport error.
    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = HttpPlatformClient::with_timeout(
            "http://127.0.0.1:1",
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let err = client.list_chatflows().await.unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Transport(_) | PlatformError::Timeout
        ));
    }
}
