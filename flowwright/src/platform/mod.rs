//! Remote platform REST client: list/get/create/update/predict endpoints.
//!
//! The session graph consumes this contract only; responses are wrapped via
//! the tool envelope before anything reaches LLM context. `HttpPlatformClient`
//! talks to a real deployment; `MockPlatform` drives tests with call counters
//! and conflict injection.

mod http;
mod mock;

pub use http::HttpPlatformClient;
pub use mock::MockPlatform;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::SessionError;
use crate::flow::Credential;
use crate::message::clamp_visible;

/// Upper bound on an error body excerpt carried in results and events.
pub const MAX_BODY_EXCERPT_CHARS: usize = 300;

/// Error from a platform API call.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Non-2xx response; excerpt is bounded.
    #[error("platform returned {status}: {body_excerpt}")]
    Status { status: u16, body_excerpt: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("decode: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl PlatformError {
    pub fn status(status: u16, body: &str) -> Self {
        PlatformError::Status {
            status,
            body_excerpt: clamp_visible(body.to_string(), MAX_BODY_EXCERPT_CHARS),
        }
    }
}

impl From<PlatformError> for SessionError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Status {
                status,
                body_excerpt,
            } => SessionError::External {
                status,
                excerpt: body_excerpt,
            },
            PlatformError::Timeout => SessionError::External {
                status: 0,
                excerpt: "request timed out".into(),
            },
            other => SessionError::External {
                status: 0,
                excerpt: other.to_string(),
            },
        }
    }
}

/// Listing entry for a chatflow; `updated_at` drives recency ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Full chatflow payload. `flow_data` is the raw flow JSON (string or object
/// form on the wire; normalized to a Value here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatflow {
    pub id: String,
    pub name: String,
    pub flow_data: Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Outcome of one prediction call: HTTP status plus a bounded body excerpt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictOutcome {
    pub status: u16,
    pub body_excerpt: String,
}

/// The platform REST contract the session consumes.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_chatflows(&self) -> Result<Vec<ChatflowSummary>, PlatformError>;

    async fn get_chatflow(&self, id: &str) -> Result<Chatflow, PlatformError>;

    async fn create_chatflow(&self, name: &str, flow_data: Value)
        -> Result<Chatflow, PlatformError>;

    /// Idempotent by id: repeating the same update is a no-op server-side.
    async fn update_chatflow(&self, id: &str, flow_data: Value)
        -> Result<Chatflow, PlatformError>;

    async fn predict(&self, id: &str, question: &str) -> Result<PredictOutcome, PlatformError>;

    async fn list_credentials(&self) -> Result<Vec<Credential>, PlatformError>;

    /// Raw node schema as returned by the platform; normalization happens in
    /// the knowledge store.
    async fn get_node_schema(&self, name: &str) -> Result<Value, PlatformError>;

    async fn list_node_schemas(&self) -> Result<Vec<Value>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: status() bounds the body excerpt.
    #[test]
    fn status_bounds_excerpt() {
        let long_body = "e".repeat(1000);
        let err = PlatformError::status(500, &long_body);
        match err {
            PlatformError::Status {
                status,
                body_excerpt,
            } => {
                assert_eq!(status, 500);
                assert!(body_excerpt.contains("chars truncated"));
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    /// **Scenario**: PlatformError maps into SessionError::External keeping the status.
    #[test]
    fn platform_error_maps_to_external() {
        let err: SessionError = PlatformError::status(404, "not found").into();
        match err {
            SessionError::External { status, excerpt } => {
                assert_eq!(status, 404);
                assert!(excerpt.contains("not found"));
            }
            other => panic!("expected External, got {:?}", other),
        }
    }

    /// **Scenario**: Chatflow deserializes from the camelCase wire format.
    #[test]
    fn chatflow_wire_format() {
        let raw = serde_json::json!({
            "id": "cf-1",
            "name": "Trip Planner",
            "flowData": {"nodes": [], "edges": []},
            "updatedAt": "2025-11-02T10:00:00Z"
        });
        let cf: Chatflow = serde_json::from_value(raw).unwrap();
        assert_eq!(cf.name, "Trip Planner");
        assert!(cf.flow_data.is_object());
    }
}
