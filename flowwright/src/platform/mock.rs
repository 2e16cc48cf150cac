//! In-memory platform for tests: call counters and conflict injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::flow::Credential;

use super::{Chatflow, ChatflowSummary, PlatformClient, PlatformError, PredictOutcome};

/// Scripted platform stand-in.
///
/// Counters let tests assert "exactly one fetch"; `edit_externally` mutates a
/// flow behind the session's back to provoke a write conflict.
#[derive(Default)]
pub struct MockPlatform {
    flows: Mutex<HashMap<String, Chatflow>>,
    credentials: Mutex<Vec<Credential>>,
    node_schemas: Mutex<HashMap<String, Value>>,
    predict_status: Mutex<u16>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub predict_calls: AtomicUsize,
    pub schema_fetches: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        *platform.predict_status.lock().expect("lock") = 200;
        platform
    }

    pub fn seed_chatflow(&self, id: &str, name: &str, flow_data: Value) {
        self.flows.lock().expect("lock").insert(
            id.to_string(),
            Chatflow {
                id: id.to_string(),
                name: name.to_string(),
                flow_data,
                updated_at: Some("2025-11-02T09:00:00Z".into()),
            },
        );
    }

    pub fn seed_credential(&self, id: &str, name: &str, kind: &str) {
        self.credentials.lock().expect("lock").push(Credential {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        });
    }

    pub fn seed_node_schema(&self, name: &str, schema: Value) {
        self.node_schemas
            .lock()
            .expect("lock")
            .insert(name.to_string(), schema);
    }

    pub fn set_predict_status(&self, status: u16) {
        *self.predict_status.lock().expect("lock") = status;
    }

    /// Mutates the stored flow outside the session, changing its hash.
    pub fn edit_externally(&self, id: &str, flow_data: Value) {
        if let Some(flow) = self.flows.lock().expect("lock").get_mut(id) {
            flow.flow_data = flow_data;
        }
    }

    pub fn stored_flow(&self, id: &str) -> Option<Value> {
        self.flows
            .lock()
            .expect("lock")
            .get(id)
            .map(|f| f.flow_data.clone())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn list_chatflows(&self) -> Result<Vec<ChatflowSummary>, PlatformError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .flows
            .lock()
            .expect("lock")
            .values()
            .map(|f| ChatflowSummary {
                id: f.id.clone(),
                name: f.name.clone(),
                updated_at: f.updated_at.clone(),
            })
            .collect())
    }

    async fn get_chatflow(&self, id: &str) -> Result<Chatflow, PlatformError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.flows
            .lock()
            .expect("lock")
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(id.to_string()))
    }

    async fn create_chatflow(
        &self,
        name: &str,
        flow_data: Value,
    ) -> Result<Chatflow, PlatformError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("cf-{}", self.flows.lock().expect("lock").len() + 1);
        let flow = Chatflow {
            id: id.clone(),
            name: name.to_string(),
            flow_data,
            updated_at: Some("2025-11-02T10:00:00Z".into()),
        };
        self.flows.lock().expect("lock").insert(id, flow.clone());
        Ok(flow)
    }

    async fn update_chatflow(
        &self,
        id: &str,
        flow_data: Value,
    ) -> Result<Chatflow, PlatformError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut flows = self.flows.lock().expect("lock");
        let flow = flows
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(id.to_string()))?;
        flow.flow_data = flow_data;
        Ok(flow.clone())
    }

    async fn predict(&self, _id: &str, question: &str) -> Result<PredictOutcome, PlatformError> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        let status = *self.predict_status.lock().expect("lock");
        Ok(PredictOutcome {
            status,
            body_excerpt: format!("echo: {}", question),
        })
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, PlatformError> {
        Ok(self.credentials.lock().expect("lock").clone())
    }

    async fn get_node_schema(&self, name: &str) -> Result<Value, PlatformError> {
        self.schema_fetches.fetch_add(1, Ordering::SeqCst);
        self.node_schemas
            .lock()
            .expect("lock")
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(name.to_string()))
    }

    async fn list_node_schemas(&self) -> Result<Vec<Value>, PlatformError> {
        Ok(self
            .node_schemas
            .lock()
            .expect("lock")
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Seeded flows round-trip through get/update and count calls.
    #[tokio::test]
    async fn seeded_flow_roundtrip_with_counters() {
        let platform = MockPlatform::new();
        platform.seed_chatflow("cf-1", "Trip Planner", serde_json::json!({"nodes": []}));

        let flow = platform.get_chatflow("cf-1").await.unwrap();
        assert_eq!(flow.name, "Trip Planner");
        platform
            .update_chatflow("cf-1", serde_json::json!({"nodes": [1]}))
            .await
            .unwrap();
        assert_eq!(platform.get_calls.load(Ordering::SeqCst), 1);
        assert_eq!(platform.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            platform.stored_flow("cf-1").unwrap(),
            serde_json::json!({"nodes": [1]})
        );
    }

    /// **Scenario**: Unknown ids surface NotFound.
    #[tokio::test]
    async fn unknown_id_not_found() {
        let platform = MockPlatform::new();
        assert!(matches!(
            platform.get_chatflow("missing").await,
            Err(PlatformError::NotFound(_))
        ));
    }
}
