//! Phase A: intent classification and local context hydration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;
use crate::graph::{Next, Node};
use crate::llm::extract_json;
use crate::message::Message;
use crate::session::node_ids;
use crate::session::prompts::CLASSIFY_INTENT_SYSTEM;
use crate::session::SessionContext;
use crate::state::SessionState;

use super::{complete_and_record, DOMAIN};

/// LLM call, no tools. Emits `facts.chatflow.intent`, optional `target_name`,
/// and `intent_confidence`.
pub struct ClassifyIntentNode {
    ctx: Arc<SessionContext>,
}

impl ClassifyIntentNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for ClassifyIntentNode {
    fn id(&self) -> &str {
        node_ids::CLASSIFY_INTENT
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let messages = [
            Message::system(CLASSIFY_INTENT_SYSTEM),
            Message::user(state.requirement.clone()),
        ];
        let reply = complete_and_record(
            &self.ctx.llm,
            &mut state,
            node_ids::CLASSIFY_INTENT,
            &messages,
            None,
        )
        .await?;

        let parsed = extract_json(&reply.text).unwrap_or(Value::Null);
        let intent = match parsed.get("intent").and_then(|v| v.as_str()) {
            Some("update") => "update",
            Some("create") => "create",
            _ => "create",
        };
        let target_name = parsed
            .get("target_name")
            .and_then(|v| v.as_str())
            .map(String::from);
        let confidence = parsed
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.3)
            .clamp(0.0, 1.0);

        state.set_fact(DOMAIN, "intent", Value::String(intent.to_string()));
        state.set_fact(DOMAIN, "intent_confidence", serde_json::json!(confidence));
        if let Some(name) = &target_name {
            state.set_fact(DOMAIN, "target_name", Value::String(name.clone()));
        }
        let note = match &target_name {
            Some(name) => format!("Intent: {} (target: {}).", intent, name),
            None => format!("Intent: {}.", intent),
        };
        state.push_message(Message::assistant(note));
        Ok((state, Next::Continue))
    }
}

/// Deterministic. Loads node count and schema fingerprint from the local
/// knowledge store into facts; no network.
pub struct HydrateContextNode {
    ctx: Arc<SessionContext>,
}

impl HydrateContextNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for HydrateContextNode {
    fn id(&self) -> &str {
        node_ids::HYDRATE_CONTEXT
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let discover = self.ctx.capability.discover().await?;
        if let Some(count) = discover.get("node_type_count") {
            state.set_fact("knowledge", "node_type_count", count.clone());
        }
        if let Some(fp) = discover.get("schema_fingerprint") {
            state.set_fact("knowledge", "schema_fingerprint", fp.clone());
        }
        state.record_debug("knowledge", "discover", discover);
        Ok((state, Next::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::nodes::test_support::test_context;

    /// **Scenario**: A JSON classification reply lands in facts; prose falls back
    /// to create with low confidence.
    #[tokio::test]
    async fn classify_parses_and_falls_back() {
        let (ctx, _platform) = test_context(vec![
            r#"{"intent": "update", "target_name": "Trip Planner", "confidence": 0.92}"#,
            "I think you want a new flow.",
        ]);

        let node = ClassifyIntentNode::new(ctx.clone());
        let state = SessionState::new("s-1", "Add a flight-price tool to Trip Planner");
        let (state, _) = node.run(state).await.unwrap();
        assert_eq!(state.fact_str(DOMAIN, "intent"), Some("update"));
        assert_eq!(state.fact_str(DOMAIN, "target_name"), Some("Trip Planner"));

        let state2 = SessionState::new("s-2", "A chatbot that remembers context");
        let (state2, _) = node.run(state2).await.unwrap();
        assert_eq!(state2.fact_str(DOMAIN, "intent"), Some("create"));
        let confidence = state2
            .fact(DOMAIN, "intent_confidence")
            .unwrap()
            .as_f64()
            .unwrap();
        assert!(confidence < 0.5);
    }

    /// **Scenario**: Hydrate records node count and fingerprint without any
    /// platform call.
    #[tokio::test]
    async fn hydrate_is_local_only() {
        let (ctx, platform) = test_context(vec![]);
        let node = HydrateContextNode::new(ctx);
        let state = SessionState::new("s-1", "req");
        let (state, _) = node.run(state).await.unwrap();
        assert!(state.fact_u64("knowledge", "node_type_count").is_some());
        assert!(state.fact_str("knowledge", "schema_fingerprint").is_some());
        assert_eq!(
            platform
                .schema_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(platform.list_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
