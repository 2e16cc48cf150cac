//! Phase C (UPDATE only): baseline load and deterministic summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;
use crate::flow::{flow_hash, FlowGraph};
use crate::graph::{Next, Node};
use crate::session::{node_ids, SessionContext};
use crate::state::SessionState;

use super::DOMAIN;

/// Exactly one API call: fetches the target flow, stores it in artifacts and
/// its SHA-256 in facts. Never re-fetches within the same iteration.
pub struct LoadCurrentFlowNode {
    ctx: Arc<SessionContext>,
}

impl LoadCurrentFlowNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for LoadCurrentFlowNode {
    fn id(&self) -> &str {
        node_ids::LOAD_CURRENT_FLOW
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let loaded_iter = state.fact_u64(DOMAIN, "flow_loaded_iter");
        if loaded_iter == Some(state.iteration as u64)
            && state.artifact(DOMAIN, "current_flow_data").is_some()
        {
            return Ok((state, Next::Continue));
        }

        let target_id = state
            .fact_str(DOMAIN, "target_chatflow_id")
            .ok_or_else(|| SessionError::Internal("no target chatflow id".into()))?
            .to_string();
        let chatflow = self
            .ctx
            .platform
            .get_chatflow(&target_id)
            .await
            .map_err(SessionError::from)?;

        let flow = FlowGraph::from_value(&chatflow.flow_data)
            .map_err(|e| SessionError::Validation(format!("target flow unparsable: {}", e)))?;
        let hash = flow_hash(&flow);

        state.push_tool_summary(
            "platform.get_chatflow",
            &format!("Chatflow '{}' (id={}).", chatflow.name, chatflow.id),
        );
        state.set_fact(DOMAIN, "target_name", Value::String(chatflow.name));
        state.set_fact(DOMAIN, "current_flow_hash", Value::String(hash.clone()));
        state.set_fact(DOMAIN, "pre_patch_flow_hash", Value::String(hash));
        state.set_fact(
            DOMAIN,
            "flow_loaded_iter",
            serde_json::json!(state.iteration),
        );
        state.set_artifact(DOMAIN, "current_flow_data", flow.to_value());
        Ok((state, Next::Continue))
    }
}

/// Deterministic compact summary of the loaded flow, guaranteed under
/// 2,000 chars; the full flow never enters prompts after this node.
pub struct SummarizeCurrentFlowNode;

impl SummarizeCurrentFlowNode {
    pub fn new() -> Self {
        Self
    }

    /// Builds the summary record from a flow.
    pub fn summarize(flow: &FlowGraph) -> Value {
        let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
        for node in &flow.nodes {
            *histogram.entry(node.data.name.clone()).or_default() += 1;
        }
        let top_labels: Vec<String> = flow
            .nodes
            .iter()
            .take(8)
            .map(|n| n.data.label.clone())
            .collect();
        let key_tool_nodes: Vec<String> = flow
            .nodes
            .iter()
            .filter(|n| {
                let category = n.data.category.to_lowercase();
                category.contains("tool") || category.contains("agent")
            })
            .map(|n| n.id.clone())
            .take(8)
            .collect();
        serde_json::json!({
            "node_count": flow.nodes.len(),
            "edge_count": flow.edges.len(),
            "node_types": histogram,
            "top_labels": top_labels,
            "key_tool_nodes": key_tool_nodes,
        })
    }
}

impl Default for SummarizeCurrentFlowNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node<SessionState> for SummarizeCurrentFlowNode {
    fn id(&self) -> &str {
        node_ids::SUMMARIZE_CURRENT_FLOW
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let flow_value = state
            .artifact(DOMAIN, "current_flow_data")
            .ok_or_else(|| SessionError::Internal("no current flow to summarize".into()))?;
        let flow = FlowGraph::from_value(flow_value)
            .map_err(|e| SessionError::Internal(format!("stored flow unparsable: {}", e)))?;

        let mut summary = Self::summarize(&flow);
        let mut rendered = summary.to_string();
        if rendered.chars().count() >= 2000 {
            // Histogram and ids dominate; drop the optional lists to stay compact.
            summary["top_labels"] = Value::Array(vec![]);
            summary["key_tool_nodes"] = Value::Array(vec![]);
            rendered = summary.to_string();
            // Labels come from the platform; cut on char boundaries, never bytes.
            if rendered.chars().count() >= 2000 {
                rendered = rendered.chars().take(1999).collect();
            }
        }
        state.set_fact(DOMAIN, "flow_summary", Value::String(rendered));
        Ok((state, Next::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::nodes::test_support::test_context;

    fn seeded_update_state(platform: &crate::platform::MockPlatform) -> SessionState {
        platform.seed_chatflow(
            "cf-1",
            "Trip Planner",
            serde_json::json!({"nodes": [], "edges": []}),
        );
        let mut state = SessionState::new("s-1", "Add a tool");
        state.set_fact(DOMAIN, "intent", serde_json::json!("update"));
        state.set_fact(DOMAIN, "target_chatflow_id", serde_json::json!("cf-1"));
        state
    }

    /// **Scenario**: The flow is fetched once; a re-run in the same iteration
    /// does not re-fetch.
    #[tokio::test]
    async fn load_fetches_exactly_once_per_iteration() {
        let (ctx, platform) = test_context(vec![]);
        let state = seeded_update_state(&platform);
        let node = LoadCurrentFlowNode::new(ctx);

        let (state, _) = node.run(state).await.unwrap();
        assert!(state.fact_str(DOMAIN, "current_flow_hash").is_some());
        assert_eq!(
            state.fact_str(DOMAIN, "current_flow_hash"),
            state.fact_str(DOMAIN, "pre_patch_flow_hash")
        );

        let (_, _) = node.run(state).await.unwrap();
        assert_eq!(platform.get_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    /// **Scenario**: The summary counts nodes/edges and stays under 2,000 chars.
    #[tokio::test]
    async fn summarize_counts_and_bounds() {
        let (ctx, platform) = test_context(vec![]);
        let state = seeded_update_state(&platform);
        let (mut state, _) = LoadCurrentFlowNode::new(ctx).run(state).await.unwrap();

        // Swap in a flow with content.
        let schema = crate::knowledge::normalize_schema(
            &crate::session::nodes::test_support::seed_raw_schemas()[0],
        )
        .unwrap();
        let mut flow = FlowGraph::default();
        for i in 0..3 {
            flow.nodes.push(crate::flow::FlowNode::from_schema(
                format!("chatOpenAI_{}", i),
                &schema,
                crate::flow::Position::default(),
            ));
        }
        state.set_artifact(DOMAIN, "current_flow_data", flow.to_value());

        let (state, _) = SummarizeCurrentFlowNode::new().run(state).await.unwrap();
        let summary = state.fact_str(DOMAIN, "flow_summary").unwrap();
        assert!(summary.chars().count() < 2000);
        let parsed: Value = serde_json::from_str(summary).unwrap();
        assert_eq!(parsed["node_count"], 3);
        assert_eq!(parsed["edge_count"], 0);
        assert_eq!(parsed["node_types"]["chatOpenAI"], 3);
    }

    /// **Scenario**: Non-ASCII labels near the size threshold still bound the
    /// summary without panicking (truncation is on char boundaries).
    #[tokio::test]
    async fn summarize_bounds_non_ascii_labels() {
        let (ctx, platform) = test_context(vec![]);
        let state = seeded_update_state(&platform);
        let (mut state, _) = LoadCurrentFlowNode::new(ctx).run(state).await.unwrap();

        let mut flow = FlowGraph::default();
        for i in 0..120 {
            let schema = crate::flow::NodeSchema {
                name: format!("旅行プランナー予約ツール第{}号", i),
                version: Some(1),
                label: format!("旅行プランナー {} 番", i),
                category: "Tools".into(),
                base_classes: vec!["Tool".into()],
                input_anchors: vec![],
                input_params: vec![],
                output_anchors: vec![],
                credential: None,
                hash: String::new(),
            };
            flow.nodes.push(crate::flow::FlowNode::from_schema(
                format!("tool_{}", i),
                &schema,
                crate::flow::Position::default(),
            ));
        }
        state.set_artifact(DOMAIN, "current_flow_data", flow.to_value());

        let (state, _) = SummarizeCurrentFlowNode::new().run(state).await.unwrap();
        let summary = state.fact_str(DOMAIN, "flow_summary").unwrap();
        assert!(summary.chars().count() < 2000);
    }
}
