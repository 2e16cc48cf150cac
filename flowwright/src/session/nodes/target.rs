//! Phase B (UPDATE only): target resolution and HITL selection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use session_event::EventStatus;

use crate::error::SessionError;
use crate::graph::{Interrupt, Next, Node};
use crate::session::{node_ids, phase_of, SessionContext};
use crate::state::SessionState;

use super::DOMAIN;

/// Similarity of a chatflow name to the query, in [0, 1].
fn fuzzy_score(name: &str, query: &str) -> f64 {
    let name = name.to_lowercase();
    let query = query.to_lowercase();
    if name == query {
        return 1.0;
    }
    if name.contains(&query) || query.contains(&name) {
        return 0.8;
    }
    let name_tokens: Vec<&str> = name.split_whitespace().collect();
    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    if name_tokens.is_empty() || query_tokens.is_empty() {
        return 0.0;
    }
    let overlap = query_tokens
        .iter()
        .filter(|t| name_tokens.contains(t))
        .count();
    0.6 * overlap as f64 / name_tokens.len().max(query_tokens.len()) as f64
}

/// One bounded tool call (list chatflows); fuzzy-matches the target name and
/// keeps the top 10 candidates in artifacts.
pub struct ResolveTargetNode {
    ctx: Arc<SessionContext>,
}

impl ResolveTargetNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for ResolveTargetNode {
    fn id(&self) -> &str {
        node_ids::RESOLVE_TARGET
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let started = std::time::Instant::now();
        let result = self
            .ctx
            .registry
            .call("platform.list_chatflows", Value::Object(Default::default()))
            .await;
        crate::metrics::record_node_metrics(
            &mut state,
            node_ids::RESOLVE_TARGET,
            phase_of(node_ids::RESOLVE_TARGET),
            &crate::metrics::NodeMetrics {
                tool_call_count: 1,
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
        );
        state.push_tool_summary("platform.list_chatflows", &result.summary);
        state.record_debug(DOMAIN, "list_chatflows_raw", result.data.clone().unwrap_or(Value::Null));
        if !result.ok {
            return Err(SessionError::External {
                status: 0,
                excerpt: result.summary,
            });
        }

        let query = state
            .fact_str(DOMAIN, "target_name")
            .map(String::from)
            .unwrap_or_else(|| state.requirement.clone());
        let mut candidates: Vec<(f64, Value)> = result
            .data
            .as_ref()
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = item.get("id")?.as_str()?;
                        let name = item.get("name")?.as_str()?;
                        let score = fuzzy_score(name, &query);
                        Some((
                            score,
                            serde_json::json!({
                                "id": id,
                                "name": name,
                                "score": score,
                                "updatedAt": item.get("updatedAt").cloned().unwrap_or(Value::Null),
                            }),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        // Fuzzy score first, recency second.
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let at = |v: &Value| {
                        v.get("updatedAt")
                            .and_then(|u| u.as_str())
                            .unwrap_or("")
                            .to_string()
                    };
                    at(&b.1).cmp(&at(&a.1))
                })
        });
        let top: Vec<Value> = candidates.into_iter().take(10).map(|(_, v)| v).collect();
        state.set_fact(DOMAIN, "candidate_count", serde_json::json!(top.len()));
        state.set_artifact(DOMAIN, "target_candidates", Value::Array(top));
        Ok((state, Next::Continue))
    }
}

/// Interrupt node: resumes with either a chosen target id or `create_new`.
/// `auto_approve` accepts the top candidate (or falls back to CREATE).
pub struct HitlSelectTargetNode {
    ctx: Arc<SessionContext>,
}

impl HitlSelectTargetNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn apply_selection(state: &mut SessionState, payload: &Value) {
        if let Some(id) = payload.get("target_chatflow_id").and_then(|v| v.as_str()) {
            state.set_fact(DOMAIN, "target_chatflow_id", Value::String(id.to_string()));
            return;
        }
        // `create_new` (or a bare approval with no candidates) switches to CREATE.
        state.set_fact(DOMAIN, "intent", Value::String("create".into()));
    }

    fn top_candidate(state: &SessionState) -> Option<String> {
        state
            .artifact(DOMAIN, "target_candidates")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

#[async_trait]
impl Node<SessionState> for HitlSelectTargetNode {
    fn id(&self) -> &str {
        node_ids::HITL_SELECT_TARGET
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        if let Some(payload) = state.take_resume_payload() {
            Self::apply_selection(&mut state, &payload);
            return Ok((state, Next::Continue));
        }

        if state.auto_approve {
            let payload = match Self::top_candidate(&state) {
                Some(id) => serde_json::json!({"target_chatflow_id": id}),
                None => serde_json::json!({"create_new": true}),
            };
            Self::apply_selection(&mut state, &payload);
            self.ctx
                .emitter
                .record(
                    &state.session_id,
                    node_ids::HITL_SELECT_TARGET,
                    phase_of(node_ids::HITL_SELECT_TARGET).as_str(),
                    EventStatus::End,
                    "[auto-approved]",
                    payload,
                )
                .await;
            return Ok((state, Next::Continue));
        }

        let candidates = state
            .artifact(DOMAIN, "target_candidates")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        Err(SessionError::Interrupted(
            Interrupt::with_id(
                serde_json::json!({
                    "kind": "select_target",
                    "candidates": candidates,
                }),
                node_ids::HITL_SELECT_TARGET,
            )
            .into(),
        ))
    }
}
