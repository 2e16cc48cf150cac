//! Phase D (first half): plan, plan approval, and patch scope.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use session_event::EventStatus;

use crate::error::SessionError;
use crate::graph::{Interrupt, Next, Node};
use crate::knowledge::{DriftPolicy, PatternFilter};
use crate::llm::extract_json;
use crate::message::{clamp_visible, Message};
use crate::session::prompts::{DEFINE_PATCH_SCOPE_SYSTEM, PLAN_SYSTEM};
use crate::session::{node_ids, phase_of, SessionContext};
use crate::state::SessionState;
use crate::tools::Phase;

use super::{complete_and_record, is_update, DOMAIN, PATCH};

/// Removes balanced JSON objects/arrays over 100 chars from model prose so
/// the transcript never carries a structured blob.
fn strip_json_blocks(text: &str) -> String {
    let mut out = String::new();
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = balanced_end(bytes, i) {
                let region = &text[i..=end];
                if region.len() > 100 && serde_json::from_str::<Value>(region).is_ok() {
                    i = end + 1;
                    continue;
                }
            }
        }
        // Advance by whole UTF-8 characters.
        let ch_len = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out.trim().to_string()
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Renders the stored flow summary as plain text for prompts.
fn flow_summary_text(state: &SessionState) -> Option<String> {
    let raw = state.fact_str(DOMAIN, "flow_summary")?;
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let types = parsed
        .get("node_types")
        .and_then(|v| v.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| format!("{}×{}", k, v.as_u64().unwrap_or(0)))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    Some(format!(
        "Current flow: {} node(s), {} edge(s). Types: {}.",
        parsed.get("node_count").and_then(|v| v.as_u64()).unwrap_or(0),
        parsed.get("edge_count").and_then(|v| v.as_u64()).unwrap_or(0),
        types
    ))
}

/// LLM call producing the plan contract. CREATE mode may seed a base graph
/// from a schema-compatible pattern; UPDATE never seeds.
pub struct PlanNode {
    ctx: Arc<SessionContext>,
}

impl PlanNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn handle_drift(&self, state: &mut SessionState) -> Result<(), SessionError> {
        let current = self.ctx.schemas.fingerprint();
        let recorded = state.fact_str("knowledge", "schema_fingerprint").map(String::from);
        let Some(recorded) = recorded else {
            state.set_fact("knowledge", "schema_fingerprint", Value::String(current));
            return Ok(());
        };
        if recorded == current {
            return Ok(());
        }
        match self.ctx.config.drift_policy {
            DriftPolicy::Warn => {
                tracing::warn!(session_id = %state.session_id, "schema fingerprint drift");
                state.set_fact("knowledge", "drift_detected", Value::Bool(true));
            }
            DriftPolicy::Fail => {
                return Err(SessionError::Validation(
                    "schema fingerprint drift between iterations".into(),
                ));
            }
            DriftPolicy::Refresh => {
                let updated = self.ctx.schemas.refresh_all().await?;
                state.set_fact("knowledge", "drift_refreshed", serde_json::json!(updated));
            }
        }
        state.set_fact(
            "knowledge",
            "schema_fingerprint",
            Value::String(self.ctx.schemas.fingerprint()),
        );
        Ok(())
    }

    async fn seed_pattern(&self, state: &mut SessionState) -> Result<(), SessionError> {
        // Patterns seed CREATE sessions only, and only before the first plan.
        if is_update(state)
            || state.iteration > 0
            || state.artifact(DOMAIN, "base_flow").is_some()
        {
            return Ok(());
        }
        let Some(patterns) = &self.ctx.patterns else {
            return Ok(());
        };
        let fingerprint = self.ctx.schemas.fingerprint();
        let hits = patterns
            .search(&PatternFilter {
                domain: Some("chatflow".into()),
                category: None,
                node_types: vec![],
            })
            .await?;
        if let Some(pattern) = hits.iter().find(|p| p.is_compatible_with(&fingerprint)) {
            let base = patterns
                .apply_as_base_graph(&pattern.id, &fingerprint)
                .await?;
            state.set_fact(DOMAIN, "pattern_id", Value::String(pattern.id.clone()));
            state.set_artifact(DOMAIN, "base_flow", base.to_value());
            state.push_message(Message::assistant(format!(
                "Seeding from pattern '{}'.",
                pattern.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Node<SessionState> for PlanNode {
    fn id(&self) -> &str {
        node_ids::PLAN
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        state.set_fact("plan", "revision_requested", Value::Bool(false));
        self.handle_drift(&mut state).await?;
        self.seed_pattern(&mut state).await?;

        let mut context = format!(
            "Requirement: {}\nIntent: {}.",
            state.requirement,
            state.fact_str(DOMAIN, "intent").unwrap_or("create"),
        );
        if let Some(summary) = flow_summary_text(&state) {
            context.push('\n');
            context.push_str(&summary);
        }
        let tool_context = self.ctx.registry.context(Phase::Plan);
        if !tool_context.is_empty() {
            context.push_str("\nAvailable tools:\n");
            context.push_str(&tool_context);
        }

        let messages = [Message::system(PLAN_SYSTEM), Message::user(context)];
        let reply =
            complete_and_record(&self.ctx.llm, &mut state, node_ids::PLAN, &messages, None)
                .await?;

        let contract = extract_json(&reply.text).unwrap_or(Value::Null);
        if let Some(goal) = contract.get("goal").and_then(|v| v.as_str()) {
            state.set_fact(DOMAIN, "plan_goal", Value::String(goal.to_string()));
        } else {
            state.set_fact(
                DOMAIN,
                "plan_goal",
                Value::String(clamp_visible(state.requirement.clone(), 120)),
            );
        }
        state.set_artifact(DOMAIN, "plan_contract", contract);
        state.set_artifact(DOMAIN, "plan_text", Value::String(reply.text.clone()));

        let prose = strip_json_blocks(&reply.text);
        if !prose.is_empty() {
            state.push_message(Message::assistant(prose));
        }
        Ok((state, Next::Continue))
    }
}

/// Interrupt for plan approval or revision.
pub struct HitlPlanNode {
    ctx: Arc<SessionContext>,
}

impl HitlPlanNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for HitlPlanNode {
    fn id(&self) -> &str {
        node_ids::HITL_PLAN
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        if let Some(payload) = state.take_resume_payload() {
            if let Some(revision) = payload.get("revision").and_then(|v| v.as_str()) {
                state.push_message(Message::user(format!("Plan revision: {}", revision)));
                state.set_fact("plan", "revision_requested", Value::Bool(true));
            }
            return Ok((state, Next::Continue));
        }

        if state.auto_approve {
            self.ctx
                .emitter
                .record(
                    &state.session_id,
                    node_ids::HITL_PLAN,
                    phase_of(node_ids::HITL_PLAN).as_str(),
                    EventStatus::End,
                    "[auto-approved]",
                    serde_json::json!({"approved": true}),
                )
                .await;
            return Ok((state, Next::Continue));
        }

        let plan_text = state
            .artifact(DOMAIN, "plan_text")
            .and_then(|v| v.as_str())
            .map(|s| clamp_visible(s.to_string(), 2000))
            .unwrap_or_default();
        Err(SessionError::Interrupted(
            Interrupt::with_id(
                serde_json::json!({
                    "kind": "plan_approval",
                    "goal": state.fact_str(DOMAIN, "plan_goal"),
                    "plan": plan_text,
                    "ref": "chatflow.plan_text",
                }),
                node_ids::HITL_PLAN,
            )
            .into(),
        ))
    }
}

/// LLM-lite: bounds the patch (op ceiling, focus area, protected nodes) and
/// resets the per-iteration patch counters.
pub struct DefinePatchScopeNode {
    ctx: Arc<SessionContext>,
}

impl DefinePatchScopeNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for DefinePatchScopeNode {
    fn id(&self) -> &str {
        node_ids::DEFINE_PATCH_SCOPE
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let default_max = self
            .ctx
            .config
            .budgets
            .max_ops_for(is_update(&state)) as u64;

        let plan_text = state
            .artifact(DOMAIN, "plan_text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let messages = [
            Message::system(DEFINE_PATCH_SCOPE_SYSTEM),
            Message::user(format!(
                "Plan:\n{}\nDefault max_ops is {}.",
                clamp_visible(plan_text, 3000),
                default_max
            )),
        ];
        // Scope is advisory; an engine failure falls back to the defaults.
        let parsed = match complete_and_record(
            &self.ctx.llm,
            &mut state,
            node_ids::DEFINE_PATCH_SCOPE,
            &messages,
            None,
        )
        .await
        {
            Ok(reply) => extract_json(&reply.text).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };

        let max_ops = parsed
            .get("max_ops")
            .and_then(|v| v.as_u64())
            .map(|v| v.min(default_max))
            .unwrap_or(default_max);
        let focus_area = parsed
            .get("focus_area")
            .and_then(|v| v.as_str())
            .unwrap_or("entire flow")
            .to_string();
        let protected_nodes = parsed
            .get("protected_nodes")
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        state.set_fact(PATCH, "max_ops", serde_json::json!(max_ops));
        state.set_fact(PATCH, "focus_area", Value::String(focus_area));
        state.set_fact(PATCH, "protected_nodes", protected_nodes);
        state.set_fact(
            PATCH,
            "max_repairs",
            serde_json::json!(self.ctx.config.budgets.max_schema_repairs_per_iter),
        );
        // Per-iteration counters reset at the top of the patch phase.
        state.set_fact(PATCH, "repairs_used", serde_json::json!(0));
        state.set_fact(PATCH, "retries_used", serde_json::json!(0));
        state.set_fact(PATCH, "compile_retries", serde_json::json!(0));
        state.set_fact(
            PATCH,
            "fetch_budget",
            serde_json::json!(self.ctx.config.budgets.schema_fetch_budget),
        );
        Ok((state, Next::Continue))
    }
}
