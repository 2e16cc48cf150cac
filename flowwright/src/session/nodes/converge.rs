//! Phase F: preflight gate, guarded write, bounded tests, evaluation, and
//! the terminal review interrupt.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use session_event::EventStatus;

use crate::error::SessionError;
use crate::flow::{flow_hash, FlowGraph};
use crate::graph::{Interrupt, Next, Node};
use crate::knowledge::Pattern;
use crate::message::{clamp_visible, Message};
use crate::session::{node_ids, phase_of, SessionContext};
use crate::state::SessionState;
use crate::tools::Phase;

use super::{is_update, DOMAIN, PATCH};

/// Deterministic gate: ops-count, repair-count, and retry-count budgets.
/// On violation the session routes to HITL; the write never happens.
pub struct PreflightValidatePatchNode {
    ctx: Arc<SessionContext>,
}

impl PreflightValidatePatchNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for PreflightValidatePatchNode {
    fn id(&self) -> &str {
        node_ids::PREFLIGHT_VALIDATE_PATCH
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let budgets = &self.ctx.config.budgets;
        let ops_count = state.fact_u64(PATCH, "ops_count").unwrap_or(0);
        let max_ops = state
            .fact_u64(PATCH, "max_ops")
            .unwrap_or(budgets.max_ops_for(is_update(&state)) as u64);
        let repairs_used = state.fact_u64(PATCH, "repairs_used").unwrap_or(0);
        let retries_used = state.fact_u64(PATCH, "retries_used").unwrap_or(0);

        let mut violations = Vec::new();
        if ops_count > max_ops {
            violations.push(format!("{} ops exceed the {} op ceiling", ops_count, max_ops));
        }
        if repairs_used > budgets.max_schema_repairs_per_iter as u64 {
            violations.push(format!(
                "{} schema repairs exceed the {} ceiling",
                repairs_used, budgets.max_schema_repairs_per_iter
            ));
        }
        if retries_used > budgets.max_total_retries_per_iter as u64 {
            violations.push(format!(
                "{} retries exceed the {} ceiling",
                retries_used, budgets.max_total_retries_per_iter
            ));
        }

        let ok = violations.is_empty();
        state.set_fact("preflight", "ok", Value::Bool(ok));
        if !ok {
            let detail = violations.join("; ");
            state.set_fact("preflight", "violation", Value::String(detail.clone()));
            state.record_error("budget_exceeded", &detail);
            state.push_tool_summary(
                "preflight_validate_patch",
                &format!("Blocked before write: {}.", detail),
            );
        }
        Ok((state, Next::Continue))
    }
}

/// The single guarded write. UPDATE re-reads the target and compares its hash
/// to `pre_patch_flow_hash`; a mismatch aborts with a conflict and no write.
pub struct ApplyPatchNode {
    ctx: Arc<SessionContext>,
}

impl ApplyPatchNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for ApplyPatchNode {
    fn id(&self) -> &str {
        node_ids::APPLY_PATCH
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let proposed = state
            .artifact(DOMAIN, "proposed_flow_data")
            .cloned()
            .ok_or_else(|| SessionError::Internal("no proposed flow to apply".into()))?;

        if is_update(&state) {
            let target_id = state
                .fact_str(DOMAIN, "target_chatflow_id")
                .ok_or_else(|| SessionError::Internal("no target chatflow id".into()))?
                .to_string();
            let expected = state
                .fact_str(DOMAIN, "pre_patch_flow_hash")
                .unwrap_or_default()
                .to_string();

            // WriteGuard: re-read, compare, only then write.
            let remote = match self.ctx.platform.get_chatflow(&target_id).await {
                Ok(flow) => flow,
                Err(e) => {
                    let err: SessionError = e.into();
                    state.set_fact("apply", "status", Value::String("external_error".into()));
                    state.record_error(err.code(), &err.to_string());
                    return Ok((state, Next::Continue));
                }
            };
            let observed = FlowGraph::from_value(&remote.flow_data)
                .map(|f| flow_hash(&f))
                .unwrap_or_default();
            if observed != expected {
                state.set_fact("apply", "status", Value::String("conflict".into()));
                state.set_artifact(
                    "apply",
                    "conflict",
                    serde_json::json!({"expected": expected, "observed": observed}),
                );
                let err = SessionError::WriteConflict { expected, observed };
                state.record_error(err.code(), &err.to_string());
                state.push_tool_summary("apply_patch", &err.to_string());
                return Ok((state, Next::Continue));
            }

            match self
                .ctx
                .platform
                .update_chatflow(&target_id, proposed.clone())
                .await
            {
                Ok(updated) => {
                    state.set_fact("apply", "status", Value::String("applied".into()));
                    state.set_fact(
                        DOMAIN,
                        "applied_chatflow_id",
                        Value::String(updated.id.clone()),
                    );
                    // The written flow is the new baseline: a later iteration
                    // guards against drift from THIS state, not the original.
                    if let Ok(flow) = FlowGraph::from_value(&proposed) {
                        let hash = flow_hash(&flow);
                        state.set_fact(
                            DOMAIN,
                            "current_flow_hash",
                            Value::String(hash.clone()),
                        );
                        state.set_fact(DOMAIN, "pre_patch_flow_hash", Value::String(hash));
                    }
                    state.set_artifact(DOMAIN, "current_flow_data", proposed.clone());
                    state.push_tool_summary(
                        "platform.update_chatflow",
                        &format!("Chatflow '{}' (id={}).", updated.name, updated.id),
                    );
                }
                Err(e) => {
                    let err: SessionError = e.into();
                    state.set_fact("apply", "status", Value::String("external_error".into()));
                    state.record_error(err.code(), &err.to_string());
                    state.push_tool_summary("platform.update_chatflow", &err.to_string());
                }
            }
            return Ok((state, Next::Continue));
        }

        let name = state
            .fact_str(DOMAIN, "plan_goal")
            .map(String::from)
            .unwrap_or_else(|| clamp_visible(state.requirement.clone(), 80));
        match self.ctx.platform.create_chatflow(&name, proposed).await {
            Ok(created) => {
                state.set_fact("apply", "status", Value::String("applied".into()));
                state.set_fact(
                    DOMAIN,
                    "applied_chatflow_id",
                    Value::String(created.id.clone()),
                );
                state.push_tool_summary(
                    "platform.create_chatflow",
                    &format!("Chatflow '{}' (id={}).", created.name, created.id),
                );
            }
            Err(e) => {
                let err: SessionError = e.into();
                state.set_fact("apply", "status", Value::String("external_error".into()));
                state.record_error(err.code(), &err.to_string());
                state.push_tool_summary("platform.create_chatflow", &err.to_string());
            }
        }
        Ok((state, Next::Continue))
    }
}

/// Bounded testing: one happy-path and one edge-case prediction.
pub struct TestNode {
    ctx: Arc<SessionContext>,
}

impl TestNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for TestNode {
    fn id(&self) -> &str {
        node_ids::TEST
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let target_id = state
            .fact_str(DOMAIN, "applied_chatflow_id")
            .ok_or_else(|| SessionError::Internal("no applied chatflow to test".into()))?
            .to_string();
        let plan_text = state
            .artifact(DOMAIN, "plan_text")
            .and_then(|v| v.as_str())
            .unwrap_or(&state.requirement)
            .to_string();

        let questions = self.ctx.capability.generate_tests(&plan_text);
        let mut report = Vec::new();
        for question in questions.iter().take(2) {
            let entry = match self.ctx.platform.predict(&target_id, question).await {
                Ok(outcome) => serde_json::json!({
                    "question": question,
                    "status": outcome.status,
                    "body_excerpt": outcome.body_excerpt,
                }),
                Err(e) => serde_json::json!({
                    "question": question,
                    "status": 0,
                    "body_excerpt": e.to_string(),
                }),
            };
            report.push(entry);
        }
        let statuses: Vec<u64> = report
            .iter()
            .filter_map(|r| r.get("status").and_then(|s| s.as_u64()))
            .collect();
        crate::metrics::record_node_metrics(
            &mut state,
            node_ids::TEST,
            phase_of(node_ids::TEST),
            &crate::metrics::NodeMetrics {
                tool_call_count: report.len() as u32,
                ..Default::default()
            },
        );
        state.push_tool_summary(
            "platform.predict",
            &format!(
                "Ran {} test prediction(s); statuses: {:?}.",
                report.len(),
                statuses
            ),
        );
        state.set_fact("test", "statuses", serde_json::json!(statuses));
        state.set_artifact(DOMAIN, "test_report", Value::Array(report));
        Ok((state, Next::Continue))
    }
}

/// Deterministic evaluation: diff + verdict. `iterate` bumps the iteration;
/// the absolute ceiling forces review with `done-with-failure`.
pub struct EvaluateNode {
    ctx: Arc<SessionContext>,
}

impl EvaluateNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    async fn auto_save_pattern(&self, state: &SessionState) {
        if !self.ctx.config.pattern_auto_save || is_update(state) {
            return;
        }
        let Some(patterns) = &self.ctx.patterns else {
            return;
        };
        let Some(proposed) = state.artifact(DOMAIN, "proposed_flow_data") else {
            return;
        };
        let Ok(flow) = FlowGraph::from_value(proposed) else {
            return;
        };
        let mut node_types: Vec<String> =
            flow.nodes.iter().map(|n| n.data.name.clone()).collect();
        node_types.sort();
        node_types.dedup();
        let pattern = Pattern {
            id: uuid::Uuid::new_v4().to_string(),
            name: state
                .fact_str(DOMAIN, "plan_goal")
                .unwrap_or("unnamed flow")
                .to_string(),
            domain: "chatflow".into(),
            category: state
                .fact_str(PATCH, "focus_area")
                .unwrap_or("general")
                .to_string(),
            node_types,
            schema_fingerprint: self.ctx.schemas.fingerprint(),
            success_count: 1,
            last_used_at: Some(chrono::Utc::now().to_rfc3339()),
            flow_data: proposed.clone(),
        };
        if let Err(e) = patterns.save(&pattern).await {
            tracing::warn!(error = %e, "pattern auto-save failed");
        }
        if let Some(seeded) = state.fact_str(DOMAIN, "pattern_id") {
            let _ = patterns.record_success(seeded).await;
        }
    }
}

#[async_trait]
impl Node<SessionState> for EvaluateNode {
    fn id(&self) -> &str {
        node_ids::EVALUATE
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let apply_status = state
            .fact_str("apply", "status")
            .unwrap_or("applied")
            .to_string();

        let mut verdict = if apply_status == "applied" {
            let report = state
                .artifact(DOMAIN, "test_report")
                .cloned()
                .unwrap_or(Value::Array(vec![]));
            self.ctx
                .capability
                .evaluate(&report)
                .get("verdict")
                .and_then(|v| v.as_str())
                .unwrap_or("iterate")
                .to_string()
        } else {
            // External apply failures are plausibly transient.
            "iterate".to_string()
        };

        if verdict == "iterate" {
            state.next_iteration();
            if state.iteration >= self.ctx.config.iteration_ceiling {
                verdict = "done-with-failure".to_string();
            }
        }
        state.set_fact("evaluate", "verdict", Value::String(verdict.clone()));

        let diff = state
            .fact_str(DOMAIN, "diff")
            .unwrap_or("no diff")
            .to_string();
        state.push_message(Message::assistant(format!(
            "Evaluation: {} ({}).",
            verdict, diff
        )));

        // Phase budgets are soft: evaluated at iteration end, violations counted.
        let budgets = self.ctx.config.phase_budgets.clone();
        for phase in Phase::ALL {
            budgets.check_phase(&mut state, phase);
        }

        if verdict == "done" {
            self.auto_save_pattern(&state).await;
        }
        Ok((state, Next::Continue))
    }
}

/// Terminal interrupt surfacing the diff and verdict.
pub struct HitlReviewNode {
    ctx: Arc<SessionContext>,
}

impl HitlReviewNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn review_payload(state: &SessionState) -> Value {
        serde_json::json!({
            "kind": "review",
            "verdict": state.fact_str("evaluate", "verdict"),
            "diff": state.fact_str(DOMAIN, "diff"),
            "applied_chatflow_id": state.fact_str(DOMAIN, "applied_chatflow_id"),
            "errors": state.fact("session", "errors").cloned().unwrap_or(Value::Array(vec![])),
        })
    }
}

#[async_trait]
impl Node<SessionState> for HitlReviewNode {
    fn id(&self) -> &str {
        node_ids::HITL_REVIEW
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        if state.take_resume_payload().is_some() {
            state.mark_done();
            return Ok((state, Next::End));
        }
        if state.auto_approve {
            self.ctx
                .emitter
                .record(
                    &state.session_id,
                    node_ids::HITL_REVIEW,
                    phase_of(node_ids::HITL_REVIEW).as_str(),
                    EventStatus::End,
                    "[auto-approved]",
                    Self::review_payload(&state),
                )
                .await;
            state.mark_done();
            return Ok((state, Next::End));
        }
        Err(SessionError::Interrupted(
            Interrupt::with_id(Self::review_payload(&state), node_ids::HITL_REVIEW).into(),
        ))
    }
}
