//! Phase E: deterministic validation and bounded schema repair.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::wrap;
use crate::error::SessionError;
use crate::graph::{Next, Node};
use crate::session::{node_ids, phase_of, SessionContext};
use crate::state::SessionState;

use super::{PATCH, VALIDATION};

/// Deterministic: folds compile errors (or a fresh structural validation of
/// the proposed flow) into `facts.validation`.
pub struct ValidateNode {
    ctx: Arc<SessionContext>,
}

impl ValidateNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn classify(errors: &[Value]) -> &'static str {
        fn code_of(e: &Value) -> &str {
            e.get("code").and_then(|c| c.as_str()).unwrap_or("other")
        }
        if errors.iter().any(|e| code_of(e) == "schema_mismatch") {
            "schema_mismatch"
        } else if errors.iter().any(|e| code_of(e) == "structural") {
            "structural"
        } else {
            "other"
        }
    }
}

#[async_trait]
impl Node<SessionState> for ValidateNode {
    fn id(&self) -> &str {
        node_ids::VALIDATE
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let compile_errors: Vec<Value> = state
            .artifact(PATCH, "compile_errors")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let report = if compile_errors.is_empty() {
            self.ctx.capability.validate(&state.artifacts)?
        } else {
            serde_json::json!({"valid": false, "errors": compile_errors})
        };

        let ok = report.get("valid").and_then(|v| v.as_bool()).unwrap_or(false);
        let wrapped = wrap("validate_flow", Ok(report.clone()));
        state.push_tool_summary("validate_flow", &wrapped.summary);
        state.set_artifact(VALIDATION, "report", report.clone());

        state.set_fact(VALIDATION, "ok", Value::Bool(ok));
        if ok {
            state.set_fact(VALIDATION, "failure_type", Value::Null);
        } else {
            let errors: Vec<Value> = report
                .get("errors")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let failure_type = Self::classify(&errors);
            state.set_fact(
                VALIDATION,
                "failure_type",
                Value::String(failure_type.to_string()),
            );
            let missing = state
                .fact(PATCH, "missing_node_types")
                .cloned()
                .unwrap_or(Value::Array(vec![]));
            state.set_fact(VALIDATION, "missing_node_types", missing);
        }
        Ok((state, Next::Continue))
    }
}

/// Deterministic local repair for `schema_mismatch` failures only: fetches
/// the missing node types (budget-gated) so the compile retry can succeed.
pub struct RepairSchemaNode {
    ctx: Arc<SessionContext>,
}

impl RepairSchemaNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for RepairSchemaNode {
    fn id(&self) -> &str {
        node_ids::REPAIR_SCHEMA
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        let missing: Vec<String> = state
            .fact(VALIDATION, "missing_node_types")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let max_repairs = self.ctx.config.budgets.max_schema_repairs_per_iter as u64;
        let mut repairs_used = state.fact_u64(PATCH, "repairs_used").unwrap_or(0);
        let mut fetch_budget = state.fact_u64(PATCH, "fetch_budget").unwrap_or(0) as u32;

        let mut repaired = Vec::new();
        let mut failed = Vec::new();
        for node_type in &missing {
            if repairs_used >= max_repairs {
                failed.push(node_type.clone());
                continue;
            }
            match self
                .ctx
                .schemas
                .get_or_repair(node_type, &mut fetch_budget)
                .await
            {
                Ok(_) => {
                    repairs_used += 1;
                    repaired.push(node_type.clone());
                }
                Err(e) => {
                    tracing::warn!(node_type = %node_type, error = %e, "schema repair failed");
                    failed.push(node_type.clone());
                }
            }
        }

        let all_repaired = failed.is_empty() && !repaired.is_empty();
        crate::metrics::record_node_metrics(
            &mut state,
            node_ids::REPAIR_SCHEMA,
            phase_of(node_ids::REPAIR_SCHEMA),
            &crate::metrics::NodeMetrics {
                repair_events: repaired.len() as u32,
                ..Default::default()
            },
        );
        state.set_fact(PATCH, "repairs_used", serde_json::json!(repairs_used));
        state.set_fact(PATCH, "fetch_budget", serde_json::json!(fetch_budget));
        state.set_fact(PATCH, "repaired", Value::Bool(all_repaired));
        state.set_fact(
            PATCH,
            "repaired_types",
            serde_json::to_value(&repaired).unwrap_or(Value::Array(vec![])),
        );
        if all_repaired {
            let retries = state.fact_u64(PATCH, "retries_used").unwrap_or(0);
            let compile_retries = state.fact_u64(PATCH, "compile_retries").unwrap_or(0);
            state.set_fact(PATCH, "retries_used", serde_json::json!(retries + 1));
            state.set_fact(
                PATCH,
                "compile_retries",
                serde_json::json!(compile_retries + 1),
            );
            state.push_tool_summary(
                "repair_schema",
                &format!("Repaired {} schema(s): {}.", repaired.len(), repaired.join(", ")),
            );
        } else {
            state.record_error(
                "schema_mismatch",
                &format!("unrepairable node types: {}", failed.join(", ")),
            );
        }
        Ok((state, Next::Continue))
    }
}
