//! Phase D (second half): IR generation and deterministic lowering.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;
use crate::flow::FlowGraph;
use crate::graph::{Next, Node};
use crate::llm::extract_json;
use crate::message::{clamp_visible, Message};
use crate::patch::PatchOp;
use crate::session::prompts::COMPILE_PATCH_IR_SYSTEM;
use crate::session::{node_ids, SessionContext};
use crate::state::SessionState;

use super::{complete_and_record, is_update, DOMAIN, PATCH};

/// Renders targeted anchor excerpts for the node types the plan mentions.
fn anchor_excerpts(ctx: &SessionContext, state: &SessionState) -> String {
    let mut types: Vec<String> = state
        .artifact(DOMAIN, "plan_contract")
        .and_then(|c| c.get("node_types"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    if let Some(summary) = state.fact_str(DOMAIN, "flow_summary") {
        if let Ok(parsed) = serde_json::from_str::<Value>(summary) {
            if let Some(histogram) = parsed.get("node_types").and_then(|v| v.as_object()) {
                types.extend(histogram.keys().cloned());
            }
        }
    }
    types.sort();
    types.dedup();

    let mut excerpts = Vec::new();
    for node_type in types.iter().take(12) {
        let Some(schema) = ctx.schemas.get(node_type) else {
            continue;
        };
        let inputs: Vec<String> = schema
            .input_anchors
            .iter()
            .map(|a| {
                format!(
                    "{}:{}{}",
                    a.name,
                    a.accepted_types.join("|"),
                    if a.optional { "?" } else { "" }
                )
            })
            .collect();
        let outputs: Vec<String> = schema
            .flattened_output_anchors()
            .iter()
            .map(|a| format!("{}:{}", a.name, a.types.join("|")))
            .collect();
        let params: Vec<String> = schema
            .input_params
            .iter()
            .map(|p| format!("{}:{}", p.name, p.kind))
            .collect();
        let credential = schema
            .credential
            .as_ref()
            .map(|c| format!(" credential[{}]", c.accepted_types.join("|")))
            .unwrap_or_default();
        excerpts.push(format!(
            "{} — in[{}] out[{}] params[{}]{}",
            schema.name,
            inputs.join(", "),
            outputs.join(", "),
            params.join(", "),
            credential
        ));
    }
    excerpts.join("\n")
}

/// LLM call whose sole output is the JSON Patch IR op list.
pub struct CompilePatchIrNode {
    ctx: Arc<SessionContext>,
}

impl CompilePatchIrNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<SessionState> for CompilePatchIrNode {
    fn id(&self) -> &str {
        node_ids::COMPILE_PATCH_IR
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        state.set_fact(PATCH, "ir_error", Value::Null);

        let plan_text = state
            .artifact(DOMAIN, "plan_text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let mut context = format!("Plan:\n{}", clamp_visible(plan_text, 3000));
        if let Some(max_ops) = state.fact_u64(PATCH, "max_ops") {
            context.push_str(&format!("\nAt most {} ops.", max_ops));
        }
        if let Some(focus) = state.fact_str(PATCH, "focus_area") {
            context.push_str(&format!(" Focus: {}.", focus));
        }
        let excerpts = anchor_excerpts(&self.ctx, &state);
        if !excerpts.is_empty() {
            context.push_str("\nSchema excerpts:\n");
            context.push_str(&excerpts);
        }
        if let Some(creds) = state
            .artifact(DOMAIN, "plan_contract")
            .and_then(|c| c.get("credential_types"))
            .and_then(|v| v.as_array())
        {
            if !creds.is_empty() {
                let available: Vec<String> = creds
                    .iter()
                    .filter_map(|v| v.as_str())
                    .flat_map(|kind| {
                        self.ctx
                            .credentials
                            .get_by_type(kind)
                            .into_iter()
                            .map(move |c| format!("{} ({}: {})", c.id, kind, c.name))
                    })
                    .collect();
                if !available.is_empty() {
                    context.push_str("\nCredentials: ");
                    context.push_str(&available.join(", "));
                }
            }
        }

        let messages = [
            Message::system(COMPILE_PATCH_IR_SYSTEM),
            Message::user(context),
        ];
        let reply = complete_and_record(
            &self.ctx.llm,
            &mut state,
            node_ids::COMPILE_PATCH_IR,
            &messages,
            None,
        )
        .await?;

        let ops = extract_json(&reply.text)
            .ok_or(())
            .and_then(|v| self.ctx.capability.compile_ops(&v).map_err(|_| ()));
        match ops {
            Ok(ops) => {
                state.set_fact(PATCH, "ops_count", serde_json::json!(ops.len()));
                state.set_artifact(
                    PATCH,
                    "ops",
                    serde_json::to_value(&ops).unwrap_or(Value::Array(vec![])),
                );
                state.push_message(Message::assistant(format!(
                    "Compiled patch IR with {} op(s).",
                    ops.len()
                )));
            }
            Err(()) => {
                state.set_fact(
                    PATCH,
                    "ir_error",
                    Value::String("model output is not a valid op list".into()),
                );
                state.set_fact(PATCH, "ops_count", serde_json::json!(0));
                state.set_artifact(PATCH, "ops", Value::Array(vec![]));
            }
        }
        Ok((state, Next::Continue))
    }
}

/// Deterministic lowering of the op list over the base flow.
pub struct CompileFlowDataNode {
    ctx: Arc<SessionContext>,
}

impl CompileFlowDataNode {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn base_flow(state: &SessionState) -> Option<FlowGraph> {
        let value = if is_update(state) {
            state.artifact(DOMAIN, "current_flow_data")
        } else {
            state.artifact(DOMAIN, "base_flow")
        }?;
        FlowGraph::from_value(value).ok()
    }
}

#[async_trait]
impl Node<SessionState> for CompileFlowDataNode {
    fn id(&self) -> &str {
        node_ids::COMPILE_FLOW_DATA
    }

    async fn run(&self, mut state: SessionState) -> Result<(SessionState, Next), SessionError> {
        if let Some(ir_error) = state
            .fact_str(PATCH, "ir_error")
            .filter(|s| !s.is_empty())
            .map(String::from)
        {
            state.set_artifact(
                PATCH,
                "compile_errors",
                serde_json::json!([{
                    "op_index": null, "code": "other", "detail": ir_error, "anchor": null
                }]),
            );
            return Ok((state, Next::Continue));
        }

        let ops: Vec<PatchOp> = state
            .artifact(PATCH, "ops")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let base = Self::base_flow(&state);
        let outcome = self.ctx.compiler.compile(base.as_ref(), &ops);

        if outcome.ok() {
            let flow = outcome.proposed_flow_data.as_ref().expect("ok outcome");
            state.set_artifact(DOMAIN, "proposed_flow_data", flow.to_value());
            state.set_artifact(
                DOMAIN,
                "diff_summary",
                serde_json::to_value(&outcome.diff_summary).unwrap_or(Value::Null),
            );
            state.set_fact(
                DOMAIN,
                "diff",
                Value::String(outcome.diff_summary.render()),
            );
            state.set_artifact(PATCH, "compile_errors", Value::Array(vec![]));
        } else {
            state.set_artifact(
                PATCH,
                "compile_errors",
                serde_json::to_value(&outcome.errors).unwrap_or(Value::Array(vec![])),
            );
            state.set_fact(
                PATCH,
                "missing_node_types",
                serde_json::to_value(&outcome.missing_node_types).unwrap_or(Value::Array(vec![])),
            );
        }
        Ok((state, Next::Continue))
    }
}
