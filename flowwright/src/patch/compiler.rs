//! Deterministic lowering of a Patch IR op list into a flow payload.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::flow::{FlowEdge, FlowGraph, FlowNode, Handle, Position};
use crate::knowledge::{CredentialStore, NodeSchemaStore};

use super::diff::{compute_diff, DiffSummary};
use super::ir::PatchOp;
use super::validate::validate_flow_data;

/// Failure class of one compile/validate error; drives downstream routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchErrorCode {
    /// Unknown node type or anchor shape mismatch; repairable.
    SchemaMismatch,
    /// Bad references, typing, or invariants in the IR itself.
    Structural,
    Other,
}

impl PatchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchErrorCode::SchemaMismatch => "schema_mismatch",
            PatchErrorCode::Structural => "structural",
            PatchErrorCode::Other => "other",
        }
    }
}

/// One compile or validation error: `{op_index, code, detail}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchErrorEntry {
    pub op_index: Option<usize>,
    pub code: PatchErrorCode,
    pub detail: String,
    /// Anchor path (`node.anchor`) when the error is anchored.
    pub anchor: Option<String>,
}

impl PatchErrorEntry {
    pub fn structural(
        op_index: Option<usize>,
        detail: impl Into<String>,
        anchor: Option<String>,
    ) -> Self {
        Self {
            op_index,
            code: PatchErrorCode::Structural,
            detail: detail.into(),
            anchor,
        }
    }

    pub fn schema_mismatch(op_index: Option<usize>, detail: impl Into<String>) -> Self {
        Self {
            op_index,
            code: PatchErrorCode::SchemaMismatch,
            detail: detail.into(),
            anchor: None,
        }
    }
}

/// Result of one compile: either a proposed flow + diff, or errors.
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    /// Unset whenever `errors` is non-empty.
    pub proposed_flow_data: Option<FlowGraph>,
    pub diff_summary: DiffSummary,
    pub errors: Vec<PatchErrorEntry>,
    /// Node types that failed schema lookup; feeds the repair node.
    pub missing_node_types: Vec<String>,
}

impl CompileOutcome {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Dominant failure class: schema_mismatch wins over structural over other.
    pub fn failure_class(&self) -> Option<PatchErrorCode> {
        if self.errors.is_empty() {
            return None;
        }
        if self
            .errors
            .iter()
            .any(|e| e.code == PatchErrorCode::SchemaMismatch)
        {
            return Some(PatchErrorCode::SchemaMismatch);
        }
        if self
            .errors
            .iter()
            .any(|e| e.code == PatchErrorCode::Structural)
        {
            return Some(PatchErrorCode::Structural);
        }
        Some(PatchErrorCode::Other)
    }
}

/// Lowers IR ops onto a base flow. Schema lookups are local-only: an unknown
/// node type is a `schema_mismatch`, and the repair node (not the compiler)
/// performs the budget-gated API fetch.
pub struct PatchCompiler {
    schemas: Arc<NodeSchemaStore>,
    credentials: Arc<CredentialStore>,
}

impl PatchCompiler {
    pub fn new(schemas: Arc<NodeSchemaStore>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            schemas,
            credentials,
        }
    }

    /// Compiles `ops` over `base`. Deterministic: ops apply in order, no
    /// network, and the same inputs always yield the same flow.
    pub fn compile(&self, base: Option<&FlowGraph>, ops: &[PatchOp]) -> CompileOutcome {
        let mut graph = base.cloned().unwrap_or_default();
        let mut outcome = CompileOutcome::default();

        for (index, op) in ops.iter().enumerate() {
            match op {
                PatchOp::AddNode {
                    node_id,
                    node_type,
                    position,
                    params,
                } => {
                    if graph.node(node_id).is_some() {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("duplicate node id {}", node_id),
                            None,
                        ));
                        continue;
                    }
                    let Some(schema) = self.schemas.get(node_type) else {
                        outcome.missing_node_types.push(node_type.clone());
                        outcome.errors.push(PatchErrorEntry::schema_mismatch(
                            Some(index),
                            format!("unknown node type {}", node_type),
                        ));
                        continue;
                    };
                    let position = position.unwrap_or(Position {
                        x: 160.0 + 280.0 * graph.nodes.len() as f64,
                        y: 140.0,
                    });
                    let mut node = FlowNode::from_schema(node_id.clone(), &schema, position);
                    for (param, value) in params {
                        node.data.inputs.insert(param.clone(), value.clone());
                    }
                    graph.nodes.push(node);
                }

                PatchOp::SetParam {
                    node_id,
                    param_name,
                    value,
                } => {
                    let Some(node) = graph.node_mut(node_id) else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("set_param references missing node {}", node_id),
                            None,
                        ));
                        continue;
                    };
                    let Some(param) = node
                        .data
                        .input_params
                        .iter()
                        .find(|p| p.name == *param_name)
                    else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("unknown param {} on {}", param_name, node_id),
                            None,
                        ));
                        continue;
                    };
                    let type_ok = match param.kind.as_str() {
                        "string" | "password" | "code" => value.is_string(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        _ => true,
                    };
                    if !type_ok {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!(
                                "param {}.{} expects {}, got {}",
                                node_id,
                                param_name,
                                param.kind,
                                value_kind(value)
                            ),
                            None,
                        ));
                        continue;
                    }
                    node.data.inputs.insert(param_name.clone(), value.clone());
                }

                PatchOp::BindCredential {
                    node_id,
                    credential_id,
                    credential_type,
                } => {
                    let Some(node) = graph.node(node_id) else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("bind_credential references missing node {}", node_id),
                            None,
                        ));
                        continue;
                    };
                    let declared = self
                        .schemas
                        .get(&node.data.name)
                        .and_then(|s| s.credential);
                    let Some(declared) = declared else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("node {} declares no credential", node_id),
                            None,
                        ));
                        continue;
                    };
                    if !declared.accepted_types.iter().any(|t| t == credential_type) {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!(
                                "node {} accepts credential types [{}], got {}",
                                node_id,
                                declared.accepted_types.join("|"),
                                credential_type
                            ),
                            None,
                        ));
                        continue;
                    }
                    if let Some(node) = graph.node_mut(node_id) {
                        node.bind_credential(credential_id);
                    }
                }

                PatchOp::Connect {
                    source_id,
                    source_anchor,
                    target_id,
                    target_anchor,
                } => {
                    let Some(source) = graph.node(source_id) else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("connect references missing source {}", source_id),
                            None,
                        ));
                        continue;
                    };
                    let Some(target) = graph.node(target_id) else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("connect references missing target {}", target_id),
                            None,
                        ));
                        continue;
                    };

                    let source_is_options = source
                        .data
                        .output_anchors
                        .iter()
                        .any(|a| a.is_options());
                    let source_anchor_def = source
                        .data
                        .output_anchors
                        .iter()
                        .flat_map(|a| {
                            if a.is_options() {
                                a.options.clone()
                            } else {
                                vec![a.clone()]
                            }
                        })
                        .find(|a| a.name == *source_anchor);
                    let Some(source_anchor_def) = source_anchor_def else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("source anchor {} not on {}", source_anchor, source_id),
                            Some(format!("{}.{}", source_id, source_anchor)),
                        ));
                        continue;
                    };
                    let target_anchor_def = target
                        .data
                        .input_anchors
                        .iter()
                        .find(|a| a.name == *target_anchor)
                        .cloned();
                    let Some(target_anchor_def) = target_anchor_def else {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!("input anchor {} not on {}", target_anchor, target_id),
                            Some(format!("{}.{}", target_id, target_anchor)),
                        ));
                        continue;
                    };

                    let compatible = source_anchor_def
                        .types
                        .iter()
                        .any(|t| target_anchor_def.accepted_types.contains(t));
                    if !compatible {
                        outcome.errors.push(PatchErrorEntry::structural(
                            Some(index),
                            format!(
                                "cannot connect {}.{} [{}] to {}.{} [{}]",
                                source_id,
                                source_anchor,
                                source_anchor_def.types.join("|"),
                                target_id,
                                target_anchor,
                                target_anchor_def.accepted_types.join("|")
                            ),
                            Some(format!("{}.{}", target_id, target_anchor)),
                        ));
                        continue;
                    }

                    let source_handle = Handle::output(
                        source_id.clone(),
                        source_anchor.clone(),
                        source_anchor_def.types.clone(),
                    );
                    let target_handle = Handle::input(
                        target_id.clone(),
                        target_anchor.clone(),
                        target_anchor_def.accepted_types.clone(),
                    );
                    graph.edges.push(FlowEdge {
                        source: source_id.clone(),
                        source_handle: source_handle.encode(),
                        target: target_id.clone(),
                        target_handle: target_handle.encode(),
                    });

                    if source_is_options {
                        if let Some(node) = graph.node_mut(source_id) {
                            node.data.outputs.insert(
                                "output".into(),
                                serde_json::Value::String(source_anchor.clone()),
                            );
                        }
                    }
                    if let Some(node) = graph.node_mut(target_id) {
                        node.data.inputs.insert(
                            target_anchor.clone(),
                            serde_json::Value::String(format!(
                                "{{{{{}.data.instance}}}}",
                                source_id
                            )),
                        );
                    }
                }
            }
        }

        if !outcome.errors.is_empty() {
            return outcome;
        }

        let validation = validate_flow_data(&graph, &self.credentials);
        if !validation.is_empty() {
            outcome.errors = validation;
            return outcome;
        }

        outcome.diff_summary = compute_diff(base, &graph);
        outcome.proposed_flow_data = Some(graph);
        outcome
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
