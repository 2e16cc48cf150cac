//! Patch IR operations.
//!
//! The LLM's sole structured output in the patch phase is a JSON list of
//! these ops; everything else is deterministic lowering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::Position;

/// One graph edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Instantiate a node of `node_type` as `node_id`.
    AddNode {
        node_id: String,
        node_type: String,
        #[serde(default)]
        position: Option<Position>,
        /// Initial parameter values merged over schema defaults.
        #[serde(default)]
        params: Map<String, Value>,
    },
    /// Set one parameter on an existing node.
    SetParam {
        node_id: String,
        param_name: String,
        value: Value,
    },
    /// Wire `source_id.source_anchor` into `target_id.target_anchor`.
    Connect {
        source_id: String,
        source_anchor: String,
        target_id: String,
        target_anchor: String,
    },
    /// Bind a credential to a node (written at both credential levels).
    BindCredential {
        node_id: String,
        credential_id: String,
        credential_type: String,
    },
}

impl PatchOp {
    /// The node this op primarily touches (used in error details).
    pub fn node_id(&self) -> &str {
        match self {
            PatchOp::AddNode { node_id, .. }
            | PatchOp::SetParam { node_id, .. }
            | PatchOp::BindCredential { node_id, .. } => node_id,
            PatchOp::Connect { target_id, .. } => target_id,
        }
    }

    /// Parses an op list from the model's JSON (`[...]` or `{"ops": [...]}`).
    pub fn parse_list(value: &Value) -> Result<Vec<PatchOp>, serde_json::Error> {
        let list = value.get("ops").unwrap_or(value);
        serde_json::from_value(list.clone())
    }
}
