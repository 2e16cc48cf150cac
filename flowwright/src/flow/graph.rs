//! The compiled flow payload: nodes and edges in the platform wire format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::{InputAnchor, InputParam, NodeSchema, OutputAnchor};

/// Canvas position assigned to a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Node payload: schema excerpt plus instance data.
///
/// Credential is carried at **both** `credential` and `inputs.credential`;
/// the validator enforces that they agree (binding invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeData {
    pub id: String,
    /// Node type name (schema key).
    pub name: String,
    pub label: String,
    pub version: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub base_classes: Vec<String>,
    #[serde(default)]
    pub input_anchors: Vec<InputAnchor>,
    #[serde(default)]
    pub input_params: Vec<InputParam>,
    #[serde(default)]
    pub output_anchors: Vec<OutputAnchor>,
    /// Parameter values and anchor connections; `credential` mirrored here.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Multi-output selection: `{"output": "<anchor name>"}`.
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// One node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub position: Position,
    pub data: FlowNodeData,
}

impl FlowNode {
    /// Builds a node instance from its schema: anchors and params copied,
    /// `inputs` prefilled from parameter defaults, empty `outputs`.
    pub fn from_schema(id: impl Into<String>, schema: &NodeSchema, position: Position) -> Self {
        let id = id.into();
        let mut inputs = Map::new();
        for param in &schema.input_params {
            if let Some(default) = &param.default {
                inputs.insert(param.name.clone(), default.clone());
            }
        }
        Self {
            id: id.clone(),
            position,
            data: FlowNodeData {
                id,
                name: schema.name.clone(),
                label: schema.label.clone(),
                version: schema.version.unwrap_or(1),
                category: schema.category.clone(),
                base_classes: schema.base_classes.clone(),
                input_anchors: schema.input_anchors.clone(),
                input_params: schema.input_params.clone(),
                output_anchors: schema.output_anchors.clone(),
                inputs,
                outputs: Map::new(),
                credential: None,
            },
        }
    }

    /// Writes the credential id to both `credential` and `inputs.credential`.
    pub fn bind_credential(&mut self, credential_id: &str) {
        self.data.credential = Some(credential_id.to_string());
        self.data.inputs.insert(
            "credential".into(),
            Value::String(credential_id.to_string()),
        );
    }
}

/// One edge; handles follow the encoding in [`crate::flow::Handle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

/// The flow payload: `{nodes: [...], edges: [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowGraph {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut FlowNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Parses from the platform's `flowData` JSON (string or object form).
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::schema::CredentialSpec;

    fn chat_model_schema() -> NodeSchema {
        NodeSchema {
            name: "chatOpenAI".into(),
            version: Some(2),
            label: "ChatOpenAI".into(),
            category: "Chat Models".into(),
            base_classes: vec!["BaseChatModel".into()],
            input_anchors: vec![],
            input_params: vec![InputParam {
                name: "modelName".into(),
                kind: "string".into(),
                optional: false,
                default: Some(Value::String("gpt-4o".into())),
            }],
            output_anchors: vec![OutputAnchor {
                name: "chatOpenAI".into(),
                types: vec!["BaseChatModel".into()],
                options: vec![],
            }],
            credential: Some(CredentialSpec {
                name: "credential".into(),
                accepted_types: vec!["openAIApi".into()],
            }),
            hash: String::new(),
        }
    }

    /// **Scenario**: from_schema prefills inputs from defaults and copies anchors.
    #[test]
    fn from_schema_prefills_defaults() {
        let node = FlowNode::from_schema("chatOpenAI_0", &chat_model_schema(), Position::default());
        assert_eq!(node.data.inputs["modelName"], "gpt-4o");
        assert_eq!(node.data.output_anchors.len(), 1);
        assert!(node.data.outputs.is_empty());
    }

    /// **Scenario**: bind_credential writes both credential fields identically.
    #[test]
    fn bind_credential_writes_both_levels() {
        let mut node =
            FlowNode::from_schema("chatOpenAI_0", &chat_model_schema(), Position::default());
        node.bind_credential("cred-42");
        assert_eq!(node.data.credential.as_deref(), Some("cred-42"));
        assert_eq!(node.data.inputs["credential"], "cred-42");
    }

    /// **Scenario**: from_value accepts both the string and object flowData forms.
    #[test]
    fn from_value_accepts_string_and_object() {
        let flow = FlowGraph::default();
        let as_obj = flow.to_value();
        let as_str = Value::String(serde_json::to_string(&flow).unwrap());
        assert_eq!(FlowGraph::from_value(&as_obj).unwrap(), flow);
        assert_eq!(FlowGraph::from_value(&as_str).unwrap(), flow);
    }
}
