//! Node schemas and credentials: the typed catalogue of platform nodes.
//!
//! One schema per node type. `hash` is a content hash over every observable
//! field, so it changes iff the schema changes; the knowledge store's
//! fingerprint is derived from these hashes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hash::sha256_hex;

/// A typed input connection point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAnchor {
    pub name: String,
    /// Types this anchor accepts; an edge is valid when the source's type
    /// disjunction intersects this set.
    pub accepted_types: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

/// A scalar configuration parameter on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParam {
    pub name: String,
    /// Parameter kind: `string`, `number`, `boolean`, `json`, `code`, `options`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

/// A typed output connection point.
///
/// Multi-output nodes carry a single anchor whose `types` is `["options"]`
/// and whose `options` lists the real anchors; the chosen one is recorded in
/// the flow node's `outputs.output` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputAnchor {
    pub name: String,
    /// Type disjunction this anchor produces.
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OutputAnchor>,
}

impl OutputAnchor {
    pub fn is_options(&self) -> bool {
        !self.options.is_empty()
    }
}

/// Credential requirement declared by a node schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    pub name: String,
    /// Credential types this node accepts (e.g. `openAIApi`).
    pub accepted_types: Vec<String>,
}

/// One platform node type. `name` is unique across the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub name: String,
    /// Absent when the platform reports no version; the repair gate then
    /// falls back to hash comparison.
    #[serde(default)]
    pub version: Option<u32>,
    pub label: String,
    #[serde(default)]
    pub category: String,
    /// Types this node produces (used when an output anchor lists no types).
    #[serde(default)]
    pub base_classes: Vec<String>,
    #[serde(default)]
    pub input_anchors: Vec<InputAnchor>,
    #[serde(default)]
    pub input_params: Vec<InputParam>,
    #[serde(default)]
    pub output_anchors: Vec<OutputAnchor>,
    #[serde(default)]
    pub credential: Option<CredentialSpec>,
    /// Content hash over every observable field above.
    #[serde(default)]
    pub hash: String,
}

impl NodeSchema {
    /// Computes the content hash over all observable fields (everything but
    /// `hash` itself) and returns a copy with the hash set.
    pub fn with_content_hash(mut self) -> Self {
        self.hash = self.content_hash();
        self
    }

    /// Content hash of the observable fields; changes iff any of them change.
    pub fn content_hash(&self) -> String {
        let mut clone = self.clone();
        clone.hash = String::new();
        let encoded = serde_json::to_string(&clone).unwrap_or_default();
        sha256_hex(encoded.as_bytes())
    }

    /// All output anchors an edge may reference, flattening `options[]`.
    pub fn flattened_output_anchors(&self) -> Vec<&OutputAnchor> {
        let mut flat = Vec::new();
        for anchor in &self.output_anchors {
            if anchor.is_options() {
                flat.extend(anchor.options.iter());
            } else {
                flat.push(anchor);
            }
        }
        flat
    }

    /// Whether this node has the multi-output `options` form.
    pub fn is_multi_output(&self) -> bool {
        self.output_anchors.iter().any(OutputAnchor::is_options)
    }

    pub fn input_anchor(&self, name: &str) -> Option<&InputAnchor> {
        self.input_anchors.iter().find(|a| a.name == name)
    }

    pub fn input_param(&self, name: &str) -> Option<&InputParam> {
        self.input_params.iter().find(|p| p.name == name)
    }
}

/// A credential known to the platform, snapshotted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub name: String,
    /// Credential type (e.g. `openAIApi`).
    #[serde(rename = "credentialName")]
    pub kind: String,
}
