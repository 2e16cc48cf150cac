//! Tool-result envelope: the single transformation point for tool output.
//!
//! Every tool return — LLM-callable or internal — passes through [`wrap`].
//! Only `summary` is ever LLM-visible; the full payload rides in `data` and
//! is routed to the `debug` bucket. Summaries are bounded and truncation is
//! always visible.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::clamp_visible;

/// Upper bound on a generated summary.
pub const MAX_SUMMARY_CHARS: usize = 300;

/// Normalized error carried by a failed tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Envelope for every tool return: `{ok, summary, facts, data, artifacts, error}`.
///
/// **Interaction**: Produced by [`wrap`]; consumed by the tool registry and
/// graph nodes, which append `summary` to the transcript, merge `facts`, and
/// stash `data` under `debug`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    /// Short human-readable summary; the only LLM-visible part.
    pub summary: String,
    /// Scalar metadata worth promoting into session facts.
    #[serde(default)]
    pub facts: Map<String, Value>,
    /// Full raw payload; debug bucket only, never in prompts.
    #[serde(default)]
    pub data: Option<Value>,
    /// Small structured handles (ids of created/updated items).
    #[serde(default)]
    pub artifacts: Map<String, Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
}

impl ToolResult {
    fn failure(tool_name: &str, error: ToolError) -> Self {
        Self {
            ok: false,
            summary: clamp_visible(
                format!("{} failed: {}", tool_name, error.message),
                MAX_SUMMARY_CHARS,
            ),
            facts: Map::new(),
            data: None,
            artifacts: Map::new(),
            error: Some(error),
        }
    }
}

/// Wraps a raw tool return into the envelope. Priority rules, first match wins:
///
/// 1. structured error → failure summary + normalized error
/// 2. validation result (`valid` key) → pass/fail + failing anchor names
/// 3. entity (`id` + `name`) → `X 'name' (id=id).`, id appended to artifacts
/// 4. snapshot acknowledgement (`snapshotted`) → `Snapshot saved as L (total N).`
/// 5. list → `{tool_name} returned {N} item(s).` plus top labels
/// 6. other object → first 200 chars of a stable JSON encoding
/// 7. scalar/string → first 300 chars
pub fn wrap(tool_name: &str, raw: Result<Value, ToolError>) -> ToolResult {
    let value = match raw {
        Err(e) => return ToolResult::failure(tool_name, e),
        Ok(v) => v,
    };

    if let Some(err) = value.get("error") {
        let message = err
            .as_str()
            .map(String::from)
            .or_else(|| err.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| err.to_string());
        let kind = err
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("tool_error")
            .to_string();
        let mut result = ToolResult::failure(tool_name, ToolError::new(kind, message));
        result.data = Some(value);
        return result;
    }

    if let Some(valid) = value.get("valid").and_then(|v| v.as_bool()) {
        return wrap_validation(tool_name, valid, value);
    }

    if let (Some(id), Some(name)) = (
        value.get("id").and_then(|v| v.as_str()),
        value.get("name").and_then(|v| v.as_str()),
    ) {
        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .unwrap_or("Item")
            .to_string();
        let mut facts = Map::new();
        facts.insert("id".into(), Value::String(id.to_string()));
        facts.insert("name".into(), Value::String(name.to_string()));
        let mut artifacts = Map::new();
        artifacts.insert(
            "ids".into(),
            Value::Array(vec![Value::String(id.to_string())]),
        );
        return ToolResult {
            ok: true,
            summary: clamp_visible(
                format!("{} '{}' (id={}).", kind, name, id),
                MAX_SUMMARY_CHARS,
            ),
            facts,
            data: Some(value),
            artifacts,
            error: None,
        };
    }

    if value.get("snapshotted").is_some() {
        let label = value
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("snapshot");
        let total = value.get("total").and_then(|v| v.as_u64()).unwrap_or(0);
        return ToolResult {
            ok: true,
            summary: format!("Snapshot saved as {} (total {}).", label, total),
            facts: Map::new(),
            data: Some(value),
            artifacts: Map::new(),
            error: None,
        };
    }

    if let Some(items) = value.as_array() {
        let labels: Vec<&str> = items
            .iter()
            .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
            .take(3)
            .collect();
        let mut summary = format!("{} returned {} item(s).", tool_name, items.len());
        if !labels.is_empty() {
            summary.push_str(&format!(" Top: {}.", labels.join(", ")));
        }
        let mut facts = Map::new();
        facts.insert("count".into(), Value::Number(items.len().into()));
        return ToolResult {
            ok: true,
            summary: clamp_visible(summary, MAX_SUMMARY_CHARS),
            facts,
            data: Some(value),
            artifacts: Map::new(),
            error: None,
        };
    }

    if value.is_object() {
        // serde_json maps are key-sorted, so this encoding is stable.
        let encoded = value.to_string();
        return ToolResult {
            ok: true,
            summary: clamp_visible(encoded, 200),
            facts: Map::new(),
            data: Some(value),
            artifacts: Map::new(),
            error: None,
        };
    }

    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    ToolResult {
        ok: true,
        summary: clamp_visible(text, MAX_SUMMARY_CHARS),
        facts: Map::new(),
        data: Some(value),
        artifacts: Map::new(),
        error: None,
    }
}

fn wrap_validation(tool_name: &str, valid: bool, value: Value) -> ToolResult {
    let summary = if valid {
        format!("{}: validation passed.", tool_name)
    } else {
        let anchors: Vec<String> = value
            .get("errors")
            .and_then(|e| e.as_array())
            .map(|errs| {
                errs.iter()
                    .filter_map(|e| {
                        e.get("anchor")
                            .or_else(|| e.get("detail"))
                            .and_then(|v| v.as_str())
                            .map(String::from)
                    })
                    .collect()
            })
            .unwrap_or_default();
        if anchors.is_empty() {
            format!("{}: validation failed.", tool_name)
        } else {
            format!("{}: validation failed at {}.", tool_name, anchors.join(", "))
        }
    };
    ToolResult {
        ok: valid,
        summary: clamp_visible(summary, MAX_SUMMARY_CHARS),
        facts: Map::new(),
        data: Some(value),
        artifacts: Map::new(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A structured error wraps to ok=false with a `failed:` summary.
    #[test]
    fn error_value_wraps_to_failure() {
        let raw = serde_json::json!({"error": {"type": "http", "message": "404 not found"}});
        let result = wrap("platform.get_chatflow", Ok(raw));
        assert!(!result.ok);
        assert!(result.summary.contains("platform.get_chatflow failed: 404 not found"));
        assert_eq!(result.error.as_ref().unwrap().kind, "http");
    }

    /// **Scenario**: A Rust-side error wraps the same way as an error payload.
    #[test]
    fn err_variant_wraps_to_failure() {
        let result = wrap(
            "platform.predict",
            Err(ToolError::new("timeout", "deadline exceeded")),
        );
        assert!(!result.ok);
        assert!(result.summary.contains("failed: deadline exceeded"));
    }

    /// **Scenario**: Validation results summarize pass/fail with failing anchor names.
    #[test]
    fn validation_result_summarizes_anchors() {
        let raw = serde_json::json!({
            "valid": false,
            "errors": [{"anchor": "conversationChain.model"}, {"anchor": "vectorStore.document"}]
        });
        let result = wrap("validate_flow", Ok(raw));
        assert!(!result.ok);
        assert!(result.summary.contains("conversationChain.model"));
        assert!(result.summary.len() <= MAX_SUMMARY_CHARS + 40);
    }

    /// **Scenario**: An entity with id and name becomes `X 'name' (id=...).` and records the id.
    #[test]
    fn entity_summary_and_artifact_id() {
        let raw = serde_json::json!({"id": "cf-12", "name": "Trip Planner", "kind": "Chatflow"});
        let result = wrap("platform.create_chatflow", Ok(raw));
        assert_eq!(result.summary, "Chatflow 'Trip Planner' (id=cf-12).");
        assert_eq!(result.artifacts["ids"][0], "cf-12");
        assert_eq!(result.facts["name"], "Trip Planner");
    }

    /// **Scenario**: Snapshot acknowledgements report label and total.
    #[test]
    fn snapshot_ack_summary() {
        let raw = serde_json::json!({"snapshotted": true, "label": "node_schemas", "total": 214});
        let result = wrap("knowledge.snapshot", Ok(raw));
        assert_eq!(result.summary, "Snapshot saved as node_schemas (total 214).");
    }

    /// **Scenario**: Lists report the count and at most the top labels, never contents.
    #[test]
    fn list_summary_counts_items() {
        let raw = serde_json::json!([
            {"id": "1", "name": "Trip Planner"},
            {"id": "2", "name": "Support Bot"},
        ]);
        let result = wrap("platform.list_chatflows", Ok(raw));
        assert!(result.summary.starts_with("platform.list_chatflows returned 2 item(s)."));
        assert!(result.summary.contains("Trip Planner"));
        assert_eq!(result.facts["count"], 2);
    }

    /// **Scenario**: Plain objects fall through to a 200-char stable encoding.
    #[test]
    fn object_summary_truncated_at_200() {
        let long = "v".repeat(500);
        let raw = serde_json::json!({"payload": long});
        let result = wrap("tool", Ok(raw));
        assert!(result.summary.contains("chars truncated"));
        assert!(result.summary.starts_with("{\"payload\""));
    }

    /// **Scenario**: Scalars are passed through up to 300 chars.
    #[test]
    fn scalar_summary() {
        let result = wrap("tool", Ok(Value::String("done".into())));
        assert_eq!(result.summary, "done");
        let long = "z".repeat(400);
        let result = wrap("tool", Ok(Value::String(long)));
        assert!(result.summary.contains("...[100 chars truncated]"));
    }

    /// **Scenario**: Summary bound holds for every rule (quantified contract).
    #[test]
    fn summary_bound_holds_for_all_shapes() {
        let shapes = vec![
            serde_json::json!({"error": "x".repeat(2000)}),
            serde_json::json!({"valid": false, "errors": [{"anchor": "a".repeat(1000)}]}),
            serde_json::json!({"id": "i", "name": "n".repeat(2000)}),
            serde_json::json!(["a".repeat(1000)]),
            serde_json::json!({"k": "v".repeat(1000)}),
            Value::String("s".repeat(1000)),
        ];
        for raw in shapes {
            let result = wrap("tool", Ok(raw));
            // Marker text may extend past the cap, but the kept prefix never does.
            assert!(
                result.summary.chars().count() <= MAX_SUMMARY_CHARS + 40,
                "summary too long: {}",
                result.summary.chars().count()
            );
        }
    }
}
