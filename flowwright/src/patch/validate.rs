//! Final validation pass over a compiled flow.
//!
//! Self-contained: nodes carry their anchors, so validation needs no schema
//! lookups — only the credential store for the binding invariant.

use crate::flow::{FlowGraph, FlowNode, Handle, OutputAnchor};
use crate::knowledge::CredentialStore;

use super::compiler::PatchErrorEntry;

fn flattened_outputs(node: &FlowNode) -> Vec<&OutputAnchor> {
    let mut flat = Vec::new();
    for anchor in &node.data.output_anchors {
        if anchor.is_options() {
            flat.extend(anchor.options.iter());
        } else {
            flat.push(anchor);
        }
    }
    flat
}

fn is_placeholder(id: &str) -> bool {
    id.starts_with("{{") && id.ends_with("}}")
}

/// Validates handles, edge typing, required anchors, and the credential
/// binding invariant. Empty result means the flow is structurally sound.
pub fn validate_flow_data(
    flow: &FlowGraph,
    credentials: &CredentialStore,
) -> Vec<PatchErrorEntry> {
    let mut errors = Vec::new();

    for edge in &flow.edges {
        let source_handle = match Handle::parse(&edge.source_handle) {
            Ok(h) => h,
            Err(e) => {
                errors.push(PatchErrorEntry::structural(
                    None,
                    format!("unparsable source handle: {}", e),
                    None,
                ));
                continue;
            }
        };
        let target_handle = match Handle::parse(&edge.target_handle) {
            Ok(h) => h,
            Err(e) => {
                errors.push(PatchErrorEntry::structural(
                    None,
                    format!("unparsable target handle: {}", e),
                    None,
                ));
                continue;
            }
        };

        let Some(source) = flow.node(&edge.source) else {
            errors.push(PatchErrorEntry::structural(
                None,
                format!("edge references missing source node {}", edge.source),
                None,
            ));
            continue;
        };
        let Some(target) = flow.node(&edge.target) else {
            errors.push(PatchErrorEntry::structural(
                None,
                format!("edge references missing target node {}", edge.target),
                None,
            ));
            continue;
        };

        let source_anchor = flattened_outputs(source)
            .into_iter()
            .find(|a| a.name == source_handle.name);
        let Some(source_anchor) = source_anchor else {
            errors.push(PatchErrorEntry::structural(
                None,
                format!(
                    "source anchor {} not found on {}",
                    source_handle.name, edge.source
                ),
                Some(format!("{}.{}", edge.source, source_handle.name)),
            ));
            continue;
        };

        let target_anchor = target
            .data
            .input_anchors
            .iter()
            .find(|a| a.name == target_handle.name);
        let Some(target_anchor) = target_anchor else {
            errors.push(PatchErrorEntry::structural(
                None,
                format!(
                    "input anchor {} not found on {}",
                    target_handle.name, edge.target
                ),
                Some(format!("{}.{}", edge.target, target_handle.name)),
            ));
            continue;
        };

        let compatible = source_anchor
            .types
            .iter()
            .any(|t| target_anchor.accepted_types.contains(t));
        if !compatible {
            errors.push(PatchErrorEntry::structural(
                None,
                format!(
                    "type mismatch: {} produces [{}], {} accepts [{}]",
                    edge.source,
                    source_anchor.types.join("|"),
                    edge.target,
                    target_anchor.accepted_types.join("|")
                ),
                Some(format!("{}.{}", edge.target, target_anchor.name)),
            ));
        }
    }

    for node in &flow.nodes {
        for anchor in &node.data.input_anchors {
            if anchor.optional {
                continue;
            }
            let connected = flow.edges.iter().any(|e| {
                e.target == node.id
                    && Handle::parse(&e.target_handle)
                        .map(|h| h.name == anchor.name)
                        .unwrap_or(false)
            });
            let has_value = node
                .data
                .inputs
                .get(&anchor.name)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !connected && !has_value {
                errors.push(PatchErrorEntry::structural(
                    None,
                    format!("required anchor {}.{} is unconnected", node.id, anchor.name),
                    Some(format!("{}.{}", node.id, anchor.name)),
                ));
            }
        }

        let top = node.data.credential.as_deref();
        let inner = node
            .data
            .inputs
            .get("credential")
            .and_then(|v| v.as_str());
        match (top, inner) {
            (None, None) => {}
            (Some(a), Some(b)) if a == b => {
                if !is_placeholder(a) && credentials.get_by_id(a).is_none() {
                    errors.push(PatchErrorEntry::structural(
                        None,
                        format!("credential {} on {} does not resolve", a, node.id),
                        Some(format!("{}.credential", node.id)),
                    ));
                }
            }
            _ => {
                errors.push(PatchErrorEntry::structural(
                    None,
                    format!(
                        "credential fields disagree on {}: {:?} vs {:?}",
                        node.id, top, inner
                    ),
                    Some(format!("{}.credential", node.id)),
                ));
            }
        }
    }

    errors
}

/// Renders a validation outcome in the envelope's `{valid, errors}` shape.
pub fn validation_report(errors: &[PatchErrorEntry]) -> serde_json::Value {
    serde_json::json!({
        "valid": errors.is_empty(),
        "errors": errors
            .iter()
            .map(|e| serde_json::json!({
                "code": e.code.as_str(),
                "detail": e.detail,
                "anchor": e.anchor,
            }))
            .collect::<Vec<_>>(),
    })
}
