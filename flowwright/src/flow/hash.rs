//! Content hashing for flows and schemas.
//!
//! Flow hashes feed the WriteGuard (optimistic concurrency on the target
//! chatflow); schema hashes feed the knowledge-store fingerprint.

use sha2::{Digest, Sha256};

use super::graph::FlowGraph;

/// Hex-encoded SHA-256 of the given bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON encoding of a flow.
///
/// Struct field order is fixed and serde_json maps are key-sorted, so equal
/// flows always hash equal.
pub fn flow_hash(flow: &FlowGraph) -> String {
    let encoded = serde_json::to_string(flow).unwrap_or_default();
    sha256_hex(encoded.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::graph::FlowGraph;

    /// **Scenario**: Equal flows hash equal; any mutation changes the hash.
    #[test]
    fn flow_hash_is_deterministic() {
        let empty = FlowGraph::default();
        assert_eq!(flow_hash(&empty), flow_hash(&FlowGraph::default()));

        let mut edited = FlowGraph::default();
        edited.edges.push(crate::flow::FlowEdge {
            source: "a".into(),
            source_handle: "a-output-x-T".into(),
            target: "b".into(),
            target_handle: "b-input-y-T".into(),
        });
        assert_ne!(flow_hash(&empty), flow_hash(&edited));
    }

    /// **Scenario**: sha256_hex produces the well-known empty-input digest.
    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
