//! RAG wiring: the vector store's required `document` anchor must be fed.

mod common;

use std::sync::Arc;

use common::raw_schema;
use flowwright::knowledge::{normalize_schema, CredentialStore, NodeSchemaStore};
use flowwright::patch::{PatchCompiler, PatchOp};
use flowwright::platform::MockPlatform;

fn compiler() -> PatchCompiler {
    let platform = Arc::new(MockPlatform::new());
    let schemas = Arc::new(NodeSchemaStore::new(platform.clone()));
    for name in ["pdfLoader", "vectorStore"] {
        schemas.insert(normalize_schema(&raw_schema(name)).unwrap());
    }
    PatchCompiler::new(schemas, Arc::new(CredentialStore::new(platform)))
}

fn add_ops() -> Vec<PatchOp> {
    vec![
        PatchOp::AddNode {
            node_id: "pdfLoader_0".into(),
            node_type: "pdfLoader".into(),
            position: None,
            params: serde_json::Map::new(),
        },
        PatchOp::AddNode {
            node_id: "vectorStore_0".into(),
            node_type: "vectorStore".into(),
            position: None,
            params: serde_json::Map::new(),
        },
    ]
}

/// **Scenario**: The RAG seed case — an IR that leaves the document loader
/// unwired is rejected naming `vectorStore_0.document`; wiring the loader
/// into the vector store's `document` anchor validates clean.
#[test]
fn document_anchor_must_be_wired() {
    let compiler = compiler();

    let missing_edge = compiler.compile(None, &add_ops());
    assert!(missing_edge.proposed_flow_data.is_none());
    assert!(missing_edge
        .errors
        .iter()
        .any(|e| e.anchor.as_deref() == Some("vectorStore_0.document")));

    let mut ops = add_ops();
    ops.push(PatchOp::Connect {
        source_id: "pdfLoader_0".into(),
        source_anchor: "pdfLoader".into(),
        target_id: "vectorStore_0".into(),
        target_anchor: "document".into(),
    });
    let wired = compiler.compile(None, &ops);
    assert!(wired.ok(), "errors: {:?}", wired.errors);
    let flow = wired.proposed_flow_data.unwrap();
    assert_eq!(flow.edges.len(), 1);
    assert!(flow.edges[0].target_handle.contains("-input-document-"));
}
