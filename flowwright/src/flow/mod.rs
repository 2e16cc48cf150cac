//! Flow-graph data model: node schemas, credentials, the compiled flow
//! payload, edge handles, and content hashing.
//!
//! These types mirror the platform's wire format (camelCase) so a compiled
//! flow serializes directly into an update/create request body.

mod graph;
mod handle;
mod hash;
mod schema;

pub use graph::{FlowEdge, FlowGraph, FlowNode, FlowNodeData, Position};
pub use handle::{Direction, Handle, HandleParseError};
pub use hash::{flow_hash, sha256_hex};
pub use schema::{
    Credential, CredentialSpec, InputAnchor, InputParam, NodeSchema, OutputAnchor,
};
