//! Knowledge store: local-first snapshots of platform state.
//!
//! Node schemas, credentials, and templates load from disk at process start;
//! the platform API is called only for a targeted repair on a specific miss.
//! Patterns (reusable base flows) persist in SQLite. The store exposes a
//! schema fingerprint; a change between iterations is *drift* and is handled
//! per the configured policy.

mod credential_store;
mod pattern_store;
mod schema_store;
mod snapshot;
mod template_store;

pub use credential_store::CredentialStore;
pub use pattern_store::{Pattern, PatternFilter, PatternStore};
pub use schema_store::{normalize_schema, NodeSchemaStore, RepairAction};
pub use snapshot::{
    CredentialSnapshot, SchemaSnapshot, SnapshotMeta, TemplateSnapshot, CREDENTIALS_SNAPSHOT,
    NODE_SCHEMAS_SNAPSHOT, TEMPLATES_SNAPSHOT,
};
pub use template_store::{Template, TemplateStore};

use thiserror::Error;

use crate::error::SessionError;

/// Error from knowledge-store operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Schema missing locally and the targeted API repair failed.
    #[error("node schema unavailable: {0}")]
    SchemaUnavailable(String),
    /// No credential matched the given id, name, or type.
    #[error("credential unresolved: {0}")]
    CredentialUnresolved(String),
    /// Pattern fingerprint does not match the current catalogue.
    #[error("pattern {id} incompatible: fingerprint {pattern} != store {store}")]
    PatternIncompatible {
        id: String,
        pattern: String,
        store: String,
    },
    #[error("repair budget exhausted for {0}")]
    RepairBudgetExhausted(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("snapshot: {0}")]
    Snapshot(String),
}

impl From<KnowledgeError> for SessionError {
    fn from(e: KnowledgeError) -> Self {
        match e {
            KnowledgeError::SchemaUnavailable(name) => {
                SessionError::SchemaMismatch(format!("node schema unavailable: {}", name))
            }
            KnowledgeError::RepairBudgetExhausted(name) => {
                SessionError::SchemaMismatch(format!("repair budget exhausted for {}", name))
            }
            KnowledgeError::CredentialUnresolved(spec) => {
                SessionError::Validation(format!("credential unresolved: {}", spec))
            }
            KnowledgeError::PatternIncompatible { id, .. } => {
                SessionError::Validation(format!("pattern {} incompatible", id))
            }
            other => SessionError::Internal(other.to_string()),
        }
    }
}

/// Policy applied when the schema fingerprint changes between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    /// Log and record the drift, continue.
    #[default]
    Warn,
    /// Fail the iteration with a validation error.
    Fail,
    /// Re-fetch the full catalogue from the platform.
    Refresh,
}

impl std::str::FromStr for DriftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(DriftPolicy::Warn),
            "fail" => Ok(DriftPolicy::Fail),
            "refresh" => Ok(DriftPolicy::Refresh),
            other => Err(format!("unknown drift policy: {}", other)),
        }
    }
}
