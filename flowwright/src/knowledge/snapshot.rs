//! Disk snapshots for the knowledge store.
//!
//! Each snapshot file carries a meta record with the fingerprint at save
//! time, so a loaded store can detect catalogue drift immediately.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::flow::{Credential, NodeSchema};

use super::template_store::Template;
use super::KnowledgeError;

pub const NODE_SCHEMAS_SNAPSHOT: &str = "node_schemas.snapshot.json";
pub const CREDENTIALS_SNAPSHOT: &str = "credentials.snapshot.json";
pub const TEMPLATES_SNAPSHOT: &str = "templates.snapshot.json";

/// Meta record carried by every snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub fingerprint: String,
    pub saved_at: String,
    pub total: usize,
}

impl SnapshotMeta {
    pub fn new(fingerprint: impl Into<String>, total: usize) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            saved_at: Utc::now().to_rfc3339(),
            total,
        }
    }
}

/// `node_schemas.snapshot.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub meta: SnapshotMeta,
    pub schemas: Vec<NodeSchema>,
}

/// `credentials.snapshot.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    pub meta: SnapshotMeta,
    pub credentials: Vec<Credential>,
}

/// `templates.snapshot.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub meta: SnapshotMeta,
    pub templates: Vec<Template>,
}

fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, KnowledgeError> {
    let bytes = std::fs::read(path)
        .map_err(|e| KnowledgeError::Snapshot(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| KnowledgeError::Snapshot(format!("{}: {}", path.display(), e)))
}

fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), KnowledgeError> {
    let encoded = serde_json::to_vec_pretty(value)
        .map_err(|e| KnowledgeError::Snapshot(e.to_string()))?;
    std::fs::write(path, encoded)
        .map_err(|e| KnowledgeError::Snapshot(format!("{}: {}", path.display(), e)))
}

impl SchemaSnapshot {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        load(path.as_ref())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), KnowledgeError> {
        save(path.as_ref(), self)
    }
}

impl CredentialSnapshot {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        load(path.as_ref())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), KnowledgeError> {
        save(path.as_ref(), self)
    }
}

impl TemplateSnapshot {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        load(path.as_ref())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), KnowledgeError> {
        save(path.as_ref(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A schema snapshot round-trips through disk with its meta.
    #[test]
    fn schema_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(NODE_SCHEMAS_SNAPSHOT);
        let snapshot = SchemaSnapshot {
            meta: SnapshotMeta::new("fp-123", 1),
            schemas: vec![NodeSchema {
                name: "calculator".into(),
                version: Some(1),
                label: "Calculator".into(),
                category: "Tools".into(),
                base_classes: vec!["Tool".into()],
                input_anchors: vec![],
                input_params: vec![],
                output_anchors: vec![],
                credential: None,
                hash: String::new(),
            }
            .with_content_hash()],
        };
        snapshot.save_to(&path).unwrap();
        let loaded = SchemaSnapshot::load_from(&path).unwrap();
        assert_eq!(loaded.meta.fingerprint, "fp-123");
        assert_eq!(loaded.schemas[0].name, "calculator");
    }

    /// **Scenario**: Loading a missing file is a Snapshot error, not a panic.
    #[test]
    fn missing_snapshot_is_error() {
        let err = SchemaSnapshot::load_from("/nonexistent/schemas.json").unwrap_err();
        assert!(matches!(err, KnowledgeError::Snapshot(_)));
    }
}
