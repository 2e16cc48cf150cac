//! Node schema store: local-first lookup with targeted API repair.
//!
//! `get` is O(1) against the snapshot. `get_or_repair` issues a single
//! targeted fetch on a miss, normalizes the response, and inserts it under
//! the version/hash gating matrix. A per-type single-writer lock collapses
//! concurrent misses into one API call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::flow::{sha256_hex, InputAnchor, InputParam, NodeSchema, OutputAnchor};
use crate::platform::PlatformClient;

use super::snapshot::SchemaSnapshot;
use super::KnowledgeError;

/// Decision of the repair gate for one fetched schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    SkipSameVersion,
    UpdateChangedVersionOrHash,
    SkipSameHash,
    UpdateNoVersionInfo,
}

impl RepairAction {
    /// The four-case gating matrix. Mixed presence (one side versioned, one
    /// not) is treated as a version difference.
    pub fn decide(
        local_version: Option<u32>,
        api_version: Option<u32>,
        local_hash: &str,
        api_hash: &str,
    ) -> Self {
        match (local_version, api_version) {
            (Some(l), Some(a)) if l == a => RepairAction::SkipSameVersion,
            (None, None) => {
                if local_hash == api_hash {
                    RepairAction::SkipSameHash
                } else {
                    RepairAction::UpdateNoVersionInfo
                }
            }
            _ => RepairAction::UpdateChangedVersionOrHash,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self,
            RepairAction::UpdateChangedVersionOrHash | RepairAction::UpdateNoVersionInfo
        )
    }
}

/// Local snapshot of the platform's node catalogue.
pub struct NodeSchemaStore {
    schemas: DashMap<String, NodeSchema>,
    /// Per-type single-writer locks so concurrent misses collapse to one fetch.
    repair_locks: DashMap<String, Arc<Mutex<()>>>,
    platform: Arc<dyn PlatformClient>,
    call_count: AtomicU64,
    repair_count: AtomicU64,
}

impl NodeSchemaStore {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            schemas: DashMap::new(),
            repair_locks: DashMap::new(),
            platform,
            call_count: AtomicU64::new(0),
            repair_count: AtomicU64::new(0),
        }
    }

    /// Loads the store from a disk snapshot.
    pub fn from_snapshot(snapshot: SchemaSnapshot, platform: Arc<dyn PlatformClient>) -> Self {
        let store = Self::new(platform);
        for schema in snapshot.schemas {
            let schema = if schema.hash.is_empty() {
                schema.with_content_hash()
            } else {
                schema
            };
            store.schemas.insert(schema.name.clone(), schema);
        }
        store
    }

    pub fn insert(&self, schema: NodeSchema) {
        let schema = if schema.hash.is_empty() {
            schema.with_content_hash()
        } else {
            schema
        };
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Total API repairs performed over the store's lifetime.
    pub fn repair_count(&self) -> u64 {
        self.repair_count.load(Ordering::SeqCst)
    }

    /// O(1) local lookup; no network, ever.
    pub fn get(&self, name: &str) -> Option<NodeSchema> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.schemas.get(name).map(|s| s.value().clone())
    }

    /// Local lookup with one targeted API repair on miss.
    ///
    /// `repairs_left` is the caller's per-iteration budget; the store refuses
    /// to fetch when it is zero so a miss surfaces as a schema mismatch
    /// instead of an unbounded API loop.
    pub async fn get_or_repair(
        &self,
        name: &str,
        repairs_left: &mut u32,
    ) -> Result<NodeSchema, KnowledgeError> {
        if let Some(schema) = self.get(name) {
            return Ok(schema);
        }
        if *repairs_left == 0 {
            return Err(KnowledgeError::RepairBudgetExhausted(name.to_string()));
        }

        let lock = self
            .repair_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another waiter may have repaired while we queued on the lock.
        if let Some(schema) = self.schemas.get(name).map(|s| s.value().clone()) {
            return Ok(schema);
        }

        let raw = self
            .platform
            .get_node_schema(name)
            .await
            .map_err(|e| KnowledgeError::SchemaUnavailable(format!("{}: {}", name, e)))?;
        let fetched = normalize_schema(&raw)
            .ok_or_else(|| KnowledgeError::SchemaUnavailable(name.to_string()))?;

        *repairs_left -= 1;
        self.repair_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(node_type = name, "schema repaired from platform");
        self.apply_repair(fetched.clone());
        Ok(fetched)
    }

    /// Inserts a fetched schema under the gating matrix; stale responses
    /// never overwrite fresher local data.
    pub fn apply_repair(&self, fetched: NodeSchema) -> RepairAction {
        let action = match self.schemas.get(&fetched.name) {
            Some(local) => RepairAction::decide(
                local.version,
                fetched.version,
                &local.hash,
                &fetched.hash,
            ),
            None => RepairAction::UpdateNoVersionInfo,
        };
        if action.is_update() {
            self.schemas.insert(fetched.name.clone(), fetched);
        }
        action
    }

    /// Re-fetches the full catalogue (drift policy `refresh`).
    pub async fn refresh_all(&self) -> Result<usize, KnowledgeError> {
        let raws = self
            .platform
            .list_node_schemas()
            .await
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
        let mut updated = 0usize;
        for raw in &raws {
            if let Some(schema) = normalize_schema(raw) {
                if self.apply_repair(schema).is_update() {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Content hash over the whole catalogue in canonical (name) order.
    ///
    /// A change between successive iterations constitutes drift.
    pub fn fingerprint(&self) -> String {
        let mut entries: Vec<(String, String)> = self
            .schemas
            .iter()
            .map(|e| (e.key().clone(), e.value().hash.clone()))
            .collect();
        entries.sort();
        let joined = entries
            .iter()
            .map(|(name, hash)| format!("{}:{}", name, hash))
            .collect::<Vec<_>>()
            .join("\n");
        sha256_hex(joined.as_bytes())
    }
}

/// Normalizes a raw platform schema payload.
///
/// Output-anchor priority: live `outputs` > legacy `outputAnchors` >
/// synthesized from the node's base classes.
pub fn normalize_schema(raw: &Value) -> Option<NodeSchema> {
    let name = raw.get("name")?.as_str()?.to_string();
    let label = raw
        .get("label")
        .and_then(|v| v.as_str())
        .unwrap_or(&name)
        .to_string();
    let version = raw.get("version").and_then(|v| v.as_u64()).map(|v| v as u32);
    let category = raw
        .get("category")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let base_classes: Vec<String> = raw
        .get("baseClasses")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let input_anchors: Vec<InputAnchor> = raw
        .get("inputAnchors")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let input_params: Vec<InputParam> = raw
        .get("inputParams")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let output_anchors: Vec<OutputAnchor> = if let Some(live) = raw.get("outputs") {
        serde_json::from_value(live.clone()).unwrap_or_default()
    } else if let Some(legacy) = raw.get("outputAnchors") {
        serde_json::from_value(legacy.clone()).unwrap_or_default()
    } else {
        Vec::new()
    };
    let output_anchors = if output_anchors.is_empty() {
        vec![OutputAnchor {
            name: name.clone(),
            types: if base_classes.is_empty() {
                vec![name.clone()]
            } else {
                base_classes.clone()
            },
            options: vec![],
        }]
    } else {
        output_anchors
    };

    let credential = raw
        .get("credential")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    Some(
        NodeSchema {
            name,
            version,
            label,
            category,
            base_classes,
            input_anchors,
            input_params,
            output_anchors,
            credential,
            hash: String::new(),
        }
        .with_content_hash(),
    )
}
