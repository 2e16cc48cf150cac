//! Durable pattern store: reusable flow skeletons in SQLite.
//!
//! A pattern is data, not code: a compact flow payload plus metadata.
//! Seeding (`apply_as_base_graph`) is gated on schema-fingerprint
//! compatibility; patterns are never seeded in UPDATE mode (enforced by the
//! plan node, not here).

use std::path::Path;

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::FlowGraph;

use super::KnowledgeError;

/// One stored pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub category: String,
    pub node_types: Vec<String>,
    /// Empty means "compatible with any catalogue".
    #[serde(default)]
    pub schema_fingerprint: String,
    #[serde(default)]
    pub success_count: u32,
    /// ISO-8601 UTC.
    #[serde(default)]
    pub last_used_at: Option<String>,
    pub flow_data: Value,
}

impl Pattern {
    /// Schema-compatible when the fingerprint is empty or matches the store's.
    pub fn is_compatible_with(&self, store_fingerprint: &str) -> bool {
        self.schema_fingerprint.is_empty() || self.schema_fingerprint == store_fingerprint
    }
}

/// Filter for pattern search; all present fields must match, `node_types`
/// by overlap.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub domain: Option<String>,
    pub category: Option<String>,
    pub node_types: Vec<String>,
}

/// SQLite-backed pattern CRUD.
pub struct PatternStore {
    db_path: std::path::PathBuf,
}

impl PatternStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                domain TEXT NOT NULL,
                category TEXT NOT NULL,
                node_types TEXT NOT NULL,
                schema_fingerprint TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                last_used_at TEXT,
                flow_data TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    pub async fn save(&self, pattern: &Pattern) -> Result<(), KnowledgeError> {
        let db_path = self.db_path.clone();
        let pattern = pattern.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let node_types = serde_json::to_string(&pattern.node_types)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let flow_data = pattern.flow_data.to_string();
            conn.execute(
                r#"
                INSERT OR REPLACE INTO patterns
                (id, name, domain, category, node_types, schema_fingerprint,
                 success_count, last_used_at, flow_data)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    pattern.id,
                    pattern.name,
                    pattern.domain,
                    pattern.category,
                    node_types,
                    pattern.schema_fingerprint,
                    pattern.success_count,
                    pattern.last_used_at,
                    flow_data,
                ],
            )
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
    }

    pub async fn get(&self, id: &str) -> Result<Option<Pattern>, KnowledgeError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT * FROM patterns WHERE id = ?1")
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query(params![id])
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            match rows.next().map_err(|e| KnowledgeError::Storage(e.to_string()))? {
                Some(row) => Ok(Some(row_to_pattern(row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
    }

    /// Filtered search; results sorted by success_count descending.
    pub async fn search(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, KnowledgeError> {
        let db_path = self.db_path.clone();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT * FROM patterns ORDER BY success_count DESC, name ASC")
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let mut out = Vec::new();
            while let Some(row) = rows
                .next()
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?
            {
                let pattern = row_to_pattern(row)?;
                if let Some(domain) = &filter.domain {
                    if &pattern.domain != domain {
                        continue;
                    }
                }
                if let Some(category) = &filter.category {
                    if &pattern.category != category {
                        continue;
                    }
                }
                if !filter.node_types.is_empty()
                    && !pattern
                        .node_types
                        .iter()
                        .any(|t| filter.node_types.contains(t))
                {
                    continue;
                }
                out.push(pattern);
            }
            Ok(out)
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
    }

    pub async fn delete(&self, id: &str) -> Result<bool, KnowledgeError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            let affected = conn
                .execute("DELETE FROM patterns WHERE id = ?1", params![id])
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            Ok(affected > 0)
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
    }

    /// Bumps success_count and stamps last_used_at (ISO-8601 UTC).
    pub async fn record_success(&self, id: &str) -> Result<(), KnowledgeError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        let now = Utc::now().to_rfc3339();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            conn.execute(
                "UPDATE patterns SET success_count = success_count + 1, last_used_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?
    }

    /// Seeds a base graph from a pattern, gated on fingerprint compatibility.
    pub async fn apply_as_base_graph(
        &self,
        id: &str,
        store_fingerprint: &str,
    ) -> Result<FlowGraph, KnowledgeError> {
        let pattern = self
            .get(id)
            .await?
            .ok_or_else(|| KnowledgeError::Storage(format!("pattern not found: {}", id)))?;
        if !pattern.is_compatible_with(store_fingerprint) {
            return Err(KnowledgeError::PatternIncompatible {
                id: pattern.id,
                pattern: pattern.schema_fingerprint,
                store: store_fingerprint.to_string(),
            });
        }
        FlowGraph::from_value(&pattern.flow_data)
            .map_err(|e| KnowledgeError::Storage(format!("pattern flow_data: {}", e)))
    }

    /// Synchronous open used by tests to assert table shape.
    #[cfg(test)]
    fn connection(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.db_path).expect("open pattern db")
    }
}

fn row_to_pattern(row: &rusqlite::Row<'_>) -> Result<Pattern, KnowledgeError> {
    let node_types_json: String = row
        .get("node_types")
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
    let flow_data_json: String = row
        .get("flow_data")
        .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
    Ok(Pattern {
        id: row
            .get("id")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        name: row
            .get("name")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        domain: row
            .get("domain")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        category: row
            .get("category")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        node_types: serde_json::from_str(&node_types_json)
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        schema_fingerprint: row
            .get("schema_fingerprint")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        success_count: row
            .get("success_count")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        last_used_at: row
            .get("last_used_at")
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
        flow_data: serde_json::from_str(&flow_data_json)
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern(id: &str, fingerprint: &str) -> Pattern {
        Pattern {
            id: id.into(),
            name: "conversation base".into(),
            domain: "chatflow".into(),
            category: "conversation".into(),
            node_types: vec!["chatOpenAI".into(), "bufferMemory".into()],
            schema_fingerprint: fingerprint.into(),
            success_count: 0,
            last_used_at: None,
            flow_data: serde_json::json!({"nodes": [], "edges": []}),
        }
    }

    /// **Scenario**: Save, get, search-by-overlap, and delete round-trip.
    #[tokio::test]
    async fn crud_and_filtered_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.db")).unwrap();
        store.save(&sample_pattern("p1", "")).await.unwrap();
        let mut other = sample_pattern("p2", "");
        other.category = "rag".into();
        other.node_types = vec!["pdfLoader".into()];
        store.save(&other).await.unwrap();

        assert!(store.get("p1").await.unwrap().is_some());

        let hits = store
            .search(&PatternFilter {
                domain: Some("chatflow".into()),
                category: None,
                node_types: vec!["bufferMemory".into()],
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");

        assert!(store.delete("p1").await.unwrap());
        assert!(store.get("p1").await.unwrap().is_none());
    }

    /// **Scenario**: record_success bumps the counter and stamps last_used_at.
    #[tokio::test]
    async fn record_success_bumps_and_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.db")).unwrap();
        store.save(&sample_pattern("p1", "")).await.unwrap();
        store.record_success("p1").await.unwrap();
        store.record_success("p1").await.unwrap();
        let pattern = store.get("p1").await.unwrap().unwrap();
        assert_eq!(pattern.success_count, 2);
        assert!(pattern.last_used_at.is_some());
    }

    /// **Scenario**: apply_as_base_graph seeds when the fingerprint is empty or
    /// equal, and rejects a mismatch.
    #[tokio::test]
    async fn apply_as_base_graph_gated_on_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.db")).unwrap();
        store.save(&sample_pattern("any", "")).await.unwrap();
        store.save(&sample_pattern("pinned", "fp-1")).await.unwrap();

        assert!(store.apply_as_base_graph("any", "fp-current").await.is_ok());
        assert!(store.apply_as_base_graph("pinned", "fp-1").await.is_ok());
        let err = store
            .apply_as_base_graph("pinned", "fp-other")
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::PatternIncompatible { .. }));
    }

    /// **Scenario**: The patterns table has the documented columns.
    #[test]
    fn table_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.db")).unwrap();
        let conn = store.connection();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('patterns')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 9);
    }
}
