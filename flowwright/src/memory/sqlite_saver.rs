//! SQLite-backed checkpointer. Persistent across process restarts.
//!
//! Uses `spawn_blocking` around rusqlite; one row per checkpoint, keyed by
//! `(session_id, checkpoint_id)`.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::checkpointer::{Checkpoint, CheckpointError, CheckpointListItem, Checkpointer};

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// SQLite checkpointer; state is stored as a JSON payload.
pub struct SqliteSaver<S> {
    db_path: std::path::PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> SqliteSaver<S> {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                node TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (session_id, checkpoint_id)
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            _state: PhantomData,
        })
    }
}

#[async_trait]
impl<S> Checkpointer<S> for SqliteSaver<S>
where
    S: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    async fn put(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError> {
        if session_id.is_empty() {
            return Err(CheckpointError::SessionIdRequired);
        }
        let payload = serde_json::to_string(&checkpoint.state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let session_id = session_id.to_string();
        let id = checkpoint.id.clone();
        let node = checkpoint.node.clone();
        let created_at_ms = checkpoint.created_at.timestamp_millis();
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO checkpoints
                (session_id, checkpoint_id, node, created_at_ms, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![session_id, id.clone(), node, created_at_ms, payload],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<String, CheckpointError>(id)
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn get_latest(&self, session_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError> {
        if session_id.is_empty() {
            return Err(CheckpointError::SessionIdRequired);
        }
        let session_id = session_id.to_string();
        let db_path = self.db_path.clone();

        type Row = (String, String, i64, String);
        let row: Option<Row> =
            tokio::task::spawn_blocking(move || -> Result<Option<Row>, CheckpointError> {
                let conn = rusqlite::Connection::open(&db_path)
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let mut stmt = conn
                    .prepare(
                        "SELECT checkpoint_id, node, created_at_ms, payload
                         FROM checkpoints WHERE session_id = ?1
                         ORDER BY created_at_ms DESC, rowid DESC LIMIT 1",
                    )
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let mut rows = stmt
                    .query(params![session_id])
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                match rows
                    .next()
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?
                {
                    Some(r) => {
                        let id: String =
                            r.get(0).map_err(|e| CheckpointError::Storage(e.to_string()))?;
                        let node: String =
                            r.get(1).map_err(|e| CheckpointError::Storage(e.to_string()))?;
                        let ms: i64 =
                            r.get(2).map_err(|e| CheckpointError::Storage(e.to_string()))?;
                        let payload: String =
                            r.get(3).map_err(|e| CheckpointError::Storage(e.to_string()))?;
                        Ok(Some((id, node, ms, payload)))
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        let (id, node, ms, payload) = match row {
            Some(r) => r,
            None => return Ok(None),
        };
        let state: S = serde_json::from_str(&payload)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        Ok(Some(Checkpoint {
            id,
            node,
            state,
            created_at: millis_to_utc(ms),
        }))
    }

    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointListItem>, CheckpointError> {
        if session_id.is_empty() {
            return Err(CheckpointError::SessionIdRequired);
        }
        let session_id = session_id.to_string();
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT checkpoint_id, node, created_at_ms
                     FROM checkpoints WHERE session_id = ?1
                     ORDER BY created_at_ms ASC, rowid ASC",
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok(CheckpointListItem {
                        checkpoint_id: row.get(0)?,
                        node: row.get(1)?,
                        created_at: millis_to_utc(row.get(2)?),
                    })
                })
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CheckpointError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
