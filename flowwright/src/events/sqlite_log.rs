//! SQLite-backed session event log.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;
use session_event::{EventRecord, EventStatus};

use super::{EventLog, EventLogError};

/// Durable `session_events` table keyed by `(session_id, seq)`.
pub struct SqliteEventLog {
    db_path: std::path::PathBuf,
}

impl SqliteEventLog {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| EventLogError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_events (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                node TEXT NOT NULL,
                phase TEXT NOT NULL,
                status TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                summary TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            )
            "#,
            [],
        )
        .map_err(|e| EventLogError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, record: &EventRecord) -> Result<(), EventLogError> {
        let db_path = self.db_path.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            let payload = serde_json::to_string(&record.payload)
                .map_err(|e| EventLogError::Serialization(e.to_string()))?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO session_events
                (session_id, seq, node, phase, status, duration_ms, summary, payload_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.session_id,
                    record.seq as i64,
                    record.node,
                    record.phase,
                    record.status.as_str(),
                    record.duration_ms as i64,
                    record.summary,
                    payload,
                ],
            )
            .map_err(|e| EventLogError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| EventLogError::Storage(e.to_string()))?
    }

    async fn list(&self, session_id: &str) -> Result<Vec<EventRecord>, EventLogError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, seq, node, phase, status, duration_ms, summary, payload_json
                     FROM session_events WHERE session_id = ?1 ORDER BY seq ASC",
                )
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    let status: String = row.get(4)?;
                    let payload: String = row.get(7)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        status,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        payload,
                    ))
                })
                .map_err(|e| EventLogError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let (session_id, seq, node, phase, status, duration_ms, summary, payload) =
                    row.map_err(|e| EventLogError::Storage(e.to_string()))?;
                let status: EventStatus = status
                    .parse()
                    .map_err(EventLogError::Serialization)?;
                let payload = serde_json::from_str(&payload)
                    .map_err(|e| EventLogError::Serialization(e.to_string()))?;
                records.push(EventRecord {
                    session_id,
                    seq: seq as u64,
                    node,
                    phase,
                    status,
                    duration_ms: duration_ms as u64,
                    summary,
                    payload,
                });
            }
            Ok(records)
        })
        .await
        .map_err(|e| EventLogError::Storage(e.to_string()))?
    }

    async fn next_seq(&self, session_id: &str) -> Result<u64, EventLogError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            let max: Option<i64> = conn
                .query_row(
                    "SELECT MAX(seq) FROM session_events WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            Ok(max.map(|m| m as u64 + 1).unwrap_or(0))
        })
        .await
        .map_err(|e| EventLogError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Records persist across instances and keep seq ordering.
    #[tokio::test]
    async fn records_persist_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let log = SqliteEventLog::new(&path).unwrap();
        for seq in 0..3u64 {
            log.append(&EventRecord::new(
                "s-1",
                seq,
                "apply_patch",
                "converge",
                if seq == 2 {
                    EventStatus::Error
                } else {
                    EventStatus::End
                },
                10,
                "summary",
                serde_json::json!({"seq": seq}),
            ))
            .await
            .unwrap();
        }
        drop(log);

        let reopened = SqliteEventLog::new(&path).unwrap();
        let records = reopened.list("s-1").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].status, EventStatus::Error);
        assert_eq!(records[2].payload["seq"], 2);
        assert_eq!(reopened.next_seq("s-1").await.unwrap(), 3);
        assert_eq!(reopened.next_seq("fresh").await.unwrap(), 0);
    }
}
