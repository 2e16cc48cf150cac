//! In-memory event log for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use session_event::EventRecord;

use super::{EventLog, EventLogError};

#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<HashMap<String, Vec<EventRecord>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, record: &EventRecord) -> Result<(), EventLogError> {
        self.events
            .lock()
            .map_err(|e| EventLogError::Storage(e.to_string()))?
            .entry(record.session_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<EventRecord>, EventLogError> {
        Ok(self
            .events
            .lock()
            .map_err(|e| EventLogError::Storage(e.to_string()))?
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn next_seq(&self, session_id: &str) -> Result<u64, EventLogError> {
        Ok(self
            .events
            .lock()
            .map_err(|e| EventLogError::Storage(e.to_string()))?
            .get(session_id)
            .and_then(|v| v.last())
            .map(|r| r.seq + 1)
            .unwrap_or(0))
    }
}
