//! Bridges graph node lifecycle into the event log and subscriber stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use session_event::{EventRecord, EventStatus};
use tokio::sync::broadcast;

use crate::graph::NodeEventSink;

use super::EventLog;

/// Assigns monotonic seq numbers, appends to the log, and mirrors each
/// record to broadcast subscribers.
///
/// **Interaction**: Attached to the graph via `StateGraph::with_event_sink`;
/// one emitter serves all sessions of a runner, seq is tracked per emitter
/// construction (the runner seeds it from `EventLog::next_seq` on resume).
pub struct SessionEventEmitter {
    log: Arc<dyn EventLog>,
    next_seq: AtomicU64,
    subscribers: broadcast::Sender<EventRecord>,
}

impl SessionEventEmitter {
    pub fn new(log: Arc<dyn EventLog>, start_seq: u64) -> Self {
        let (subscribers, _) = broadcast::channel(256);
        Self {
            log,
            next_seq: AtomicU64::new(start_seq),
            subscribers,
        }
    }

    /// Subscribes to the live record stream (lossy for slow readers).
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.subscribers.subscribe()
    }

    /// The same subscription as a `Stream`, for front-end transports.
    pub fn subscribe_stream(&self) -> tokio_stream::wrappers::BroadcastStream<EventRecord> {
        tokio_stream::wrappers::BroadcastStream::new(self.subscribers.subscribe())
    }

    /// Appends an out-of-band record (e.g. `[auto-approved]` entries).
    pub async fn record(
        &self,
        session_id: &str,
        node: &str,
        phase: &str,
        status: EventStatus,
        summary: &str,
        payload: Value,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = EventRecord::new(session_id, seq, node, phase, status, 0, summary, payload);
        if let Err(e) = self.log.append(&record).await {
            tracing::warn!(session_id = session_id, error = %e, "event append failed");
        }
        let _ = self.subscribers.send(record);
    }
}

#[async_trait]
impl NodeEventSink for SessionEventEmitter {
    async fn node_event(
        &self,
        session_id: &str,
        node: &str,
        phase: &str,
        status: EventStatus,
        duration_ms: u64,
        summary: &str,
        payload: Value,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = EventRecord::new(
            session_id,
            seq,
            node,
            phase,
            status,
            duration_ms,
            summary,
            payload,
        );
        if let Err(e) = self.log.append(&record).await {
            tracing::warn!(session_id = session_id, error = %e, "event append failed");
        }
        let _ = self.subscribers.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventLog;

    /// **Scenario**: Emitted events get monotonic seqs, land in the log, and
    /// reach subscribers.
    #[tokio::test]
    async fn emits_to_log_and_subscribers() {
        let log = Arc::new(MemoryEventLog::new());
        let emitter = SessionEventEmitter::new(log.clone(), 0);
        let mut rx = emitter.subscribe();

        emitter
            .node_event(
                "s-1",
                "plan",
                "plan",
                EventStatus::Start,
                0,
                "",
                Value::Null,
            )
            .await;
        emitter
            .node_event(
                "s-1",
                "plan",
                "plan",
                EventStatus::End,
                42,
                "",
                Value::Null,
            )
            .await;

        let records = log.list("s-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[1].seq, 1);
        assert_eq!(records[1].duration_ms, 42);

        assert_eq!(rx.recv().await.unwrap().status, EventStatus::Start);
        assert_eq!(rx.recv().await.unwrap().status, EventStatus::End);
    }

    /// **Scenario**: The stream form yields the same records as the receiver.
    #[tokio::test]
    async fn subscribe_stream_yields_records() {
        use tokio_stream::StreamExt;

        let emitter = SessionEventEmitter::new(Arc::new(MemoryEventLog::new()), 0);
        let mut stream = emitter.subscribe_stream();
        emitter
            .record(
                "s-1",
                "plan",
                "plan",
                EventStatus::Start,
                "",
                Value::Null,
            )
            .await;
        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.node, "plan");
    }

    /// **Scenario**: A resumed emitter continues seq numbering from the log.
    #[tokio::test]
    async fn resumed_emitter_continues_seq() {
        let log = Arc::new(MemoryEventLog::new());
        let first = SessionEventEmitter::new(log.clone(), 0);
        first
            .record(
                "s-1",
                "hitl_plan",
                "plan",
                EventStatus::Interrupt,
                "awaiting approval",
                Value::Null,
            )
            .await;

        let start = log.next_seq("s-1").await.unwrap();
        let resumed = SessionEventEmitter::new(log.clone(), start);
        resumed
            .record(
                "s-1",
                "hitl_plan",
                "plan",
                EventStatus::End,
                "[auto-approved]",
                Value::Null,
            )
            .await;

        let records = log.list("s-1").await.unwrap();
        assert_eq!(records[1].seq, 1);
        assert_eq!(records[1].summary, "[auto-approved]");
    }
}
