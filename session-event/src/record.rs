//! Event record types: status, record shape, payload bounding.
//!
//! One record per node entry/exit/error/interrupt. Payloads reference
//! facts/artifacts keys; raw blobs are bounded at construction so the log
//! row never exceeds `MAX_PAYLOAD_BYTES`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on the serialized payload of one event record (4 KiB).
pub const MAX_PAYLOAD_BYTES: usize = 4096;

/// Lifecycle status of one node-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Node started executing.
    Start,
    /// Node finished normally.
    End,
    /// Node failed; summary carries the normalized error.
    Error,
    /// Node paused awaiting user input.
    Interrupt,
}

impl EventStatus {
    /// Stable string form used in the sqlite `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Start => "start",
            EventStatus::End => "end",
            EventStatus::Error => "error",
            EventStatus::Interrupt => "interrupt",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(EventStatus::Start),
            "end" => Ok(EventStatus::End),
            "error" => Ok(EventStatus::Error),
            "interrupt" => Ok(EventStatus::Interrupt),
            other => Err(format!("unknown event status: {}", other)),
        }
    }
}

/// One session lifecycle event, keyed by `(session_id, seq)`.
///
/// `seq` is monotonic within a session. `payload` references facts/artifacts
/// keys only; it is bounded by [`bound_payload`] at construction.
///
/// **Interaction**: Produced by the graph run loop around every node;
/// consumed by the event log and the subscriber stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: String,
    /// Monotonically increasing per session; assigned by the emitter.
    pub seq: u64,
    /// Graph node id (e.g. `"classify_intent"`).
    pub node: String,
    /// Phase label (e.g. `"plan"`); empty for nodes outside a phase.
    pub phase: String,
    pub status: EventStatus,
    /// Wall time spent in the node; `0` for `start` events.
    pub duration_ms: u64,
    /// Short human-readable summary; never a raw blob.
    pub summary: String,
    /// Bounded structured payload (facts/artifacts keys, counts, verdicts).
    #[serde(default)]
    pub payload: Value,
}

impl EventRecord {
    /// Builds a record with the payload bounded to [`MAX_PAYLOAD_BYTES`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        seq: u64,
        node: impl Into<String>,
        phase: impl Into<String>,
        status: EventStatus,
        duration_ms: u64,
        summary: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            node: node.into(),
            phase: phase.into(),
            status,
            duration_ms,
            summary: summary.into(),
            payload: bound_payload(payload),
        }
    }

    /// Serializes this record to a JSON object for subscribers.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Bounds a payload to [`MAX_PAYLOAD_BYTES`] of serialized JSON.
///
/// Oversized payloads are replaced by a stub that records the original size
/// and, when the payload was an object with a `ref` key, preserves that
/// reference so subscribers can look the blob up in artifacts.
pub fn bound_payload(payload: Value) -> Value {
    let size = serde_json::to_string(&payload).map(|s| s.len()).unwrap_or(0);
    if size <= MAX_PAYLOAD_BYTES {
        return payload;
    }
    let reference = payload
        .get("ref")
        .and_then(|v| v.as_str())
        .map(String::from);
    let mut stub = serde_json::Map::new();
    stub.insert("payload_omitted".into(), Value::Bool(true));
    stub.insert("original_bytes".into(), Value::Number(size.into()));
    if let Some(r) = reference {
        stub.insert("ref".into(), Value::String(r));
    }
    Value::Object(stub)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Small payloads pass through bound_payload unchanged.
    #[test]
    fn bound_payload_keeps_small_values() {
        let v = serde_json::json!({"node_count": 3, "ref": "chatflow.current_flow_data"});
        assert_eq!(bound_payload(v.clone()), v);
    }

    /// **Scenario**: Payloads above 4 KiB are replaced by a stub that keeps the ref key.
    #[test]
    fn bound_payload_replaces_oversized_values() {
        let big = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let v = serde_json::json!({"ref": "chatflow.current_flow_data", "blob": big});
        let bounded = bound_payload(v);
        assert_eq!(bounded["payload_omitted"], true);
        assert_eq!(bounded["ref"], "chatflow.current_flow_data");
        assert!(serde_json::to_string(&bounded).unwrap().len() <= MAX_PAYLOAD_BYTES);
    }

    /// **Scenario**: EventRecord::new bounds the payload and serializes with snake_case status.
    #[test]
    fn event_record_new_bounds_and_serializes() {
        let rec = EventRecord::new(
            "sess-1",
            7,
            "validate",
            "patch",
            EventStatus::End,
            12,
            "validation passed",
            serde_json::json!({"ok": true}),
        );
        let json = rec.to_json().unwrap();
        assert_eq!(json["session_id"], "sess-1");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["status"], "end");
        assert_eq!(json["payload"]["ok"], true);
    }

    /// **Scenario**: EventStatus round-trips through as_str / FromStr for all variants.
    #[test]
    fn event_status_str_roundtrip() {
        for status in [
            EventStatus::Start,
            EventStatus::End,
            EventStatus::Error,
            EventStatus::Interrupt,
        ] {
            let parsed: EventStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<EventStatus>().is_err());
    }
}
