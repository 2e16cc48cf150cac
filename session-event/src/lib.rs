//! Session event protocol: the wire shape of one session lifecycle event.
//!
//! This crate defines the record emitted for every graph-node entry and exit,
//! plus payload bounding. It does not depend on flowwright; the runtime
//! bridges its node lifecycle into `EventRecord` and appends to a log or
//! mirrors to a subscriber stream.

pub mod record;

pub use record::{bound_payload, EventRecord, EventStatus, MAX_PAYLOAD_BYTES};
