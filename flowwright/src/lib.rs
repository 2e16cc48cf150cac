//! # Flowwright
//!
//! An LLM-driven chatflow build/edit agent: a natural-language requirement
//! goes in, validated mutations of a remote low-code flow platform come out.
//! One session is a staged, checkpointed state machine — classify, hydrate,
//! resolve, plan, compile, validate, apply, test, evaluate — iterating under
//! strict budgets with human-in-the-loop interrupts at the decision points.
//!
//! ## Design principles
//!
//! - **Single state type**: a [`SessionState`] flows through every node,
//!   trifurcated into the LLM-visible transcript, selective scalar facts,
//!   and large artifacts that never enter prompts.
//! - **Graph as data**: routing is a `(from, guard, to)` transition table
//!   ([`TRANSITIONS`]) folded into conditional routers, not nested branches.
//! - **One envelope**: every tool return passes through [`wrap`]; only a
//!   bounded summary is ever LLM-visible.
//! - **Local-first knowledge**: node schemas, credentials, and templates are
//!   disk snapshots; the platform API is called only for targeted repairs,
//!   gated by a version/hash matrix.
//! - **One guarded write**: `apply_patch` re-reads the target and compares
//!   hashes before the single platform write.
//!
//! ## Main modules
//!
//! - [`session`]: the 18-node session graph, transition table, and
//!   [`SessionRunner`] (start / resume / cancel ingress).
//! - [`graph`]: generic staged runtime — [`StateGraph`], [`CompiledStateGraph`],
//!   [`Node`], interrupts, retries, per-node events and checkpoints.
//! - [`state`]: [`SessionState`] and the bucket merge laws.
//! - [`envelope`]: [`ToolResult`] and the wrapping rules.
//! - [`knowledge`]: schema/credential/template stores, patterns, snapshots.
//! - [`patch`]: [`PatchOp`] IR, the deterministic compiler, and validation.
//! - [`flow`]: node schemas, the compiled flow payload, handles, hashing.
//! - [`tools`]: namespaced, phase-filtered [`ToolRegistry`] and the
//!   [`DomainCapability`] seam.
//! - [`platform`]: the REST contract ([`PlatformClient`]) with HTTP and mock
//!   implementations.
//! - [`llm`]: [`LlmEngine`] contract, mock, and OpenAI-compatible engine.
//! - [`memory`]: checkpointers; [`events`]: the session event log;
//!   [`metrics`]: per-node capture and phase budgets; [`config`]:
//!   environment-driven [`Config`].

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod flow;
pub mod graph;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod patch;
pub mod platform;
pub mod session;
pub mod state;
pub mod tools;

pub use config::Config;
pub use envelope::{wrap, ToolResult};
pub use error::SessionError;
pub use graph::{CompiledStateGraph, Next, Node, StateGraph};
pub use llm::LlmEngine;
pub use message::Message;
pub use patch::PatchOp;
pub use platform::PlatformClient;
pub use session::{SessionOptions, SessionOutcome, SessionRunner, SessionStatus, TRANSITIONS};
pub use state::SessionState;
pub use tools::{DomainCapability, ToolRegistry};
