//! Patch IR: a typed operation list lowered deterministically into a flow
//! payload.
//!
//! The compile node is the only place graph edits are produced; everything
//! downstream (validate, preflight, apply) consumes its output. Compilation
//! is deterministic: same base + same ops → same flow, byte for byte.

mod compiler;
mod diff;
mod ir;
mod validate;

pub use compiler::{CompileOutcome, PatchCompiler, PatchErrorCode, PatchErrorEntry};
pub use diff::{compute_diff, DiffSummary};
pub use ir::PatchOp;
pub use validate::{validate_flow_data, validation_report};
