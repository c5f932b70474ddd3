//! Analysis passes over decoded instruction streams.
//!
//! Everything in this module is a pure function of its inputs: the same
//! instruction stream produces the same functions, xrefs, blocks, loops and
//! summaries on every run. The passes layer bottom-up:
//!
//! - [`detect_functions`] - entry point / exports / prologues / padding /
//!   call targets, unified into a sorted function list
//! - [`build_xref_map`] - typed cross-reference graph over a stream
//! - [`build_cfg`] / [`detect_loops`] - per-function basic blocks and
//!   natural-loop annotation
//! - [`infer_signature`] - calling convention and parameter count
//! - [`analyze_stack_frame`] - frame size and stack-slot summary
//!
//! Each per-function pass takes the full instruction stream and selects the
//! function's slice by address range, so one decoded section serves every
//! function in it. Callers running many functions poll their cancellation
//! token between functions; each individual pass is bounded by function size.

pub mod cfg;
pub mod frame;
pub mod functions;
pub mod signature;
pub mod xref;

pub use cfg::{build_cfg, detect_loops, BasicBlock, Loop};
pub use frame::{analyze_stack_frame, StackFrame, StackVar};
pub use functions::{detect_functions, DisasmFunction, FunctionHints};
pub use signature::{infer_signature, CallingConvention, FunctionSignature};
pub use xref::{build_xref_map, Xref, XrefKind, XrefMap};
