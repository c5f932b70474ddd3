//! # pescope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and functions of the library. Import it to get quick access to the whole
//! analysis pipeline.
//!
//! ```rust,no_run
//! use pescope::prelude::*;
//!
//! let image = PeImage::from_mem(std::fs::read("target.dll")?)?;
//! println!("{} sections", image.sections().len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pescope operations
pub use crate::Error;

/// The result type used throughout pescope
pub use crate::Result;

/// Cooperative cancellation token for long-running passes
pub use crate::CancelToken;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Parse a PE image from an owned byte buffer
pub use crate::parse;

/// The parsed image model
pub use crate::PeImage;

// ================================================================================================
// Image Model - Tables and Strings
// ================================================================================================

/// Import and export table entries
pub use crate::{ExportEntry, ImportEntry};

/// The IAT slot lookup map consumed by the annotator
pub use crate::IatMap;

/// Extracted read-only-data strings
pub use crate::{extract_strings, PeString, StringEncoding, StringTable};

/// Section table entry
pub use crate::SectionHeader;

// ================================================================================================
// Disassembly
// ================================================================================================

/// Linear-sweep decoding and the instruction model
pub use crate::disassembler::{disassemble, DisasmCache, Instruction, InstructionStream};

/// Operand comment resolution against strings and imports
pub use crate::disassembler::Annotator;

// ================================================================================================
// Analysis Passes
// ================================================================================================

/// Function discovery
pub use crate::analysis::{detect_functions, DisasmFunction, FunctionHints};

/// Typed cross-reference graph
pub use crate::analysis::{build_xref_map, Xref, XrefKind, XrefMap};

/// Basic blocks and natural loops
pub use crate::analysis::{build_cfg, detect_loops, BasicBlock, Loop};

/// Calling-convention and stack-frame summaries
pub use crate::analysis::{
    analyze_stack_frame, infer_signature, CallingConvention, FunctionSignature, StackFrame,
    StackVar,
};
