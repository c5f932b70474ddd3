// Copyright 2025-2026 The pescope authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # pescope
//!
//! A static-analysis library for Windows Portable Executable (PE) binaries.
//! Built in pure Rust, `pescope` turns an in-memory byte image into a
//! navigable model: parsed headers and tables, a linear disassembly of the
//! executable sections, inferred functions with names and sizes, a typed
//! cross-reference graph, per-function control-flow graphs with loop
//! annotation, and heuristic signature and stack-frame summaries.
//!
//! # Architecture
//!
//! The library is a pipeline of pure transformations, in dependency order:
//!
//! - **File Layer**: byte-source backends, bounds-checked readers, and the
//!   PE parser producing [`PeImage`]
//! - **Disassembler Layer**: chunked linear-sweep x86/x64 decoding over
//!   iced-x86, with inline string/IAT operand annotation
//! - **Analysis Layer**: function discovery, xref graph, basic blocks with
//!   natural-loop detection, calling-convention and stack-frame inference
//!
//! ## Key Components
//!
//! - [`PeImage`] - Main entry point: parse and own one image
//! - [`crate::disassembler`] - Instruction stream, annotator and cache
//! - [`crate::analysis`] - Functions, xrefs, CFG, loops, signatures, frames
//! - [`crate::prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling across the crate
//!
//! # Example
//!
//! ```rust,no_run
//! use pescope::prelude::*;
//!
//! let image = PeImage::from_mem(std::fs::read("target.dll")?)?;
//! let iat = image.iat_map();
//! let annotator = Annotator::new(image.strings(), &iat);
//!
//! let section = image.code_sections().next().expect("no code section");
//! let bytes = image.section_data(section)?;
//! let base_va = image.image_base() + u64::from(section.virtual_address);
//!
//! let instructions: Vec<_> =
//!     disassemble(bytes, base_va, image.bitness(), Some(&annotator))?.collect();
//!
//! let hints = FunctionHints {
//!     entry_point: image.entry_point_va(),
//!     exports: image
//!         .exports()
//!         .iter()
//!         .map(|e| (e.name.clone(), e.va(image.image_base())))
//!         .collect(),
//! };
//! let functions = detect_functions(bytes, base_va, image.bitness(), &hints, None);
//! let xrefs = build_xref_map(&instructions);
//!
//! for function in &functions {
//!     let blocks = build_cfg(function, &instructions, &xrefs);
//!     let loops = detect_loops(&blocks);
//!     let signature = infer_signature(function, &instructions, image.bitness());
//!     println!(
//!         "{} @ {:#x}: {} blocks, {} loops, {} params",
//!         function.name,
//!         function.address,
//!         blocks.len(),
//!         loops.len(),
//!         signature.param_count
//!     );
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Determinism and Concurrency
//!
//! Within one analysis run every output is a deterministic function of
//! `(bytes, bitness, options)`. The library is single-threaded per analysis
//! unit and holds no global state; separate images analyze safely on separate
//! threads. Instruction streams are not shareable across threads, the
//! annotator's maps are. Every [`disassembler::Instruction`] owns its bytes
//! and may outlive the image it was decoded from.
//!
//! # Cancellation
//!
//! Long-running passes poll a [`CancelToken`]: the decoder between 64 KiB
//! chunks and the function detector between sweep chunks. Work already
//! produced when cancellation lands remains structurally valid.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod disassembler;

pub(crate) mod file;

mod token;

/// Convenient re-exports of the most commonly used types and functions.
///
/// This module provides a curated selection of the most frequently used types
/// from across the library, allowing for convenient glob imports.
///
/// # Usage Examples
///
/// ```rust,no_run
/// use pescope::prelude::*;
///
/// let image = PeImage::from_mem(std::fs::read("target.dll")?)?;
/// println!("{} sections", image.sections().len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod prelude;

/// `Result` alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `pescope` Error type.
///
/// Header failures carry the offending value so viewers can render a single
/// descriptive message (`Invalid DOS signature: 0x1234`); everything behind
/// validated headers degrades softly and never surfaces here.
pub use error::Error;

/// Cooperative cancellation token, polled between decode chunks and sweeps.
pub use token::CancelToken;

/// Byte-source abstraction and implementations.
pub use file::{Backend, Memory, Physical};

/// Cursor-based reader over raw image bytes.
pub use file::parser::Parser;

/// The parsed image model and its table entries.
pub use file::pe::{
    extract_strings, ExportEntry, IatMap, ImportEntry, PeImage, PeString, StringEncoding,
    StringTable,
};

/// PE header structures.
pub use file::pe::headers::{
    CoffHeader, DataDirectory, DataDirectoryType, DosHeader, OptionalHeader,
    SectionCharacteristics, SectionHeader,
};

/// Parse a PE image from an owned byte buffer.
///
/// Shorthand for [`PeImage::from_mem`]; the viewer-facing entry point of the
/// pipeline.
///
/// # Errors
/// Fails on bad DOS/PE signatures, a bad optional-header magic, truncated
/// required headers, or a section whose raw range escapes the buffer.
pub fn parse(bytes: Vec<u8>) -> Result<PeImage> {
    PeImage::from_mem(bytes)
}
