//! Linear-sweep disassembly of x86/x64 code.
//!
//! The decoder wraps iced-x86 and emits a lazy stream of [`Instruction`]
//! records over a byte slice. Decoding runs in 64 KiB chunks so callers can
//! cancel between chunks and memory use stays bounded; an undecodable byte
//! resynchronizes the sweep one byte forward. Each emitted instruction owns a
//! copy of its bytes, so instructions may outlive the image they were decoded
//! from.
//!
//! # Example
//!
//! ```rust
//! use pescope::disassembler::disassemble;
//!
//! // sub rsp, 0x28; ret
//! let code = [0x48, 0x83, 0xEC, 0x28, 0xC3];
//! let instructions: Vec<_> = disassemble(&code, 0x1000, 64, None)?.collect();
//! assert_eq!(instructions.len(), 2);
//! assert_eq!(instructions[0].mnemonic, "sub");
//! assert_eq!(instructions[1].mnemonic, "ret");
//! # Ok::<(), pescope::Error>(())
//! ```

mod annotator;
mod decoder;

pub(crate) mod operands;

pub use annotator::Annotator;
pub use decoder::{disassemble, InstructionStream};

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Bytes decoded per chunk; cancellation is polled at this granularity.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// One decoded instruction.
///
/// `bytes` is copied out of the source buffer during decoding; no field
/// aliases the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// VA of the first instruction byte.
    pub address: u64,
    /// The encoded instruction bytes, owned.
    pub bytes: Vec<u8>,
    /// Lowercase mnemonic, including prefixes (`jne`, `rep movsq`, ...).
    pub mnemonic: String,
    /// Formatted operand text, empty for operand-less instructions.
    pub operands: String,
    /// Instruction length in bytes.
    pub size: usize,
    /// Annotator-derived comment, when an operand resolved to a string or an
    /// import.
    pub comment: Option<String>,
}

impl Instruction {
    /// VA one past the last instruction byte.
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.address + self.size as u64
    }

    /// Returns true for `ret` / `retn`, with or without an immediate.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.mnemonic == "ret" || self.mnemonic == "retn"
    }

    /// Returns true for the unconditional `jmp`.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        self.mnemonic == "jmp"
    }

    /// Returns true for conditional branches (`j*` other than `jmp`).
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.mnemonic.starts_with('j') && self.mnemonic != "jmp"
    }

    /// Returns true for `call`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.mnemonic == "call"
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{:#x}: {}", self.address, self.mnemonic)
        } else {
            write!(f, "{:#x}: {} {}", self.address, self.mnemonic, self.operands)
        }
    }
}

/// Memoization cache for disassembled ranges.
///
/// Keyed by `(base VA, length, bitness)`; valid for exactly one image. Callers
/// must [`DisasmCache::clear`] it when switching to a new image.
#[derive(Debug, Default)]
pub struct DisasmCache {
    entries: FxHashMap<(u64, usize, u32), Arc<Vec<Instruction>>>,
}

impl DisasmCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previously cached range.
    #[must_use]
    pub fn get(&self, base_va: u64, len: usize, bitness: u32) -> Option<Arc<Vec<Instruction>>> {
        self.entries.get(&(base_va, len, bitness)).cloned()
    }

    /// Store a decoded range.
    pub fn insert(
        &mut self,
        base_va: u64,
        len: usize,
        bitness: u32,
        instructions: Vec<Instruction>,
    ) -> Arc<Vec<Instruction>> {
        let shared = Arc::new(instructions);
        self.entries
            .insert((base_va, len, bitness), Arc::clone(&shared));
        shared
    }

    /// Drop every cached range; required when the image changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
