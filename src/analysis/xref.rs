//! Typed cross-reference graph construction.
//!
//! One pass over an instruction stream produces a map from target VA to the
//! ordered list of references pointing at it. Control transfers are classified
//! by mnemonic; RIP-relative memory references resolve against the instruction
//! end; large absolute literals in non-control instructions become data
//! references.

use std::collections::BTreeMap;

use crate::disassembler::{operands, Instruction};

/// Classification of one cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// `call` to the target.
    Call,
    /// Unconditional `jmp` to the target.
    Jmp,
    /// Conditional branch to the target.
    Branch,
    /// Non-control memory reference.
    Data,
}

/// One reference: who points at the target, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xref {
    /// VA of the referencing instruction.
    pub from: u64,
    /// Reference classification.
    pub kind: XrefKind,
}

/// Target VA to references, references in instruction-stream order.
///
/// The ordered map keeps the xref view navigable by address; per-target lists
/// preserve insertion order, so callers may rely on it.
pub type XrefMap = BTreeMap<u64, Vec<Xref>>;

/// Threshold below which absolute literals are not considered addresses.
const DATA_XREF_FLOOR: u64 = 0x10000;

/// Build the typed xref map for an instruction stream.
///
/// Classification per instruction, first match wins:
///
/// 1. The whole operand is one bare `0x…` literal: `call` records a call,
///    `jmp` a jump, any other `j*` mnemonic a branch. Other mnemonics record
///    nothing; the bare-literal rule is deliberately conservative.
/// 2. The operand carries a `[rip ± disp]` reference: `call`/`jmp` record
///    call/jump to the resolved VA, anything else records a data reference.
/// 3. Otherwise, for non-control instructions, every `0x…` literal above
///    0x10000 records a data reference.
#[must_use]
pub fn build_xref_map(instructions: &[Instruction]) -> XrefMap {
    let mut map = XrefMap::new();

    for instruction in instructions {
        let is_control = instruction.is_call()
            || instruction.is_jump()
            || instruction.is_branch();

        if let Some(target) = operands::bare_hex_operand(&instruction.operands) {
            let kind = if instruction.is_call() {
                Some(XrefKind::Call)
            } else if instruction.is_jump() {
                Some(XrefKind::Jmp)
            } else if instruction.is_branch() {
                Some(XrefKind::Branch)
            } else {
                None
            };

            if let Some(kind) = kind {
                map.entry(target).or_default().push(Xref {
                    from: instruction.address,
                    kind,
                });
            }
        } else if let Some(disp) = operands::rip_displacement(&instruction.operands) {
            let target = instruction.end_address().wrapping_add_signed(disp);
            let kind = if instruction.is_call() {
                XrefKind::Call
            } else if instruction.is_jump() {
                XrefKind::Jmp
            } else {
                XrefKind::Data
            };
            map.entry(target).or_default().push(Xref {
                from: instruction.address,
                kind,
            });
        } else if !is_control {
            for value in operands::hex_literals(&instruction.operands) {
                if value > DATA_XREF_FLOOR {
                    map.entry(value).or_default().push(Xref {
                        from: instruction.address,
                        kind: XrefKind::Data,
                    });
                }
            }
        }
    }

    map
}
