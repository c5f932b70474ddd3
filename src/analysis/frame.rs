//! Stack-frame layout inference.
//!
//! The frame size is taken from the first `sub rsp, imm` (or `sub esp, imm`)
//! inside the 10-instruction prologue window; functions that allocate in
//! several steps (`__chkstk`-style probes) are under-reported by design, the
//! first allocation wins. Variables are collected from `[reg ± offset]`
//! operand patterns across the whole function and merged by offset.

use rustc_hash::FxHashMap;

use crate::{
    analysis::DisasmFunction,
    disassembler::{operands, Instruction},
};

/// One detected stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackVar {
    /// Unsigned byte offset from the frame register (locals) or the parameter
    /// base (parameters).
    pub offset: u64,
    /// Access size in bytes, the widest observed.
    pub size: usize,
    /// Number of instructions touching the slot.
    pub access_count: u32,
    /// `var_<offset>` for locals, `arg_<index>` for parameters.
    pub name: String,
    /// True for incoming parameters accessed through the frame pointer.
    pub is_param: bool,
}

/// Frame summary: allocation size plus detected slots sorted by offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Bytes allocated by the prologue's first `sub rsp/esp, imm`; 0 when no
    /// allocation was found.
    pub frame_size: u64,
    /// Detected variables, ascending by offset.
    pub vars: Vec<StackVar>,
}

/// Prologue window inspected for the allocation instruction.
const PROLOGUE_WINDOW: usize = 10;

/// First `[rbp+N]` offset that is a parameter in 64-bit code (return address
/// plus saved rbp).
const X64_PARAM_BASE: u64 = 0x10;
/// First `[ebp+N]` offset that is a parameter in 32-bit code.
const X86_PARAM_BASE: u64 = 0x8;

struct SlotAccess {
    size: usize,
    count: u32,
    is_param: bool,
}

/// Analyze the stack frame of one function.
///
/// Returns `None` when neither a frame allocation nor any variable access was
/// detected.
#[must_use]
pub fn analyze_stack_frame(
    function: &DisasmFunction,
    instructions: &[Instruction],
    bitness: u32,
) -> Option<StackFrame> {
    let body: Vec<&Instruction> = instructions
        .iter()
        .filter(|i| function.contains(i.address))
        .collect();

    let (frame_reg, stack_reg, param_base, pointer_width) = if bitness == 64 {
        ("rbp", "rsp", X64_PARAM_BASE, 8)
    } else {
        ("ebp", "esp", X86_PARAM_BASE, 4)
    };

    // Frame size: first sub rsp/esp, imm in the prologue window wins.
    let mut frame_size = 0_u64;
    for instruction in body.iter().take(PROLOGUE_WINDOW) {
        if instruction.mnemonic != "sub" {
            continue;
        }
        let (dst, src) = operands::split_first_operand(&instruction.operands);
        if dst == stack_reg {
            if let Some(imm) = operands::parse_int(src) {
                frame_size = imm;
                break;
            }
        }
    }

    let mut slots: FxHashMap<u64, SlotAccess> = FxHashMap::default();
    let mut record = |offset: u64, size: usize, is_param: bool| {
        slots
            .entry(offset)
            .and_modify(|slot| {
                slot.count += 1;
                slot.size = slot.size.max(size);
            })
            .or_insert(SlotAccess {
                size,
                count: 1,
                is_param,
            });
    };

    for instruction in &body {
        let text = instruction.operands.as_str();
        let size = operands::memory_size_prefix(text).unwrap_or(pointer_width);

        if let Some((sign, offset)) = operands::bracket_displacement(text, frame_reg) {
            if sign == b'-' {
                record(offset, size, false);
            } else if offset >= param_base {
                record(offset, size, true);
            }
        }
        if let Some((b'+', offset)) = operands::bracket_displacement(text, stack_reg) {
            record(offset, size, false);
        }
    }

    if slots.is_empty() && frame_size == 0 {
        return None;
    }

    let mut offsets: Vec<u64> = slots.keys().copied().collect();
    offsets.sort_unstable();

    let mut vars = Vec::with_capacity(offsets.len());
    let mut param_index = 0_u32;
    for offset in offsets {
        let slot = &slots[&offset];
        let name = if slot.is_param {
            let name = format!("arg_{param_index}");
            param_index += 1;
            name
        } else {
            format!("var_{offset:X}")
        };
        vars.push(StackVar {
            offset,
            size: slot.size,
            access_count: slot.count,
            name,
            is_param: slot.is_param,
        });
    }

    Some(StackFrame { frame_size, vars })
}
