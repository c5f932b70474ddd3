//! Per-function control-flow graph construction.
//!
//! Blocks live in an arena (a plain vector indexed by dense block id), so the
//! cyclic successor/predecessor relationships are plain index lists and never
//! self-referencing. Every in-function control transfer lands on a block
//! start; `call` does not end a block.
//!
//! Loop detection is a separate pass over the finished block list, see
//! [`loops`].

mod loops;

pub use loops::{detect_loops, Loop};

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::{
    analysis::{
        xref::{XrefKind, XrefMap},
        DisasmFunction,
    },
    disassembler::{operands, Instruction},
};

/// One basic block of a function.
///
/// Ids are dense indices into the owning block list, assigned in address
/// order. `preds` is always the exact inverse of the `succs` relation over
/// that list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Dense id, equal to this block's index in the function's block list.
    pub id: usize,
    /// VA of the first instruction.
    pub start_addr: u64,
    /// VA one past the last instruction.
    pub end_addr: u64,
    /// The block's instructions; never empty.
    pub instructions: Vec<Instruction>,
    /// Ids of successor blocks, in classification order.
    pub succs: Vec<usize>,
    /// Ids of predecessor blocks, in discovery order.
    pub preds: Vec<usize>,
}

impl BasicBlock {
    /// The block's final (terminator) instruction, `None` only for a block
    /// constructed empty by hand.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

/// Build the basic blocks of one function.
///
/// `instructions` is the full decoded stream of the section; the function's
/// own slice is selected by address range. `xrefs` contributes extra leaders:
/// any in-range target of a branch or jump reference splits a block, which
/// covers transfers into this function from outside its body.
#[must_use]
pub fn build_cfg(
    function: &DisasmFunction,
    instructions: &[Instruction],
    xrefs: &XrefMap,
) -> Vec<BasicBlock> {
    let body: Vec<&Instruction> = instructions
        .iter()
        .filter(|i| function.contains(i.address))
        .collect();
    if body.is_empty() {
        return Vec::new();
    }

    // Instruction starts; leaders that do not coincide with one are dropped.
    let starts: BTreeSet<u64> = body.iter().map(|i| i.address).collect();
    let end_of_body = body.last().map_or(function.end_address(), |i| i.end_address());

    let mut leaders = BTreeSet::new();
    leaders.insert(body[0].address);

    for instruction in &body {
        if instruction.is_jump() || instruction.is_branch() {
            if let Some(target) = operands::bare_hex_operand(&instruction.operands) {
                if starts.contains(&target) {
                    leaders.insert(target);
                }
            }
            if starts.contains(&instruction.end_address()) {
                leaders.insert(instruction.end_address());
            }
        } else if instruction.is_return() && starts.contains(&instruction.end_address()) {
            leaders.insert(instruction.end_address());
        }
    }

    for (&target, refs) in xrefs.range(function.address..end_of_body) {
        if refs
            .iter()
            .any(|x| matches!(x.kind, XrefKind::Branch | XrefKind::Jmp))
            && starts.contains(&target)
        {
            leaders.insert(target);
        }
    }

    // Slice the body at its leaders, in address order.
    let leader_list: Vec<u64> = leaders.into_iter().collect();
    let mut blocks: Vec<BasicBlock> = Vec::with_capacity(leader_list.len());
    let mut block_of_start: FxHashMap<u64, usize> = FxHashMap::default();

    for (id, &start) in leader_list.iter().enumerate() {
        let limit = leader_list.get(id + 1).copied().unwrap_or(u64::MAX);
        let instructions: Vec<Instruction> = body
            .iter()
            .filter(|i| i.address >= start && i.address < limit)
            .map(|i| (*i).clone())
            .collect();
        let end_addr = instructions
            .last()
            .map_or(start, Instruction::end_address);

        block_of_start.insert(start, id);
        blocks.push(BasicBlock {
            id,
            start_addr: start,
            end_addr,
            instructions,
            succs: Vec::new(),
            preds: Vec::new(),
        });
    }

    // Wire successors off each block's terminator.
    for id in 0..blocks.len() {
        let Some(terminator) = blocks[id].terminator().cloned() else {
            continue;
        };
        let fallthrough = block_of_start.get(&blocks[id].end_addr).copied();

        let mut succs = Vec::new();
        if terminator.is_return() {
            // No successors.
        } else if terminator.is_jump() {
            if let Some(target) = operands::bare_hex_operand(&terminator.operands) {
                if let Some(&target_block) = block_of_start.get(&target) {
                    succs.push(target_block);
                }
            }
        } else if terminator.is_branch() {
            if let Some(target) = operands::bare_hex_operand(&terminator.operands) {
                if let Some(&target_block) = block_of_start.get(&target) {
                    succs.push(target_block);
                }
            }
            if let Some(fallthrough) = fallthrough {
                succs.push(fallthrough);
            }
        } else if let Some(fallthrough) = fallthrough {
            succs.push(fallthrough);
        }

        blocks[id].succs = succs;
    }

    // Predecessors are the exact inverse of successors.
    for id in 0..blocks.len() {
        for succ_index in 0..blocks[id].succs.len() {
            let succ = blocks[id].succs[succ_index];
            blocks[succ].preds.push(id);
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(address: u64, mnemonic: &str, operands: &str, size: usize) -> Instruction {
        Instruction {
            address,
            bytes: vec![0x90; size],
            mnemonic: mnemonic.to_string(),
            operands: operands.to_string(),
            size,
            comment: None,
        }
    }

    fn function(address: u64, size: u64) -> DisasmFunction {
        DisasmFunction {
            name: format!("sub_{address:X}"),
            address,
            size,
        }
    }

    #[test]
    fn single_block() {
        let instructions = vec![
            instruction(0x1000, "sub", "rsp, 0x28", 4),
            instruction(0x1004, "mov", "eax, 0x1", 5),
            instruction(0x1009, "add", "rsp, 0x28", 4),
            instruction(0x100D, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x1000, 14), &instructions, &XrefMap::new());

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, 0);
        assert_eq!(blocks[0].start_addr, 0x1000);
        assert_eq!(blocks[0].end_addr, 0x100E);
        assert_eq!(blocks[0].instructions.len(), 4);
        assert!(blocks[0].succs.is_empty());
        assert!(blocks[0].preds.is_empty());
    }

    #[test]
    fn conditional_loop() {
        // 0x10, 0x12, 0x14 (jne 0x10), 0x16 - a do-while over one block.
        let instructions = vec![
            instruction(0x10, "xor", "eax, eax", 2),
            instruction(0x12, "dec", "ecx", 2),
            instruction(0x14, "jne", "0x10", 2),
            instruction(0x16, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x10, 7), &instructions, &XrefMap::new());

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start_addr, 0x10);
        assert_eq!(blocks[0].end_addr, 0x16);
        assert_eq!(blocks[1].start_addr, 0x16);

        // Successors of block 0: the loop target (itself) and the fallthrough.
        assert_eq!(blocks[0].succs, vec![0, 1]);
        assert_eq!(blocks[0].preds, vec![0]);
        assert_eq!(blocks[1].preds, vec![0]);
        assert!(blocks[1].succs.is_empty());
    }

    #[test]
    fn diamond() {
        //        0x00: cmp
        //        0x02: je 0x08
        // then   0x04: mov, jmp 0x0a
        // else   0x08: mov
        // join   0x0a: ret
        let instructions = vec![
            instruction(0x00, "cmp", "eax, 0x0", 2),
            instruction(0x02, "je", "0x8", 2),
            instruction(0x04, "mov", "ebx, 0x1", 2),
            instruction(0x06, "jmp", "0xa", 2),
            instruction(0x08, "mov", "ebx, 0x2", 2),
            instruction(0x0A, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x00, 11), &instructions, &XrefMap::new());

        assert_eq!(blocks.len(), 4);
        // Entry branches to else-block and then-block.
        assert_eq!(blocks[0].succs, vec![2, 1]);
        // Then-block jumps to the join.
        assert_eq!(blocks[1].succs, vec![3]);
        // Else-block falls through to the join.
        assert_eq!(blocks[2].succs, vec![3]);
        assert_eq!(blocks[3].preds, vec![1, 2]);
    }

    #[test]
    fn call_does_not_split() {
        let instructions = vec![
            instruction(0x1000, "call", "0x2000", 5),
            instruction(0x1005, "mov", "ecx, eax", 2),
            instruction(0x1007, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x1000, 8), &instructions, &XrefMap::new());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].instructions.len(), 3);
    }

    #[test]
    fn xref_targets_split_blocks() {
        let instructions = vec![
            instruction(0x1000, "mov", "eax, 0x1", 5),
            instruction(0x1005, "mov", "ebx, 0x2", 5),
            instruction(0x100A, "ret", "", 1),
        ];
        // Another function jumps into 0x1005.
        let mut xrefs = XrefMap::new();
        xrefs.insert(
            0x1005,
            vec![crate::analysis::Xref {
                from: 0x4000,
                kind: XrefKind::Jmp,
            }],
        );

        let blocks = build_cfg(&function(0x1000, 11), &instructions, &xrefs);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].start_addr, 0x1005);
        assert_eq!(blocks[0].succs, vec![1]);
    }

    #[test]
    fn branch_outside_function_has_fallthrough_only() {
        let instructions = vec![
            instruction(0x1000, "jne", "0x9000", 2),
            instruction(0x1002, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x1000, 3), &instructions, &XrefMap::new());

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].succs, vec![1]);
    }

    #[test]
    fn unreachable_tail_after_ret_becomes_block() {
        let instructions = vec![
            instruction(0x1000, "ret", "", 1),
            instruction(0x1001, "nop", "", 1),
        ];
        let blocks = build_cfg(&function(0x1000, 2), &instructions, &XrefMap::new());

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].succs.is_empty());
        assert!(blocks[1].preds.is_empty());
    }

    #[test]
    fn preds_invert_succs() {
        let instructions = vec![
            instruction(0x00, "cmp", "eax, 0x0", 2),
            instruction(0x02, "je", "0x6", 2),
            instruction(0x04, "jmp", "0x0", 2),
            instruction(0x06, "ret", "", 1),
        ];
        let blocks = build_cfg(&function(0x00, 7), &instructions, &XrefMap::new());

        for block in &blocks {
            for &succ in &block.succs {
                assert!(blocks[succ].preds.contains(&block.id));
            }
            for &pred in &block.preds {
                assert!(blocks[pred].succs.contains(&block.id));
            }
        }
    }

    #[test]
    fn empty_function() {
        let blocks = build_cfg(&function(0x9000, 16), &[], &XrefMap::new());
        assert!(blocks.is_empty());
    }
}
