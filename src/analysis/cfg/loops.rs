//! Natural-loop detection over a function's basic blocks.
//!
//! A BFS from the entry block assigns each reachable block a layer (edge
//! distance from entry). Any edge whose destination layer is at or above its
//! source layer is a back edge; its destination is a loop header. Nesting
//! depth is derived afterwards by approximate containment over the header /
//! back-edge address spans, which is what the viewer annotation needs.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::BasicBlock;

/// One detected natural loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loop {
    /// Start VA of the header block.
    pub header_addr: u64,
    /// End VA of the block sourcing the back edge.
    pub back_edge_from_addr: u64,
    /// Nesting depth, 0 for outermost loops.
    pub depth: usize,
}

/// Detect natural loops over a block list produced by
/// [`super::build_cfg`].
///
/// Headers are deduplicated by start address; when several back edges share a
/// header, the first edge in block order is kept. Depth counts strict
/// containment of the header inside other loops' `[header, back_edge_from)`
/// spans.
#[must_use]
pub fn detect_loops(blocks: &[BasicBlock]) -> Vec<Loop> {
    if blocks.is_empty() {
        return Vec::new();
    }

    // Pass 1: BFS layering from the entry block.
    let mut layer: Vec<Option<usize>> = vec![None; blocks.len()];
    let mut queue = VecDeque::new();
    layer[0] = Some(0);
    queue.push_back(0_usize);

    while let Some(id) = queue.pop_front() {
        let next_layer = layer[id].unwrap_or(0) + 1;
        for &succ in &blocks[id].succs {
            if layer[succ].is_none() {
                layer[succ] = Some(next_layer);
                queue.push_back(succ);
            }
        }
    }

    // Pass 2: back edges. Destination layer <= source layer marks a loop
    // header at the destination.
    let mut headers: FxHashMap<u64, u64> = FxHashMap::default();
    let mut order: Vec<u64> = Vec::new();

    for block in blocks {
        let Some(source_layer) = layer[block.id] else {
            continue;
        };
        for &succ in &block.succs {
            let Some(dest_layer) = layer[succ] else {
                continue;
            };
            if dest_layer <= source_layer {
                let header_addr = blocks[succ].start_addr;
                headers.entry(header_addr).or_insert_with(|| {
                    order.push(header_addr);
                    block.end_addr
                });
            }
        }
    }

    // Pass 3: depth by approximate containment, over headers sorted by
    // address.
    order.sort_unstable();
    let loops: Vec<(u64, u64)> = order
        .iter()
        .map(|&header| (header, headers[&header]))
        .collect();

    loops
        .iter()
        .map(|&(header_addr, back_edge_from_addr)| {
            let depth = loops
                .iter()
                .filter(|&&(other_header, other_back)| {
                    (other_header, other_back) != (header_addr, back_edge_from_addr)
                        && header_addr >= other_header
                        && header_addr < other_back
                })
                .count();
            Loop {
                header_addr,
                back_edge_from_addr,
                depth,
            }
        })
        .collect()
}
