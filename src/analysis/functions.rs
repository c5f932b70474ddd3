//! Function discovery over a code section.
//!
//! Function starts are the union of four sources: the image entry point, the
//! named exports, fixed-byte prologue signatures, and (for sections small
//! enough to sweep) direct call targets, with alignment padding runs marking
//! the start that follows them. The union is sorted and sizes are derived so
//! the resulting list tiles the section: each function runs to the next start,
//! the last one to the section end.

use std::collections::BTreeMap;

use crate::{
    disassembler::{disassemble, operands},
    CancelToken,
};

/// Sections at or above this size skip the call-target sweep.
const CALL_SWEEP_LIMIT: usize = 2 * 1024 * 1024;

/// Alignment padding bytes between functions.
const PAD_BYTES: [u8; 2] = [0xCC, 0x90];

/// One discovered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmFunction {
    /// Display name: the export / entry-point name when known, `sub_<VA>`
    /// otherwise.
    pub name: String,
    /// Start VA.
    pub address: u64,
    /// Byte span; always derived. Runs to the next function start, excluding
    /// the alignment padding in front of it, or to the section end for the
    /// last function.
    pub size: u64,
}

impl DisasmFunction {
    /// VA one past the function's last byte.
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.address + self.size
    }

    /// Returns true if `va` falls inside the function's span.
    #[must_use]
    pub fn contains(&self, va: u64) -> bool {
        va >= self.address && va < self.end_address()
    }
}

/// Externally known function starts fed into detection.
#[derive(Debug, Clone, Default)]
pub struct FunctionHints {
    /// Entry-point VA from the optional header, named `entry_point`.
    pub entry_point: Option<u64>,
    /// `(name, VA)` pairs from the export directory.
    pub exports: Vec<(String, u64)>,
}

/// Detect the functions of one code section.
///
/// `bytes` are the section's raw bytes mapped at `base_va`. Hints outside the
/// section are ignored; the union of the remaining sources is deduplicated by
/// address. The call-target sweep only runs for sections under 2 MiB and
/// honors `token` between decode chunks; on cancellation the union simply
/// lacks call targets, which keeps the output well-formed.
#[must_use]
pub fn detect_functions(
    bytes: &[u8],
    base_va: u64,
    bitness: u32,
    hints: &FunctionHints,
    token: Option<&CancelToken>,
) -> Vec<DisasmFunction> {
    let section_end = base_va + bytes.len() as u64;
    let in_section = |va: u64| va >= base_va && va < section_end;

    // Address -> optional externally provided name. First name wins.
    let mut starts: BTreeMap<u64, Option<String>> = BTreeMap::new();
    let add = |starts: &mut BTreeMap<u64, Option<String>>, va: u64, name: Option<String>| {
        if !in_section(va) {
            return;
        }
        let slot = starts.entry(va).or_insert(None);
        if slot.is_none() {
            *slot = name;
        }
    };

    if let Some(entry) = hints.entry_point {
        add(&mut starts, entry, Some("entry_point".to_string()));
    }
    for (name, va) in &hints.exports {
        add(&mut starts, *va, Some(name.clone()));
    }

    for offset in prologue_offsets(bytes, bitness) {
        add(&mut starts, base_va + offset as u64, None);
    }

    for offset in pad_run_ends(bytes) {
        add(&mut starts, base_va + offset as u64, None);
    }

    if bytes.len() < CALL_SWEEP_LIMIT {
        for target in call_targets(bytes, base_va, bitness, token) {
            add(&mut starts, target, None);
        }
    }

    let addresses: Vec<(u64, Option<String>)> = starts.into_iter().collect();
    let mut functions = Vec::with_capacity(addresses.len());
    for (index, (address, name)) in addresses.iter().enumerate() {
        // A function runs to the next start, minus the alignment padding in
        // front of that start; the last one runs to the section end.
        let end = match addresses.get(index + 1) {
            Some((next_addr, _)) => {
                let mut end = *next_addr;
                while end > *address && PAD_BYTES.contains(&bytes[(end - base_va - 1) as usize])
                {
                    end -= 1;
                }
                end
            }
            None => section_end,
        };
        functions.push(DisasmFunction {
            name: name
                .clone()
                .unwrap_or_else(|| format!("sub_{address:X}")),
            address: *address,
            size: end - address,
        });
    }

    functions
}

/// Offsets of fixed-byte prologue patterns. No decoding involved.
fn prologue_offsets(bytes: &[u8], bitness: u32) -> Vec<usize> {
    let mut offsets = Vec::new();

    for i in 0..bytes.len() {
        let rest = &bytes[i..];
        let hit = if bitness == 64 {
            // push rbp; mov rbp, rsp
            rest.starts_with(&[0x55, 0x48, 0x89, 0xE5])
                // sub rsp, imm8
                || (rest.len() >= 4 && rest.starts_with(&[0x48, 0x83, 0xEC]))
                // sub rsp, imm32
                || (rest.len() >= 7 && rest.starts_with(&[0x48, 0x81, 0xEC]))
        } else {
            // push ebp; mov ebp, esp (both encodings)
            rest.starts_with(&[0x55, 0x8B, 0xEC]) || rest.starts_with(&[0x55, 0x89, 0xE5])
        };

        if hit {
            offsets.push(i);
        }
    }

    offsets
}

/// Offsets just past runs of two or more alignment-padding bytes.
fn pad_run_ends(bytes: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, byte) in bytes.iter().enumerate() {
        if PAD_BYTES.contains(byte) {
            run_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = run_start.take() {
            if i - start >= 2 {
                offsets.push(i);
            }
        }
    }

    offsets
}

/// Direct `call` targets found by sweeping the whole section.
fn call_targets(
    bytes: &[u8],
    base_va: u64,
    bitness: u32,
    token: Option<&CancelToken>,
) -> Vec<u64> {
    let Ok(stream) = disassemble(bytes, base_va, bitness, None) else {
        return Vec::new();
    };
    let stream = match token {
        Some(token) => stream.with_cancellation(token.clone()),
        None => stream,
    };

    let mut targets = Vec::new();
    for instruction in stream {
        if !instruction.is_call() {
            continue;
        }
        if let Some(target) = operands::bare_hex_operand(&instruction.operands) {
            targets.push(target);
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_function_via_prologue() {
        // sub rsp, 0x28; mov eax, 0x1; add rsp, 0x28; ret
        let code = [
            0x48, 0x83, 0xEC, 0x28, 0xB8, 0x01, 0x00, 0x00, 0x00, 0x48, 0x83, 0xC4, 0x28, 0xC3,
        ];
        let functions = detect_functions(
            &code,
            0x1_8000_1000,
            64,
            &FunctionHints::default(),
            None,
        );

        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].address, 0x1_8000_1000);
        assert_eq!(functions[0].size, 14);
        assert_eq!(functions[0].name, "sub_180001000");
    }

    #[test]
    fn call_target_and_pad_split() {
        // call 0x40000a; ret; int3 x4; mov rax, rcx; ret
        let code = [
            0xE8, 0x05, 0x00, 0x00, 0x00, // call +5 -> 0x40000A
            0xC3, // ret
            0xCC, 0xCC, 0xCC, 0xCC, // alignment pad
            0x48, 0x89, 0xC8, // mov rax, rcx
            0xC3, // ret
        ];
        let hints = FunctionHints {
            entry_point: Some(0x40_0000),
            exports: Vec::new(),
        };
        let functions = detect_functions(&code, 0x40_0000, 64, &hints, None);

        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].address, 0x40_0000);
        assert_eq!(functions[0].size, 6);
        assert_eq!(functions[0].name, "entry_point");
        assert_eq!(functions[1].address, 0x40_000A);
        assert_eq!(functions[1].size, 4);
        assert_eq!(functions[1].name, "sub_40000A");
    }

    #[test]
    fn export_names_win_over_heuristics() {
        // push rbp; mov rbp, rsp; ret
        let code = [0x55, 0x48, 0x89, 0xE5, 0xC3];
        let hints = FunctionHints {
            entry_point: None,
            exports: vec![("initialize".to_string(), 0x40_0000)],
        };
        let functions = detect_functions(&code, 0x40_0000, 64, &hints, None);

        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "initialize");
        assert_eq!(functions[0].size, 5);
    }

    #[test]
    fn out_of_section_hints_are_ignored() {
        let code = [0x90, 0xC3];
        let hints = FunctionHints {
            entry_point: Some(0x9999_0000),
            exports: vec![("elsewhere".to_string(), 0x1234)],
        };
        let functions = detect_functions(&code, 0x40_0000, 64, &hints, None);
        assert!(functions.is_empty());
    }

    #[test]
    fn sizes_tile_to_section_end() {
        // Two prologues back to back; sizes must cover the gap and the tail.
        let mut code = vec![0_u8; 0x40];
        code[0x00..0x04].copy_from_slice(&[0x55, 0x48, 0x89, 0xE5]);
        code[0x20..0x24].copy_from_slice(&[0x55, 0x48, 0x89, 0xE5]);

        let functions =
            detect_functions(&code, 0x1000, 64, &FunctionHints::default(), None);

        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].address, 0x1000);
        assert_eq!(functions[0].size, 0x20);
        assert_eq!(functions[1].address, 0x1020);
        assert_eq!(functions[1].size, 0x20);
        assert_eq!(functions[1].end_address(), 0x1040);
    }

    #[test]
    fn thirty_two_bit_prologues() {
        let code = [0x55, 0x8B, 0xEC, 0xC3, 0x90, 0x90, 0x55, 0x89, 0xE5, 0xC3];
        let functions =
            detect_functions(&code, 0x40_1000, 32, &FunctionHints::default(), None);

        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].address, 0x40_1000);
        assert_eq!(functions[1].address, 0x40_1006);
    }

    #[test]
    fn cancellation_drops_call_targets_only() {
        let token = CancelToken::new();
        token.cancel();

        // Entry hint plus one call whose target would otherwise split.
        let code = [
            0xE8, 0x05, 0x00, 0x00, 0x00, 0xC3, 0x90, 0x48, 0x31, 0xC0, 0x48, 0x31, 0xC0, 0xC3,
        ];
        let hints = FunctionHints {
            entry_point: Some(0x40_0000),
            exports: Vec::new(),
        };
        let functions = detect_functions(&code, 0x40_0000, 64, &hints, Some(&token));

        // The union still holds: entry point present, call target absent.
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].address, 0x40_0000);
        assert_eq!(functions[0].end_address(), 0x40_0000 + code.len() as u64);
    }
}
