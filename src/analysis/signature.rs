//! Heuristic calling-convention and parameter-count inference.
//!
//! 64-bit functions follow the Windows x64 convention: the first four
//! arguments arrive in rcx, rdx, r8, r9, the rest on the stack above the
//! 0x28-byte home space. A register that is read before the function writes
//! it is treated as an incoming argument. 32-bit functions are classified by
//! their epilogue (`ret N` means stdcall) or an early `ecx` read (thiscall),
//! with `[ebp+N]` accesses bounding the parameter count.

use crate::{
    analysis::DisasmFunction,
    disassembler::{operands, Instruction},
};

/// Calling convention of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// Windows x64 register convention; the only convention emitted for
    /// 64-bit code.
    Fastcall,
    /// Caller-cleanup, arguments on the stack.
    Cdecl,
    /// Callee-cleanup, signalled by `ret N`.
    Stdcall,
    /// `this` in ecx, rest per stdcall/cdecl.
    Thiscall,
}

impl std::fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallingConvention::Fastcall => "fastcall",
            CallingConvention::Cdecl => "cdecl",
            CallingConvention::Stdcall => "stdcall",
            CallingConvention::Thiscall => "thiscall",
        };
        f.write_str(name)
    }
}

/// Inferred signature summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Detected (64-bit) or classified (32-bit) convention.
    pub convention: CallingConvention,
    /// Number of parameters implied by register/stack accesses.
    pub param_count: u32,
}

/// Argument registers of the Windows x64 convention, with sub-register
/// aliases, in argument order.
const X64_ARG_REGISTERS: [[&str; 4]; 4] = [
    ["rcx", "ecx", "cx", "cl"],
    ["rdx", "edx", "dx", "dl"],
    ["r8", "r8d", "r8w", "r8b"],
    ["r9", "r9d", "r9w", "r9b"],
];

/// Aliases of ecx consulted by the 32-bit thiscall check.
const ECX_ALIASES: [&str; 3] = ["ecx", "cx", "cl"];

/// Instructions inspected by the 64-bit leading scan.
const X64_SCAN_WINDOW: usize = 20;
/// Instructions inspected by the 32-bit thiscall scan.
const X86_SCAN_WINDOW: usize = 10;

/// First stack offset above the x64 home space; `[rsp+0x28]` is argument 5.
const X64_STACK_ARG_BASE: u64 = 0x28;
/// First `[ebp+N]` offset that is a parameter in 32-bit code.
const X86_PARAM_BASE: u64 = 8;

/// Infer the signature of one function.
///
/// `instructions` is the full decoded stream; the function's slice is
/// selected by address range.
#[must_use]
pub fn infer_signature(
    function: &DisasmFunction,
    instructions: &[Instruction],
    bitness: u32,
) -> FunctionSignature {
    let body: Vec<&Instruction> = instructions
        .iter()
        .filter(|i| function.contains(i.address))
        .collect();

    if bitness == 64 {
        infer_x64(&body)
    } else {
        infer_x86(&body)
    }
}

fn infer_x64(body: &[&Instruction]) -> FunctionSignature {
    let mut written = [false; 4];
    let mut read_first = [false; 4];
    let mut stack_params = 0_u32;

    for instruction in body.iter().take(X64_SCAN_WINDOW) {
        let mnemonic = instruction.mnemonic.as_str();
        let text = instruction.operands.as_str();
        let (dst, src) = operands::split_first_operand(text);

        for (index, aliases) in X64_ARG_REGISTERS.iter().enumerate() {
            let in_dst = contains_register(dst, aliases);
            let in_src = contains_register(src, aliases);
            let anywhere = contains_register(text, aliases);

            match mnemonic {
                "mov" | "lea" | "movzx" | "movsx" => {
                    if !written[index] && in_src && !in_dst {
                        read_first[index] = true;
                    }
                    if is_bare_register(dst, aliases) {
                        written[index] = true;
                    }
                }
                "cmp" | "test" | "push" => {
                    if !written[index] && anywhere {
                        read_first[index] = true;
                    }
                }
                "call" => {}
                "add" | "sub" | "and" | "or" | "xor" => {
                    let clears = (mnemonic == "xor" || mnemonic == "sub")
                        && is_bare_register(dst, aliases)
                        && is_bare_register(src, aliases);
                    if clears {
                        written[index] = true;
                    } else if !written[index] && in_dst {
                        read_first[index] = true;
                    }
                }
                _ => {}
            }
        }

        // On-stack parameters live above the 0x28-byte home space.
        if let Some((b'+', offset)) = operands::bracket_displacement(text, "rsp") {
            if offset >= X64_STACK_ARG_BASE {
                let index = 5 + (offset - X64_STACK_ARG_BASE) / 8;
                stack_params = stack_params.max(index as u32);
            }
        }
    }

    let register_params = read_first
        .iter()
        .rposition(|&read| read)
        .map_or(0, |index| index as u32 + 1);

    FunctionSignature {
        convention: CallingConvention::Fastcall,
        param_count: register_params.max(stack_params),
    }
}

fn infer_x86(body: &[&Instruction]) -> FunctionSignature {
    // ret N with N > 0 is a stdcall epilogue; ret 0 is not.
    if let Some(last) = body.last() {
        if last.is_return() {
            if let Some(n) = operands::parse_int(last.operands.trim()) {
                if n > 0 {
                    return FunctionSignature {
                        convention: CallingConvention::Stdcall,
                        param_count: (n / 4) as u32,
                    };
                }
            }
        }
    }

    let convention = if reads_ecx_first(body) {
        CallingConvention::Thiscall
    } else {
        CallingConvention::Cdecl
    };

    // Highest [ebp+N] parameter slot bounds the count.
    let mut max_offset = None;
    for instruction in body {
        if let Some((b'+', offset)) =
            operands::bracket_displacement(&instruction.operands, "ebp")
        {
            if offset >= X86_PARAM_BASE {
                max_offset = Some(max_offset.map_or(offset, |m: u64| m.max(offset)));
            }
        }
    }

    let param_count = max_offset.map_or(0, |n| ((n - X86_PARAM_BASE) / 4 + 1) as u32);

    FunctionSignature {
        convention,
        param_count,
    }
}

/// Scan the first instructions for an `ecx` read before any `ecx` write.
fn reads_ecx_first(body: &[&Instruction]) -> bool {
    for instruction in body.iter().take(X86_SCAN_WINDOW) {
        let mnemonic = instruction.mnemonic.as_str();
        let text = instruction.operands.as_str();
        let (dst, src) = operands::split_first_operand(text);

        match mnemonic {
            "mov" | "lea" | "movzx" | "movsx" => {
                if contains_register(src, &ECX_ALIASES) && !contains_register(dst, &ECX_ALIASES) {
                    return true;
                }
                if is_bare_register(dst, &ECX_ALIASES) {
                    return false;
                }
            }
            "cmp" | "test" | "push" => {
                if contains_register(text, &ECX_ALIASES) {
                    return true;
                }
            }
            "call" => {}
            "add" | "sub" | "and" | "or" | "xor" => {
                let clears = (mnemonic == "xor" || mnemonic == "sub")
                    && is_bare_register(dst, &ECX_ALIASES)
                    && is_bare_register(src, &ECX_ALIASES);
                if clears {
                    return false;
                }
                if contains_register(dst, &ECX_ALIASES) {
                    return true;
                }
            }
            _ => {}
        }
    }

    false
}

fn contains_register(text: &str, aliases: &[&str]) -> bool {
    operands::tokens(text).any(|token| aliases.contains(&token))
}

/// True when `text` is the register itself, not a memory operand through it.
fn is_bare_register(text: &str, aliases: &[&str]) -> bool {
    !text.contains('[') && contains_register(text, aliases)
}
