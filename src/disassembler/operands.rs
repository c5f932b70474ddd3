//! Operand-text scanners shared by the annotator and the analysis passes.
//!
//! The xref, signature and frame passes are defined over the formatted operand
//! text of an instruction. These helpers pull hex literals, RIP-relative
//! displacements, `[reg ± disp]` patterns and memory-size prefixes out of that
//! text without a regex engine.

/// Parse a `0x…` literal. Returns `None` for anything else.
pub(crate) fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Parse a `0x…` or decimal literal.
pub(crate) fn parse_int(text: &str) -> Option<u64> {
    if let Some(value) = parse_hex(text) {
        return Some(value);
    }
    text.parse::<u64>().ok()
}

/// Returns the literal value when the whole operand string is a single bare
/// `0x…` literal.
///
/// Deliberately conservative: an operand like `0x10, 0x20` is not a branch
/// target.
pub(crate) fn bare_hex_operand(operands: &str) -> Option<u64> {
    let trimmed = operands.trim();
    let digits = trimmed.strip_prefix("0x")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// All `0x…` literal values appearing anywhere in the operand string, in
/// textual order.
pub(crate) fn hex_literals(operands: &str) -> Vec<u64> {
    let bytes = operands.as_bytes();
    let mut values = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'0' && bytes[i + 1] == b'x' {
            let start = i + 2;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
                end += 1;
            }
            if end > start {
                if let Ok(value) = u64::from_str_radix(&operands[start..end], 16) {
                    values.push(value);
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }

    values
}

/// Extract a `[rip ± 0x…]` displacement as a signed value.
pub(crate) fn rip_displacement(operands: &str) -> Option<i64> {
    let (sign, disp) = bracket_displacement(operands, "rip")?;
    let disp = i64::try_from(disp).ok()?;
    Some(if sign == b'-' { -disp } else { disp })
}

/// Extract a `[reg ± disp]` pattern for the given base register, returning the
/// sign byte (`b'+'` / `b'-'`) and the unsigned displacement.
///
/// A bare `[reg]` (no displacement) yields `None`; index/scale forms like
/// `[reg+rax*4+0x10]` also yield `None`, those displacements do not name a
/// simple frame slot.
pub(crate) fn bracket_displacement(operands: &str, reg: &str) -> Option<(u8, u64)> {
    let mut search_from = 0;
    while let Some(found) = operands[search_from..].find('[') {
        let open = search_from + found;
        let close = operands[open..].find(']')? + open;
        let inner: String = operands[open + 1..close]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if let Some(rest) = inner.strip_prefix(reg) {
            let mut bytes = rest.bytes();
            if let Some(sign @ (b'+' | b'-')) = bytes.next() {
                let literal = &rest[1..];
                if let Some(disp) = parse_int(literal) {
                    return Some((sign, disp));
                }
            }
        }

        search_from = close + 1;
    }

    None
}

/// Memory-operand size in bytes from a `byte|word|dword|qword ptr` prefix.
pub(crate) fn memory_size_prefix(operands: &str) -> Option<usize> {
    for (prefix, size) in [
        ("qword ptr", 8),
        ("dword ptr", 4),
        ("word ptr", 2),
        ("byte ptr", 1),
    ] {
        if operands.contains(prefix) {
            // "word ptr" is a substring of "dword ptr"/"qword ptr"; make sure
            // the match starts at a token boundary.
            let at = operands.find(prefix).unwrap_or(0);
            let boundary = at == 0 || !operands.as_bytes()[at - 1].is_ascii_alphanumeric();
            if boundary {
                return Some(size);
            }
        }
    }

    None
}

/// Split the operand string into alphanumeric tokens, lowering nothing; the
/// formatter already emits lowercase.
pub(crate) fn tokens(operands: &str) -> impl Iterator<Item = &str> {
    operands
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Split `operands` at the first top-level `,` into (first, rest).
pub(crate) fn split_first_operand(operands: &str) -> (&str, &str) {
    match operands.find(',') {
        Some(at) => (operands[..at].trim(), operands[at + 1..].trim()),
        None => (operands.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hex() {
        assert_eq!(bare_hex_operand("0x40000a"), Some(0x40000A));
        assert_eq!(bare_hex_operand(" 0x10 "), Some(0x10));
        assert_eq!(bare_hex_operand("0x10, 0x20"), None);
        assert_eq!(bare_hex_operand("rax"), None);
        assert_eq!(bare_hex_operand("0x"), None);
    }

    #[test]
    fn literals_in_order() {
        assert_eq!(
            hex_literals("qword ptr [rax+0x10], 0x20000"),
            vec![0x10, 0x20000]
        );
        assert!(hex_literals("rax, rbx").is_empty());
    }

    #[test]
    fn rip_forms() {
        assert_eq!(rip_displacement("rcx, qword ptr [rip+0x100]"), Some(0x100));
        assert_eq!(rip_displacement("rcx, qword ptr [rip-0x20]"), Some(-0x20));
        assert_eq!(rip_displacement("rcx, qword ptr [rip + 0x100]"), Some(0x100));
        assert_eq!(rip_displacement("rcx, rdx"), None);
    }

    #[test]
    fn bracket_forms() {
        assert_eq!(
            bracket_displacement("dword ptr [rbp-0x18], eax", "rbp"),
            Some((b'-', 0x18))
        );
        assert_eq!(
            bracket_displacement("rax, qword ptr [rsp+0x28]", "rsp"),
            Some((b'+', 0x28))
        );
        assert_eq!(bracket_displacement("rax, qword ptr [rsp]", "rsp"), None);
        assert_eq!(bracket_displacement("rax, [rbp+rcx*4+0x10]", "rbp"), None);
    }

    #[test]
    fn size_prefixes() {
        assert_eq!(memory_size_prefix("byte ptr [rbp-0x1]"), Some(1));
        assert_eq!(memory_size_prefix("word ptr [rbp-0x2]"), Some(2));
        assert_eq!(memory_size_prefix("dword ptr [rbp-0x4]"), Some(4));
        assert_eq!(memory_size_prefix("qword ptr [rbp-0x8]"), Some(8));
        assert_eq!(memory_size_prefix("eax, ebx"), None);
    }

    #[test]
    fn first_operand_split() {
        assert_eq!(split_first_operand("rax, rbx"), ("rax", "rbx"));
        assert_eq!(split_first_operand("rax"), ("rax", ""));
        let (dst, src) = split_first_operand("qword ptr [rsp+0x8], rcx");
        assert_eq!(dst, "qword ptr [rsp+0x8]");
        assert_eq!(src, "rcx");
    }
}
