//! Instruction comment enrichment.
//!
//! The annotator resolves operand references against the image's string table
//! and IAT map and renders the result as a short human-readable comment. It
//! runs inline during decoding; lookups are exact-VA hits against read-only
//! maps, so a single annotator can be shared by reference across passes.
//!
//! Resolution order is fixed: a RIP-relative reference is inspected first,
//! then absolute hex immediates; at each step the string table wins over the
//! IAT. Comments must stay stable across runs, so this priority is part of the
//! contract.

use crate::file::pe::{IatMap, StringTable};

use super::operands;

/// Maximum rendered comment length; longer strings are cut to 57 chars + `...`.
const MAX_COMMENT_LEN: usize = 60;

/// Resolves instruction operands to string / import comments.
pub struct Annotator<'a> {
    strings: &'a StringTable,
    iat: &'a IatMap,
}

impl<'a> Annotator<'a> {
    /// Create an annotator over an image's string table and IAT map.
    #[must_use]
    pub fn new(strings: &'a StringTable, iat: &'a IatMap) -> Self {
        Annotator { strings, iat }
    }

    /// Derive the comment for one decoded instruction, if any operand
    /// resolves.
    ///
    /// `address` and `size` are the instruction's own VA and byte length; a
    /// RIP-relative displacement is resolved against `address + size`.
    #[must_use]
    pub fn comment(&self, address: u64, size: usize, operands: &str) -> Option<String> {
        if let Some(disp) = operands::rip_displacement(operands) {
            let target = (address + size as u64).wrapping_add_signed(disp);
            if let Some(comment) = self.lookup(target) {
                return Some(comment);
            }
        }

        let literals = operands::hex_literals(operands);
        for value in &literals {
            if let Some(string) = self.strings.get(*value) {
                return Some(truncate(&string.text));
            }
        }
        for value in &literals {
            if let Some((library, function)) = self.iat.get(value) {
                return Some(format!("{library}!{function}"));
            }
        }

        None
    }

    fn lookup(&self, va: u64) -> Option<String> {
        if let Some(string) = self.strings.get(va) {
            return Some(truncate(&string.text));
        }
        if let Some((library, function)) = self.iat.get(&va) {
            return Some(format!("{library}!{function}"));
        }
        None
    }
}

fn truncate(text: &str) -> String {
    if text.len() > MAX_COMMENT_LEN {
        format!("{}...", &text[..MAX_COMMENT_LEN - 3])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::pe::strings::extract_from_section;

    fn table_with(text: &[u8], va: u64) -> StringTable {
        extract_from_section(text, va)
    }

    #[test]
    fn rip_relative_string() {
        // lea rcx, [rip+0x100] at VA 0x1000, size 7 -> target 0x1107.
        let strings = table_with(b"Hello\0", 0x1107);
        let iat = IatMap::default();
        let annotator = Annotator::new(&strings, &iat);

        let comment = annotator.comment(0x1000, 7, "rcx, [rip+0x100]");
        assert_eq!(comment.as_deref(), Some("Hello"));
    }

    #[test]
    fn rip_relative_negative_displacement() {
        let strings = table_with(b"back\0", 0x0F00);
        let iat = IatMap::default();
        let annotator = Annotator::new(&strings, &iat);

        // target = 0x1000 + 7 - 0x107 = 0xF00
        let comment = annotator.comment(0x1000, 7, "rcx, [rip-0x107]");
        assert_eq!(comment.as_deref(), Some("back"));
    }

    #[test]
    fn rip_hits_iat_when_no_string() {
        let strings = StringTable::default();
        let mut iat = IatMap::default();
        iat.insert(
            0x1107,
            ("kernel32.dll".to_string(), "ExitProcess".to_string()),
        );
        let annotator = Annotator::new(&strings, &iat);

        let comment = annotator.comment(0x1000, 7, "qword ptr [rip+0x100]");
        assert_eq!(comment.as_deref(), Some("kernel32.dll!ExitProcess"));
    }

    #[test]
    fn absolute_immediate_string_beats_iat() {
        let strings = table_with(b"config\0", 0x40_3000);
        let mut iat = IatMap::default();
        iat.insert(0x40_3000, ("user32.dll".to_string(), "MessageBoxA".to_string()));
        let annotator = Annotator::new(&strings, &iat);

        let comment = annotator.comment(0x40_1000, 5, "ecx, 0x403000");
        assert_eq!(comment.as_deref(), Some("config"));
    }

    #[test]
    fn absolute_immediate_iat_fallback() {
        let strings = StringTable::default();
        let mut iat = IatMap::default();
        iat.insert(0x40_2010, ("user32.dll".to_string(), "MessageBoxA".to_string()));
        let annotator = Annotator::new(&strings, &iat);

        let comment = annotator.comment(0x40_1000, 6, "dword ptr [0x402010]");
        assert_eq!(comment.as_deref(), Some("user32.dll!MessageBoxA"));
    }

    #[test]
    fn long_strings_are_truncated() {
        let long = [b'A'; 80];
        let mut data = long.to_vec();
        data.push(0);
        let strings = table_with(&data, 0x5000);
        let iat = IatMap::default();
        let annotator = Annotator::new(&strings, &iat);

        let comment = annotator.comment(0x1000, 5, "rcx, 0x5000").unwrap();
        assert_eq!(comment.len(), MAX_COMMENT_LEN);
        assert!(comment.ends_with("..."));
        assert!(comment.starts_with("AAAA"));
    }

    #[test]
    fn no_match_no_comment() {
        let strings = StringTable::default();
        let iat = IatMap::default();
        let annotator = Annotator::new(&strings, &iat);

        assert!(annotator.comment(0x1000, 3, "rax, rbx").is_none());
        assert!(annotator.comment(0x1000, 5, "eax, 0x12345").is_none());
    }
}
