//! Import-directory walker.
//!
//! Walks the import descriptor table, resolving library names and imported
//! function names (by name or by ordinal), and computes the Import Address
//! Table slot VA for every imported function. Malformed descriptors and
//! unreadable names are skipped; import parsing never fails an image that got
//! past the headers.

use tracing::debug;

use crate::file::{
    io::{read_le_at, read_le_at_dyn},
    parser::Parser,
    pe::{headers::SectionHeader, rva_to_offset},
};

/// Size in bytes of one import descriptor.
const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// One imported library with its resolved function names and IAT slot VAs.
///
/// `functions` and `iat_vas` are index-aligned: `iat_vas[i]` is the VA of the
/// IAT slot the loader patches for `functions[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Library name as recorded in the descriptor, e.g. `kernel32.dll`.
    pub library: String,
    /// Imported function names; ordinal-only imports appear as `Ordinal_<n>`.
    pub functions: Vec<String>,
    /// VA of each function's IAT slot, in import order.
    pub iat_vas: Vec<u64>,
}

/// Walk the import directory at `import_dir_rva`.
///
/// The thunk list preferred for name resolution is `original_first_thunk`; a
/// descriptor with a zero OFT falls back to `first_thunk` (bound imports).
/// IAT slot VAs are always computed from `first_thunk`.
pub(crate) fn parse_imports(
    data: &[u8],
    sections: &[SectionHeader],
    image_base: u64,
    is_pe32plus: bool,
    import_dir_rva: u32,
) -> Vec<ImportEntry> {
    let mut entries = Vec::new();

    let thunk_size = if is_pe32plus { 8_u64 } else { 4_u64 };
    let ordinal_flag = if is_pe32plus {
        1_u64 << 63
    } else {
        1_u64 << 31
    };

    let table_offset = rva_to_offset(sections, u64::from(import_dir_rva));

    for index in 0.. {
        let Some(descriptor_offset) = table_offset
            .checked_add((index * IMPORT_DESCRIPTOR_SIZE) as u64)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            break;
        };

        let mut cursor = descriptor_offset;
        let Ok(original_first_thunk) = read_le_at::<u32>(data, &mut cursor) else {
            break;
        };
        let Ok(_time_date_stamp) = read_le_at::<u32>(data, &mut cursor) else {
            break;
        };
        let Ok(_forwarder_chain) = read_le_at::<u32>(data, &mut cursor) else {
            break;
        };
        let Ok(name_rva) = read_le_at::<u32>(data, &mut cursor) else {
            break;
        };
        let Ok(first_thunk) = read_le_at::<u32>(data, &mut cursor) else {
            break;
        };

        // All-zero descriptor terminates the table.
        if original_first_thunk == 0 && name_rva == 0 && first_thunk == 0 {
            break;
        }

        let library = match read_name_string(data, sections, u64::from(name_rva)) {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!(descriptor = index, "skipping import descriptor with unreadable library name");
                continue;
            }
        };

        let thunk_rva = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let Ok(mut thunk_offset) =
            usize::try_from(rva_to_offset(sections, u64::from(thunk_rva)))
        else {
            continue;
        };

        let mut functions = Vec::new();
        let mut iat_vas = Vec::new();

        for thunk_index in 0.. {
            let Ok(thunk) = read_le_at_dyn(data, &mut thunk_offset, is_pe32plus) else {
                break;
            };
            if thunk == 0 {
                break;
            }

            let name = if thunk & ordinal_flag != 0 {
                format!("Ordinal_{}", thunk & 0xFFFF)
            } else {
                // Low bits are an RVA to a hint/name entry: 2-byte hint, then
                // the null-terminated ASCII name.
                let hint_name_rva = thunk & (ordinal_flag - 1);
                match read_name_string(data, sections, hint_name_rva + 2) {
                    Some(name) => name,
                    None => {
                        debug!(
                            library = %library,
                            thunk = thunk_index,
                            "skipping import thunk with unreadable name"
                        );
                        continue;
                    }
                }
            };

            functions.push(name);
            iat_vas.push(image_base + u64::from(first_thunk) + thunk_index as u64 * thunk_size);
        }

        entries.push(ImportEntry {
            library,
            functions,
            iat_vas,
        });
    }

    entries
}

/// Read a null-terminated ASCII string at `rva`, or `None` when out of range
/// or malformed.
fn read_name_string(data: &[u8], sections: &[SectionHeader], rva: u64) -> Option<String> {
    let offset = usize::try_from(rva_to_offset(sections, rva)).ok()?;
    if offset >= data.len() {
        return None;
    }

    let mut parser = Parser::new(data);
    parser.seek(offset).ok()?;
    parser.read_string_ascii().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::pe::headers::SectionCharacteristics;

    fn flat_section(len: u32) -> Vec<SectionHeader> {
        // Identity-mapped section: RVA == file offset.
        vec![SectionHeader {
            name: ".idata".to_string(),
            virtual_size: len,
            virtual_address: 0,
            size_of_raw_data: len,
            pointer_to_raw_data: 0,
            characteristics: SectionCharacteristics::CNT_INITIALIZED_DATA
                | SectionCharacteristics::MEM_READ,
        }]
    }

    #[test]
    fn ordinal_and_name_thunks() {
        // Mirrors a PE32+ import of ws2_32.dll with one ordinal import and one
        // named import behind it.
        let mut data = vec![0_u8; 0x3000];

        // Descriptor 0 at offset 0x100: OFT=0x200, name=0x300, FT=0x400.
        data[0x100..0x104].copy_from_slice(&0x200_u32.to_le_bytes());
        data[0x10C..0x110].copy_from_slice(&0x300_u32.to_le_bytes());
        data[0x110..0x114].copy_from_slice(&0x400_u32.to_le_bytes());
        // Descriptor 1 is all zero (terminator).

        // Library name.
        data[0x300..0x30B].copy_from_slice(b"ws2_32.dll\0");

        // Thunks at 0x200: ordinal 23, then hint/name RVA 0x2000, then 0.
        data[0x200..0x208].copy_from_slice(&0x8000_0000_0000_0017_u64.to_le_bytes());
        data[0x208..0x210].copy_from_slice(&0x2000_u64.to_le_bytes());

        // Hint/name at 0x2000: 2-byte hint then "connect".
        data[0x2002..0x200A].copy_from_slice(b"connect\0");

        let sections = flat_section(0x3000);
        let entries = parse_imports(&data, &sections, 0x1_8000_0000, true, 0x100);

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.library, "ws2_32.dll");
        assert_eq!(entry.functions, vec!["Ordinal_23", "connect"]);
        assert_eq!(
            entry.iat_vas,
            vec![0x1_8000_0400, 0x1_8000_0408],
            "IAT slots derive from first_thunk in thunk order"
        );
    }

    #[test]
    fn falls_back_to_first_thunk() {
        let mut data = vec![0_u8; 0x1000];

        // Descriptor with OFT = 0: thunks are read from FT.
        data[0x10C..0x110].copy_from_slice(&0x300_u32.to_le_bytes()); // name
        data[0x110..0x114].copy_from_slice(&0x200_u32.to_le_bytes()); // FT
        data[0x300..0x30D].copy_from_slice(b"kernel32.dll\0");

        // One 32-bit ordinal thunk.
        data[0x200..0x204].copy_from_slice(&0x8000_0042_u32.to_le_bytes());

        let sections = flat_section(0x1000);
        let entries = parse_imports(&data, &sections, 0x40_0000, false, 0x100);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].functions, vec!["Ordinal_66"]);
        assert_eq!(entries[0].iat_vas, vec![0x40_0200]);
    }

    #[test]
    fn unreadable_library_is_skipped() {
        let mut data = vec![0_u8; 0x200];

        // Name RVA points past the image; descriptor must be skipped, and the
        // walk continues to the terminator without error.
        data[0x100..0x104].copy_from_slice(&0x180_u32.to_le_bytes());
        data[0x10C..0x110].copy_from_slice(&0xFFFF_0000_u32.to_le_bytes());
        data[0x110..0x114].copy_from_slice(&0x180_u32.to_le_bytes());

        let sections = flat_section(0x200);
        let entries = parse_imports(&data, &sections, 0x40_0000, false, 0x100);
        assert!(entries.is_empty());
    }

    #[test]
    fn empty_table() {
        let data = vec![0_u8; 0x40];
        let sections = flat_section(0x40);
        assert!(parse_imports(&data, &sections, 0x40_0000, false, 0).is_empty());
    }
}
