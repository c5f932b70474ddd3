//! Export-directory walker.
//!
//! Resolves the named exports of an image by joining the name-pointer table,
//! the ordinal table and the address table. Unreadable individual entries are
//! skipped; export parsing never fails an image that got past the headers.

use tracing::debug;

use crate::file::{
    io::read_le_at,
    parser::Parser,
    pe::{headers::SectionHeader, rva_to_offset},
};

/// One named export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Exported symbol name.
    pub name: String,
    /// Index into the export address table.
    pub ordinal: u16,
    /// RVA of the exported symbol.
    pub rva: u32,
}

impl ExportEntry {
    /// The export's VA under the given image base.
    #[must_use]
    pub fn va(&self, image_base: u64) -> u64 {
        image_base + u64::from(self.rva)
    }
}

/// Walk the export directory at `export_dir_rva`.
///
/// For each of `number_of_names` entries: the ordinal comes from the 16-bit
/// ordinal table, the name from the C-string behind the name-pointer table,
/// and the address from the 32-bit address table indexed by that ordinal.
pub(crate) fn parse_exports(
    data: &[u8],
    sections: &[SectionHeader],
    export_dir_rva: u32,
) -> Vec<ExportEntry> {
    let mut entries = Vec::new();

    let Ok(directory_offset) =
        usize::try_from(rva_to_offset(sections, u64::from(export_dir_rva)))
    else {
        return entries;
    };

    // Directory layout: characteristics(4) timestamp(4) version(4) nameRVA(4)
    // ordinalBase(4) numberOfFunctions(4) numberOfNames(4) addressTable(4)
    // namePointerTable(4) ordinalTable(4).
    let mut cursor = directory_offset + 24;
    let Ok(number_of_names) = read_le_at::<u32>(data, &mut cursor) else {
        return entries;
    };
    let Ok(address_table_rva) = read_le_at::<u32>(data, &mut cursor) else {
        return entries;
    };
    let Ok(name_pointer_rva) = read_le_at::<u32>(data, &mut cursor) else {
        return entries;
    };
    let Ok(ordinal_table_rva) = read_le_at::<u32>(data, &mut cursor) else {
        return entries;
    };

    let address_table = rva_to_offset(sections, u64::from(address_table_rva));
    let name_pointers = rva_to_offset(sections, u64::from(name_pointer_rva));
    let ordinal_table = rva_to_offset(sections, u64::from(ordinal_table_rva));

    for index in 0..number_of_names as u64 {
        let Some(mut ordinal_offset) = ordinal_table
            .checked_add(index * 2)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            break;
        };
        let Ok(ordinal) = read_le_at::<u16>(data, &mut ordinal_offset) else {
            // A truncated ordinal table truncates everything behind it.
            break;
        };

        let Some(mut name_ptr_offset) = name_pointers
            .checked_add(index * 4)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            break;
        };
        let Ok(name_rva) = read_le_at::<u32>(data, &mut name_ptr_offset) else {
            break;
        };

        let name = {
            let Ok(name_offset) =
                usize::try_from(rva_to_offset(sections, u64::from(name_rva)))
            else {
                continue;
            };
            let mut parser = Parser::new(data);
            if parser.seek(name_offset).is_err() {
                debug!(index, "skipping export with out-of-range name");
                continue;
            }
            match parser.read_string_ascii() {
                Ok(name) => name,
                Err(_) => {
                    debug!(index, "skipping export with unreadable name");
                    continue;
                }
            }
        };

        let Some(mut address_offset) = address_table
            .checked_add(u64::from(ordinal) * 4)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            continue;
        };
        let Ok(rva) = read_le_at::<u32>(data, &mut address_offset) else {
            debug!(index, ordinal, "skipping export with out-of-range address entry");
            continue;
        };

        entries.push(ExportEntry { name, ordinal, rva });
    }

    entries
}
