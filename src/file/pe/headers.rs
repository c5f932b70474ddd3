//! Raw PE header structures: DOS, COFF, optional header, data directories and
//! section table.
//!
//! All multi-byte fields are little-endian. 32-bit address fields are widened
//! to `u64` during normalization so downstream code works with one address
//! width regardless of image bitness.

use bitflags::bitflags;

use crate::{file::parser::Parser, Error, Result};

/// `MZ` signature expected at offset 0.
pub const DOS_SIGNATURE: u16 = 0x5A4D;
/// `PE\0\0` signature expected at `e_lfanew`.
pub const PE_SIGNATURE: u32 = 0x0000_4550;
/// Optional-header magic for PE32 images.
pub const PE32_MAGIC: u16 = 0x10B;
/// Optional-header magic for PE32+ images.
pub const PE32PLUS_MAGIC: u16 = 0x20B;

/// Size in bytes of one COFF (file) header.
pub const COFF_HEADER_SIZE: usize = 20;
/// Size in bytes of one section header entry.
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size in bytes of one data-directory entry.
pub const DATA_DIRECTORY_SIZE: usize = 8;
/// Maximum number of data-directory entries an image can carry.
pub const MAX_DATA_DIRECTORIES: usize = 16;

/// The DOS stub header. Only `e_lfanew` is consumed by this crate; the rest of
/// the stub is legacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    /// File offset of the PE signature.
    pub e_lfanew: u32,
}

/// The COFF file header that follows the PE signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    /// Target machine identifier (0x14C = i386, 0x8664 = x64).
    pub machine: u16,
    /// Number of entries in the section table.
    pub number_of_sections: u16,
    /// Link time as a unix timestamp.
    pub time_date_stamp: u32,
    /// Deprecated COFF symbol table file offset.
    pub pointer_to_symbol_table: u32,
    /// Deprecated COFF symbol count.
    pub number_of_symbols: u32,
    /// Size of the optional header that follows this one.
    pub size_of_optional_header: u16,
    /// Image attribute flags (IMAGE_FILE_*).
    pub characteristics: u16,
}

/// IMAGE_FILE_DLL bit of [`CoffHeader::characteristics`].
pub const IMAGE_FILE_DLL: u16 = 0x2000;

impl CoffHeader {
    /// Returns true if the image declares itself a DLL.
    #[must_use]
    pub fn is_dll(&self) -> bool {
        self.characteristics & IMAGE_FILE_DLL != 0
    }
}

/// Normalized optional header carrying the fields the analysis pipeline
/// consumes.
///
/// `image_base` is read at the width the magic dictates and kept as `u64`
/// throughout; downstream consumers that are limited to 53-bit integers must
/// enforce their own ceiling, this crate works with the full width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalHeader {
    /// 0x10B for PE32, 0x20B for PE32+.
    pub magic: u16,
    /// RVA of the entry point, 0 when the image has none.
    pub address_of_entry_point: u32,
    /// Preferred load address, widened from 32 bits for PE32 images.
    pub image_base: u64,
    /// In-memory section alignment.
    pub section_alignment: u32,
    /// On-disk section alignment.
    pub file_alignment: u32,
    /// Total in-memory image span.
    pub size_of_image: u32,
    /// Combined size of all headers, rounded to `file_alignment`.
    pub size_of_headers: u32,
    /// Image checksum as recorded in the header (not validated here).
    pub checksum: u32,
    /// Required subsystem (2 = GUI, 3 = console, ...).
    pub subsystem: u16,
    /// DLL characteristic flags (ASLR, DEP, ...).
    pub dll_characteristics: u16,
    /// Number of data-directory entries that follow the fixed fields.
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    /// Bitness implied by the optional-header magic: 32 or 64.
    #[must_use]
    pub fn bitness(&self) -> u32 {
        if self.magic == PE32PLUS_MAGIC {
            64
        } else {
            32
        }
    }
}

/// One entry of the data-directory table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    /// RVA of the table the entry points at, 0 when absent.
    pub virtual_address: u32,
    /// Size in bytes of the table.
    pub size: u32,
}

impl DataDirectory {
    /// Returns true if the directory is present (non-zero RVA).
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }
}

/// Well-known indices into the data-directory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DataDirectoryType {
    /// Export table.
    Export = 0,
    /// Import descriptor table.
    Import = 1,
    /// Resource tree.
    Resource = 2,
    /// Exception / unwind data.
    Exception = 3,
    /// Authenticode signature.
    Security = 4,
    /// Base relocations.
    BaseRelocation = 5,
    /// Debug directory.
    Debug = 6,
    /// Architecture-specific data.
    Architecture = 7,
    /// Global pointer register value.
    GlobalPtr = 8,
    /// Thread local storage.
    Tls = 9,
    /// Load configuration.
    LoadConfig = 10,
    /// Bound import table.
    BoundImport = 11,
    /// Import address table.
    Iat = 12,
    /// Delay-load import descriptors.
    DelayImport = 13,
    /// CLR runtime header.
    ClrRuntime = 14,
    /// Reserved.
    Reserved = 15,
}

bitflags! {
    /// Section characteristic flags (IMAGE_SCN_*).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        /// Section contains executable code.
        const CNT_CODE = 0x0000_0020;
        /// Section contains initialized data.
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        /// Section contains uninitialized data.
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        /// Section can be discarded after load.
        const MEM_DISCARDABLE = 0x0200_0000;
        /// Section is shareable between processes.
        const MEM_SHARED = 0x1000_0000;
        /// Section is executable.
        const MEM_EXECUTE = 0x2000_0000;
        /// Section is readable.
        const MEM_READ = 0x4000_0000;
        /// Section is writable.
        const MEM_WRITE = 0x8000_0000;
    }
}

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section name, at most 8 characters, trailing nulls stripped.
    pub name: String,
    /// In-memory span of the section.
    pub virtual_size: u32,
    /// RVA the section is mapped at.
    pub virtual_address: u32,
    /// Number of raw bytes stored in the file.
    pub size_of_raw_data: u32,
    /// File offset of the raw bytes.
    pub pointer_to_raw_data: u32,
    /// IMAGE_SCN_* flags.
    pub characteristics: SectionCharacteristics,
}

impl SectionHeader {
    /// Returns true if the section is mapped executable or marked as code.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.characteristics
            .intersects(SectionCharacteristics::MEM_EXECUTE | SectionCharacteristics::CNT_CODE)
    }

    /// Returns true if the section is readable.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.characteristics
            .contains(SectionCharacteristics::MEM_READ)
    }

    /// Returns true if the section is writable.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.characteristics
            .contains(SectionCharacteristics::MEM_WRITE)
    }

    /// Returns true if the RVA falls inside `[virtual_address, virtual_address + virtual_size)`.
    #[must_use]
    pub fn contains_rva(&self, rva: u64) -> bool {
        let start = u64::from(self.virtual_address);
        let end = start + u64::from(self.virtual_size);
        rva >= start && rva < end
    }
}

/// Parse the DOS header, validating the `MZ` signature.
pub(crate) fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    let mut parser = Parser::new(data);

    let magic = parser.read_le::<u16>()?;
    if magic != DOS_SIGNATURE {
        return Err(Error::InvalidDosSignature(magic));
    }

    parser.seek(0x3C)?;
    let e_lfanew = parser.read_le::<u32>()?;

    Ok(DosHeader { e_lfanew })
}

/// Parse the COFF header at `offset` (just past the PE signature).
pub(crate) fn parse_coff_header(data: &[u8], offset: usize) -> Result<CoffHeader> {
    let mut parser = Parser::new(data);
    parser.seek(offset)?;

    Ok(CoffHeader {
        machine: parser.read_le::<u16>()?,
        number_of_sections: parser.read_le::<u16>()?,
        time_date_stamp: parser.read_le::<u32>()?,
        pointer_to_symbol_table: parser.read_le::<u32>()?,
        number_of_symbols: parser.read_le::<u32>()?,
        size_of_optional_header: parser.read_le::<u16>()?,
        characteristics: parser.read_le::<u16>()?,
    })
}

/// Parse and normalize the optional header at `offset`, then the data-directory
/// table that follows it.
///
/// At most `min(number_of_rva_and_sizes, 16)` directory entries are read; a
/// table truncated by the end of the image yields the entries that fit.
pub(crate) fn parse_optional_header(
    data: &[u8],
    offset: usize,
) -> Result<(OptionalHeader, Vec<DataDirectory>)> {
    let mut parser = Parser::new(data);
    parser.seek(offset)?;

    let magic = parser.read_le::<u16>()?;
    let is_pe32plus = match magic {
        PE32_MAGIC => false,
        PE32PLUS_MAGIC => true,
        other => return Err(Error::InvalidOptionalMagic(other)),
    };

    let _linker_versions = parser.read_le::<u16>()?;
    let _size_of_code = parser.read_le::<u32>()?;
    let _size_of_initialized_data = parser.read_le::<u32>()?;
    let _size_of_uninitialized_data = parser.read_le::<u32>()?;
    let address_of_entry_point = parser.read_le::<u32>()?;
    let _base_of_code = parser.read_le::<u32>()?;

    // PE32 has base_of_data here; PE32+ folds it into a 64-bit image base.
    let image_base = if is_pe32plus {
        parser.read_le::<u64>()?
    } else {
        let _base_of_data = parser.read_le::<u32>()?;
        u64::from(parser.read_le::<u32>()?)
    };

    let section_alignment = parser.read_le::<u32>()?;
    let file_alignment = parser.read_le::<u32>()?;
    let _os_versions = parser.read_le::<u32>()?;
    let _image_versions = parser.read_le::<u32>()?;
    let _subsystem_versions = parser.read_le::<u32>()?;
    let _win32_version_value = parser.read_le::<u32>()?;
    let size_of_image = parser.read_le::<u32>()?;
    let size_of_headers = parser.read_le::<u32>()?;
    let checksum = parser.read_le::<u32>()?;
    let subsystem = parser.read_le::<u16>()?;
    let dll_characteristics = parser.read_le::<u16>()?;
    let _stack_reserve = parser.read_le_dyn(is_pe32plus)?;
    let _stack_commit = parser.read_le_dyn(is_pe32plus)?;
    let _heap_reserve = parser.read_le_dyn(is_pe32plus)?;
    let _heap_commit = parser.read_le_dyn(is_pe32plus)?;
    let _loader_flags = parser.read_le::<u32>()?;
    let number_of_rva_and_sizes = parser.read_le::<u32>()?;

    let header = OptionalHeader {
        magic,
        address_of_entry_point,
        image_base,
        section_alignment,
        file_alignment,
        size_of_image,
        size_of_headers,
        checksum,
        subsystem,
        dll_characteristics,
        number_of_rva_and_sizes,
    };

    let count = (number_of_rva_and_sizes as usize).min(MAX_DATA_DIRECTORIES);
    let mut directories = Vec::with_capacity(count);
    for _ in 0..count {
        let Ok(virtual_address) = parser.read_le::<u32>() else {
            break;
        };
        let Ok(size) = parser.read_le::<u32>() else {
            break;
        };
        directories.push(DataDirectory {
            virtual_address,
            size,
        });
    }

    Ok((header, directories))
}

/// Parse `count` section headers starting at `offset`.
///
/// Hard-fails if the table is truncated or if any section's raw data range
/// escapes the image.
pub(crate) fn parse_section_headers(
    data: &[u8],
    offset: usize,
    count: usize,
) -> Result<Vec<SectionHeader>> {
    let mut parser = Parser::new(data);
    let mut sections = Vec::with_capacity(count);

    for index in 0..count {
        parser.seek(offset + index * SECTION_HEADER_SIZE)?;

        let mut name_bytes = [0_u8; 8];
        for byte in &mut name_bytes {
            *byte = parser.read_le::<u8>()?;
        }
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        let virtual_size = parser.read_le::<u32>()?;
        let virtual_address = parser.read_le::<u32>()?;
        let size_of_raw_data = parser.read_le::<u32>()?;
        let pointer_to_raw_data = parser.read_le::<u32>()?;
        let _pointer_to_relocations = parser.read_le::<u32>()?;
        let _pointer_to_linenumbers = parser.read_le::<u32>()?;
        let _relocation_counts = parser.read_le::<u32>()?;
        let characteristics =
            SectionCharacteristics::from_bits_retain(parser.read_le::<u32>()?);

        let raw_end = u64::from(pointer_to_raw_data) + u64::from(size_of_raw_data);
        if raw_end > data.len() as u64 {
            return Err(malformed_error!(
                "Section '{}' raw data [{:#x}, {:#x}) escapes the image ({} bytes)",
                name,
                pointer_to_raw_data,
                raw_end,
                data.len()
            ));
        }

        sections.push(SectionHeader {
            name,
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            characteristics,
        });
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_header_rejects_bad_signature() {
        let mut data = vec![0_u8; 64];
        data[0] = b'Z';
        data[1] = b'M';
        let err = parse_dos_header(&data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid DOS signature: 0x4d5a");
    }

    #[test]
    fn dos_header_reads_lfanew() {
        let mut data = vec![0_u8; 64];
        data[0] = b'M';
        data[1] = b'Z';
        data[0x3C] = 0x80;
        let header = parse_dos_header(&data).unwrap();
        assert_eq!(header.e_lfanew, 0x80);
    }

    #[test]
    fn optional_header_rejects_bad_magic() {
        let data = [0x07_u8, 0x01];
        let err = parse_optional_header(&data, 0).unwrap_err();
        assert_eq!(err.to_string(), "Invalid optional header magic: 0x0107");
    }

    #[test]
    fn section_flags() {
        let text = SectionHeader {
            name: ".text".to_string(),
            virtual_size: 0x1000,
            virtual_address: 0x1000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x400,
            characteristics: SectionCharacteristics::CNT_CODE
                | SectionCharacteristics::MEM_EXECUTE
                | SectionCharacteristics::MEM_READ,
        };

        assert!(text.is_executable());
        assert!(text.is_readable());
        assert!(!text.is_writable());
        assert!(text.contains_rva(0x1000));
        assert!(text.contains_rva(0x1FFF));
        assert!(!text.contains_rva(0x2000));
    }

    #[test]
    fn section_raw_range_is_validated() {
        // One section header whose raw data extends past the buffer.
        let mut data = vec![0_u8; SECTION_HEADER_SIZE];
        data[..5].copy_from_slice(b".text");
        data[16..20].copy_from_slice(&0x1000_u32.to_le_bytes()); // size_of_raw_data
        data[20..24].copy_from_slice(&0x40_u32.to_le_bytes()); // pointer_to_raw_data

        let err = parse_section_headers(&data, 0, 1).unwrap_err();
        assert!(matches!(err, crate::Error::Malformed { .. }));
    }
}
