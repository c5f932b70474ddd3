//! Parsed PE image model.
//!
//! [`PeImage`] is the entry point of the analysis pipeline: it owns the raw
//! bytes (through a [`Backend`]) and the normalized model parsed out of them -
//! headers, section table, imports, exports and the read-only-data string
//! table. Construction validates the image once; the result is immutable.
//!
//! # Failure semantics
//!
//! Header-level problems are fatal: a bad DOS/PE signature, a bad
//! optional-header magic, a truncated required structure, or a section whose
//! raw data range escapes the image all fail [`PeImage::from_mem`]. Everything
//! behind the headers is tolerated: malformed import descriptors, unreadable
//! names and truncated directory tables are skipped element-wise.
//!
//! # Example
//!
//! ```rust,no_run
//! use pescope::PeImage;
//!
//! let image = PeImage::from_mem(std::fs::read("target.dll")?)?;
//! println!("{}-bit image at 0x{:x}", image.bitness(), image.image_base());
//! for section in image.sections() {
//!     println!("  {} @ rva 0x{:x}", section.name, section.virtual_address);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod headers;
pub mod strings;

mod exports;
mod imports;

pub use exports::ExportEntry;
pub use imports::ImportEntry;
pub use strings::{PeString, StringEncoding, StringTable};

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::{
    file::{
        io::read_le_at,
        pe::headers::{
            parse_coff_header, parse_dos_header, parse_optional_header, parse_section_headers,
            CoffHeader, DataDirectory, DataDirectoryType, DosHeader, OptionalHeader,
            SectionHeader, COFF_HEADER_SIZE, PE_SIGNATURE,
        },
    },
    Backend, Error, Memory, Physical, Result,
};

/// Map of IAT slot VA to `(library, function)`, the annotator's import view.
pub type IatMap = FxHashMap<u64, (String, String)>;

/// A parsed PE image: owned bytes plus the normalized header and table model.
///
/// Constructed once via [`PeImage::from_mem`] / [`PeImage::from_file`] and
/// immutable afterwards. Section data accessors return views into the owned
/// bytes, never copies.
pub struct PeImage {
    data: Box<dyn Backend>,
    bitness: u32,
    dos: DosHeader,
    coff: CoffHeader,
    optional: OptionalHeader,
    data_directories: Vec<DataDirectory>,
    sections: Vec<SectionHeader>,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
    strings: StringTable,
}

/// Translate an RVA to a file offset against a section table.
///
/// Finds the section whose virtual range contains the RVA and rebases it onto
/// the section's raw data. An RVA covered by no section is returned unchanged,
/// treating it as a file offset; old linkers emit images that rely on this.
pub(crate) fn rva_to_offset(sections: &[SectionHeader], rva: u64) -> u64 {
    for section in sections {
        if section.contains_rva(rva) {
            return u64::from(section.pointer_to_raw_data) + (rva - u64::from(section.virtual_address));
        }
    }

    rva
}

impl PeImage {
    /// Parse an image from an owned byte buffer.
    ///
    /// # Errors
    /// Fails on an empty buffer, bad DOS/PE signatures, a bad optional-header
    /// magic, truncated required headers, or a section whose raw range escapes
    /// the buffer.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        Self::from_backend(Box::new(Memory::new(data)))
    }

    /// Parse an image from a file on disk through the memory-mapped backend.
    ///
    /// # Errors
    /// Fails with [`Error::FileError`] when the file cannot be opened, plus
    /// every error [`PeImage::from_mem`] can produce.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_backend(Box::new(Physical::new(path)?))
    }

    fn from_backend(backend: Box<dyn Backend>) -> Result<Self> {
        let data = backend.data();
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let dos = parse_dos_header(data)?;

        let Ok(pe_offset) = usize::try_from(dos.e_lfanew) else {
            return Err(Error::InvalidPeOffset);
        };
        let mut cursor = pe_offset;
        let signature = match read_le_at::<u32>(data, &mut cursor) {
            Ok(signature) => signature,
            Err(_) => return Err(Error::InvalidPeOffset),
        };
        if signature != PE_SIGNATURE {
            return Err(Error::InvalidPeSignature(signature));
        }

        let coff = parse_coff_header(data, cursor)?;

        let optional_offset = cursor + COFF_HEADER_SIZE;
        let (optional, data_directories) = parse_optional_header(data, optional_offset)?;
        let bitness = optional.bitness();

        let section_table_offset =
            optional_offset + usize::from(coff.size_of_optional_header);
        let sections = parse_section_headers(
            data,
            section_table_offset,
            usize::from(coff.number_of_sections),
        )?;

        let import_dir = data_directories
            .get(DataDirectoryType::Import as usize)
            .copied()
            .unwrap_or_default();
        let imports = if import_dir.is_present() {
            imports::parse_imports(
                data,
                &sections,
                optional.image_base,
                bitness == 64,
                import_dir.virtual_address,
            )
        } else {
            Vec::new()
        };

        let export_dir = data_directories
            .get(DataDirectoryType::Export as usize)
            .copied()
            .unwrap_or_default();
        let exports = if export_dir.is_present() {
            exports::parse_exports(data, &sections, export_dir.virtual_address)
        } else {
            Vec::new()
        };

        let strings = match strings::pick_string_section(&sections) {
            Some(section) => {
                let start = section.pointer_to_raw_data as usize;
                let len = section.size_of_raw_data as usize;
                let base_va = optional.image_base + u64::from(section.virtual_address);
                // Raw ranges were validated during section parsing.
                strings::extract_from_section(&data[start..start + len], base_va)
            }
            None => StringTable::default(),
        };

        Ok(PeImage {
            data: backend,
            bitness,
            dos,
            coff,
            optional,
            data_directories,
            sections,
            imports,
            exports,
            strings,
        })
    }

    /// The full raw image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Length of the raw image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image holds no bytes (never true after parsing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Image bitness: 32 for PE32, 64 for PE32+.
    #[must_use]
    pub fn bitness(&self) -> u32 {
        self.bitness
    }

    /// Preferred load address.
    #[must_use]
    pub fn image_base(&self) -> u64 {
        self.optional.image_base
    }

    /// Entry-point VA, or `None` for images without one (resource DLLs).
    #[must_use]
    pub fn entry_point_va(&self) -> Option<u64> {
        if self.optional.address_of_entry_point == 0 {
            return None;
        }
        Some(self.optional.image_base + u64::from(self.optional.address_of_entry_point))
    }

    /// The DOS header.
    #[must_use]
    pub fn dos_header(&self) -> &DosHeader {
        &self.dos
    }

    /// The COFF file header.
    #[must_use]
    pub fn coff_header(&self) -> &CoffHeader {
        &self.coff
    }

    /// The normalized optional header.
    #[must_use]
    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional
    }

    /// The data-directory table in file order.
    #[must_use]
    pub fn data_directories(&self) -> &[DataDirectory] {
        &self.data_directories
    }

    /// Look up one data directory by type.
    #[must_use]
    pub fn data_directory(&self, kind: DataDirectoryType) -> Option<&DataDirectory> {
        self.data_directories.get(kind as usize)
    }

    /// The section table in file order.
    #[must_use]
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Executable sections, in file order.
    pub fn code_sections(&self) -> impl Iterator<Item = &SectionHeader> {
        self.sections.iter().filter(|s| s.is_executable())
    }

    /// The section whose virtual range contains `rva`, if any.
    #[must_use]
    pub fn section_containing_rva(&self, rva: u64) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// Translate an RVA to a file offset.
    ///
    /// An RVA covered by no section is returned unchanged (legacy-image
    /// fallback); the result is therefore not guaranteed to be in bounds.
    #[must_use]
    pub fn rva_to_offset(&self, rva: u64) -> u64 {
        rva_to_offset(&self.sections, rva)
    }

    /// Translate a VA to a file offset via [`PeImage::rva_to_offset`].
    #[must_use]
    pub fn va_to_offset(&self, va: u64) -> u64 {
        self.rva_to_offset(va.saturating_sub(self.optional.image_base))
    }

    /// The raw bytes of a section, as a view into the image.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the section's raw range escapes the
    /// image; cannot happen for sections produced by parsing this image.
    pub fn section_data(&self, section: &SectionHeader) -> Result<&[u8]> {
        self.data.data_slice(
            section.pointer_to_raw_data as usize,
            section.size_of_raw_data as usize,
        )
    }

    /// Parsed import entries in descriptor order.
    #[must_use]
    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    /// Parsed named exports in name-table order.
    #[must_use]
    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Strings extracted from the first read-only data section.
    #[must_use]
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Build the IAT lookup map: slot VA to `(library, function)`.
    ///
    /// This is the import view the [`crate::disassembler::Annotator`]
    /// consumes; read-only and shareable once built.
    #[must_use]
    pub fn iat_map(&self) -> IatMap {
        let mut map = IatMap::default();
        for import in &self.imports {
            for (va, function) in import.iat_vas.iter().zip(import.functions.iter()) {
                map.insert(*va, (import.library.clone(), function.clone()));
            }
        }
        map
    }
}

/// Re-extract the string table of an image.
///
/// [`PeImage::from_mem`] already runs this and stores the result behind
/// [`PeImage::strings`]; the standalone form exists for callers that sweep
/// with different inputs or want an owned table.
#[must_use]
pub fn extract_strings(image: &PeImage) -> StringTable {
    match strings::pick_string_section(image.sections()) {
        Some(section) => {
            let start = section.pointer_to_raw_data as usize;
            let len = section.size_of_raw_data as usize;
            let base_va = image.image_base() + u64::from(section.virtual_address);
            strings::extract_from_section(&image.data()[start..start + len], base_va)
        }
        None => StringTable::default(),
    }
}

impl std::fmt::Debug for PeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeImage")
            .field("bitness", &self.bitness)
            .field("image_base", &self.optional.image_base)
            .field("sections", &self.sections.len())
            .field("imports", &self.imports.len())
            .field("exports", &self.exports.len())
            .field("strings", &self.strings.len())
            .finish_non_exhaustive()
    }
}
