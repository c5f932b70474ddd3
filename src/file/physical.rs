use super::Backend;
use crate::{Error, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// Image bytes mapped read-only from a file on disk.
///
/// This is the backend behind [`crate::PeImage::from_file`]: the file is
/// memory-mapped rather than read into a buffer, so a large binary costs
/// address space instead of RAM and pages in on demand as the analysis walks
/// it. The mapping is never written through. Range checking comes from the
/// [`Backend`] trait, this type only produces bytes.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path` read-only.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] when the file cannot be opened and a
    /// descriptive [`Error::Error`] when the mapping itself fails (zero-length
    /// files on some platforms, exhausted address space).
    pub fn new(path: &Path) -> Result<Physical> {
        let file = fs::File::open(path)?;
        let data = unsafe { Mmap::map(&file) }
            .map_err(|error| Error::Error(format!("Failed to map {}: {error}", path.display())))?;

        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_a_file_and_slices_it() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"MZ\x90\x00\x03").unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();

        assert_eq!(physical.len(), 5);
        assert_eq!(physical.data_slice(0, 2).unwrap(), b"MZ");
        assert_eq!(physical.data_slice(2, 3).unwrap(), &[0x90, 0x00, 0x03]);

        // The same validation as the in-memory backend.
        assert!(physical.data_slice(4, 2).is_err());
        assert!(physical.data_slice(usize::MAX, 1).is_err());
    }

    #[test]
    fn missing_file_reports_the_io_error() {
        let result = Physical::new(Path::new("/nonexistent/path/to/image.dll"));
        match result.unwrap_err() {
            Error::FileError(io_error) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected FileError, got {other}"),
        }
    }
}
