use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Fatal header errors ([`Error::InvalidDosSignature`], [`Error::InvalidPeSignature`],
/// [`Error::InvalidOptionalMagic`], [`Error::InvalidPeOffset`], [`Error::Malformed`],
/// [`Error::OutOfBounds`]) bubble out of [`crate::PeImage::from_mem`]; malformed import,
/// export and string-table elements are skipped during parsing and never surface here.
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::{Error, PeImage};
///
/// match PeImage::from_mem(std::fs::read("target.dll")?) {
///     Ok(image) => println!("parsed {} sections", image.sections().len()),
///     Err(Error::InvalidDosSignature(sig)) => eprintln!("not a PE file: 0x{sig:04x}"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed image: {message} ({file}:{line})");
///     }
///     Err(e) => eprintln!("error: {e}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The DOS signature at offset 0 was not `MZ` (0x5A4D).
    ///
    /// The associated value is the 16-bit value that was found instead.
    #[error("Invalid DOS signature: 0x{0:04x}")]
    InvalidDosSignature(u16),

    /// The PE signature at `e_lfanew` was not `PE\0\0` (0x00004550).
    ///
    /// The associated value is the 32-bit value that was found instead.
    #[error("Invalid PE signature: 0x{0:08x}")]
    InvalidPeSignature(u32),

    /// The optional-header magic was neither 0x10B (PE32) nor 0x20B (PE32+).
    #[error("Invalid optional header magic: 0x{0:04x}")]
    InvalidOptionalMagic(u16),

    /// `e_lfanew` points outside the image, or the NT headers do not fit behind it.
    #[error("Invalid PE offset")]
    InvalidPeOffset,

    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    ///
    /// This error occurs when trying to read data beyond the end of the image.
    /// It's a safety check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur when loading an image through
    /// the physical (memory-mapped) backend.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
