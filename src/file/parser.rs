//! Cursor-based reader over raw image bytes.
//!
//! The [`Parser`] type provides methods for reading primitive values, seeking,
//! and pulling null-terminated ASCII strings out of a byte stream. It is used
//! internally by the PE header, import and export walkers, but is also
//! available for callers who need to decode custom structures out of an image.
//!
//! # Example
//!
//! ```rust
//! use pescope::Parser;
//! let data = [0x01, 0x02, 0x03, 0x04];
//! let mut parser = Parser::new(&data);
//! let value = parser.read_le::<u16>()?;
//! assert_eq!(value, 0x0201);
//! # Ok::<(), pescope::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, read_le_at_dyn, LeRead},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
///
/// `Parser` maintains an internal position and validates every read against
/// the underlying data length, so malformed or truncated images surface as
/// [`OutOfBounds`] instead of panics. All reads are little-endian; PE has no
/// big-endian structures.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` from a byte slice
    ///
    /// ## Arguments
    /// * 'data' - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the parser has no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if there is more data to parse
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move current position to N
    ///
    /// ## Arguments
    /// * 'pos' - The position to move the cursor to
    ///
    /// # Errors
    /// Returns [`OutOfBounds`] if position is beyond the data length
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Get the current position of the parser
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Peek a single byte without moving
    ///
    /// # Errors
    /// Returns [`OutOfBounds`] if position is at or beyond the data length
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(OutOfBounds);
        }
        Ok(self.data[self.position])
    }

    /// Read a type T from the current position in little-endian, and advance accordingly
    ///
    /// # Errors
    /// Returns [`OutOfBounds`] if reading would exceed the data length
    pub fn read_le<T: LeRead>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a 4-byte (`is_wide == false`) or 8-byte value, widened to `u64`
    ///
    /// # Errors
    /// Returns [`OutOfBounds`] if reading would exceed the data length
    pub fn read_le_dyn(&mut self, is_wide: bool) -> Result<u64> {
        read_le_at_dyn(self.data, &mut self.position, is_wide)
    }

    /// Reads a null-terminated ASCII string, advancing past the terminator
    ///
    /// Non-UTF-8 content fails; PE name strings are defined as ASCII.
    ///
    /// # Errors
    /// Returns [`OutOfBounds`] if no terminator exists before the end of data,
    /// or [`crate::Error::Malformed`] for invalid string bytes
    pub fn read_string_ascii(&mut self) -> Result<String> {
        let start = self.position;
        let mut end = start;

        while end < self.data.len() && self.data[end] != 0 {
            end += 1;
        }

        if end >= self.data.len() {
            return Err(OutOfBounds);
        }

        let string_data = &self.data[start..end];
        self.position = end + 1; // Skip null terminator

        String::from_utf8(string_data.to_vec()).map_err(|_| {
            malformed_error!("Invalid string - {} - {} - {:?}", start, end, string_data)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u32>().unwrap(), 0x0403_0201);
        assert_eq!(parser.pos(), 4);

        parser.seek(6).unwrap();
        assert_eq!(parser.read_le::<u16>().unwrap(), 0x0807);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn read_dyn_widths() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le_dyn(false).unwrap(), 0x0403_0201);
        parser.seek(0).unwrap();
        assert_eq!(parser.read_le_dyn(true).unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn parse_string() {
        let test_cases: Vec<(Vec<u8>, &str)> = vec![
            (vec![0x61, 0x62, 0x63, 0x00], "abc"),
            (vec![0x00], ""),
            (vec![0x6b, 0x65, 0x72, 0x6e, 0x65, 0x6c, 0x33, 0x32, 0x00], "kernel32"),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            let result = parser.read_string_ascii().unwrap();
            assert_eq!(result, expected);
        }
    }

    #[test]
    fn unterminated_string() {
        let data = [0x61, 0x62, 0x63];
        let mut parser = Parser::new(&data);
        assert!(matches!(parser.read_string_ascii(), Err(OutOfBounds)));
    }

    #[test]
    fn seek_out_of_bounds() {
        let data = [0x00, 0x01];
        let mut parser = Parser::new(&data);
        assert!(parser.seek(2).is_err());
        assert!(parser.seek(1).is_ok());
    }

    #[test]
    fn error_handling() {
        let mut parser = Parser::new(&[0x08]);
        assert!(matches!(parser.read_le::<u8>(), Ok(8)));
        assert!(matches!(parser.read_le::<u8>(), Err(OutOfBounds)));
    }
}
