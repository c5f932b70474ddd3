//! Low-level byte order and safe reading utilities for PE parsing.
//!
//! This module provides the [`LeRead`] trait for safe, little-endian reading of
//! primitive types from byte slices. It is used throughout the file module to
//! ensure correct parsing of binary data structures; PE images are
//! little-endian throughout, so no big-endian counterpart exists.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type specific safe readers
///
/// This trait abstracts over reading primitive types from byte slices in a safe
/// and bounds-checked way. It is implemented for all integer widths used in PE
/// parsing.
pub trait LeRead: Sized {
    #[allow(missing_docs)]
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

// Implement LeRead support for u64
impl LeRead for u64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u64::from_le_bytes(bytes)
    }
}

// Implement LeRead support for i64
impl LeRead for i64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i64::from_le_bytes(bytes)
    }
}

// Implement LeRead support for u32
impl LeRead for u32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u32::from_le_bytes(bytes)
    }
}

// Implement LeRead support for i32
impl LeRead for i32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i32::from_le_bytes(bytes)
    }
}

// Implement LeRead support for u16
impl LeRead for u16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u16::from_le_bytes(bytes)
    }
}

// Implement LeRead support for i16
impl LeRead for i16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i16::from_le_bytes(bytes)
    }
}

// Implement LeRead support for u8
impl LeRead for u8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u8::from_le_bytes(bytes)
    }
}

// Implement LeRead support for i8
impl LeRead for i8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i8::from_le_bytes(bytes)
    }
}

/// Generic method to safely read T in little-endian from a data stream
///
/// ## Arguments
/// * 'data' - The data buffer / stream to read from
///
/// # Errors
/// Returns [`OutOfBounds`] if reading would exceed the data length
pub fn read_le<T: LeRead>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Generic method to safely read T from an offset and in little-endian from a data stream
///
/// ## Arguments
/// * 'data'    - The data buffer / stream to read from
/// * 'offset'  - An offset to read from, will be advanced by the amount of bytes read
///
/// # Errors
/// Returns [`OutOfBounds`] if reading would exceed the data length
pub fn read_le_at<T: LeRead>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };

    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Safely read a 4-byte (PE32) or 8-byte (PE32+) value from an offset in little-endian.
///
/// Import thunks and a handful of optional-header fields change width with the
/// image bitness; this reads either width into a `u64`.
///
/// ## Arguments
/// * 'data'      - The data buffer / stream to read from
/// * 'offset'    - An offset to read from, will be advanced by the amount of bytes read
/// * `is_wide`   - Indicates if 8 or 4 bytes should be read
///
/// # Errors
/// Returns [`OutOfBounds`] if reading would exceed the data length
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_wide: bool) -> Result<u64> {
    let res = if is_wide {
        read_le_at::<u64>(data, offset)?
    } else {
        u64::from(read_le_at::<u32>(data, offset)?)
    };

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u8() {
        let result = read_le::<u8>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x01);
    }

    #[test]
    fn read_le_u16() {
        let result = read_le::<u16>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0201);
    }

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_u64() {
        let result = read_le::<u64>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0807_0605_0403_0201);
    }

    #[test]
    fn read_le_i32() {
        let result = read_le::<i32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_from() {
        let mut offset = 2_usize;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0403);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_le_dyn() {
        let mut offset = 0;

        let res_1 = read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap();
        assert_eq!(res_1, 0x0807_0605_0403_0201);

        offset = 0;
        let res_2 = read_le_at_dyn(&TEST_BUFFER, &mut offset, false).unwrap();
        assert_eq!(res_2, 0x0403_0201);
    }

    #[test]
    fn errors() {
        let buffer = [0xFF, 0xFF, 0xFF, 0xFF];

        let result = read_le::<u64>(&buffer);
        assert!(matches!(result, Err(OutOfBounds)));

        let mut offset = usize::MAX;
        let result = read_le_at::<u32>(&buffer, &mut offset);
        assert!(matches!(result, Err(OutOfBounds)));
    }
}
