//! Binary encoding and decoding utilities
//!
//! Little-endian primitives shared by the class-unit container, the constant
//! pool and method bodies.

use thiserror::Error;

/// Errors that can occur while decoding binary data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of the byte stream
    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Unknown tag byte for a tagged structure
    #[error("Invalid {what} tag {tag} at offset {offset}")]
    InvalidTag {
        /// Structure being decoded
        what: &'static str,
        /// Offending tag
        tag: u8,
        /// Offset of the tag
        offset: usize,
    },

    /// Bytes left over after a complete structure
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// Writer for little-endian binary data
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit float
    pub fn emit_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Emit a length-prefixed UTF-8 string (u16 length)
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u16(value.len() as u16);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit an optional string as a presence byte followed by the string
    pub fn emit_opt_string(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.emit_u8(1);
                self.emit_string(s);
            }
            None => self.emit_u8(0),
        }
    }

    /// Overwrite a previously emitted u32
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Reader for little-endian binary data
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_le_bytes)
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take().map(u32::from_le_bytes)
    }

    /// Read a 32-bit signed integer
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take().map(i32::from_le_bytes)
    }

    /// Read a 64-bit signed integer
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.take().map(i64::from_le_bytes)
    }

    /// Read a 32-bit float
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.take().map(f32::from_le_bytes)
    }

    /// Read a 64-bit float
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.take().map(f64::from_le_bytes)
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = self.buffer[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read a length-prefixed UTF-8 string (u16 length)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read an optional string written by [`BytecodeWriter::emit_opt_string`]
    pub fn read_opt_string(&mut self) -> Result<Option<String>, DecodeError> {
        match self.read_u8()? {
            0 => Ok(None),
            _ => self.read_string().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_primitives() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);
        writer.emit_i32(-42);
        writer.emit_i64(-7_000_000_000);
        writer.emit_f64(3.14159);

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xABCD_EF01);
        assert_eq!(reader.read_i32().unwrap(), -42);
        assert_eq!(reader.read_i64().unwrap(), -7_000_000_000);
        assert!((reader.read_f64().unwrap() - 3.14159).abs() < 0.00001);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01, 0x02];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16(), Err(DecodeError::UnexpectedEnd(1)));
    }

    #[test]
    fn test_reader_strings() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("hello");
        writer.emit_opt_string(None);
        writer.emit_opt_string(Some("raya/lang/Object"));

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.read_opt_string().unwrap(), None);
        assert_eq!(
            reader.read_opt_string().unwrap().as_deref(),
            Some("raya/lang/Object")
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = vec![2, 0, 0xFF, 0xFE];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_string(), Err(DecodeError::InvalidUtf8(0)));
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(0);
        writer.emit_u8(9);
        writer.patch_u32(0, 0xDEAD_BEEF);
        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
    }
}
