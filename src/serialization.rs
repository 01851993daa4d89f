//! Bitcoin wire encoding: little-endian integers, compact sizes, byte strings
//!
//! Readers never allocate more than the bytes that remain, so a hostile
//! length prefix cannot trigger an oversized allocation.

use crate::error::{ConsensusError, Result};
use crate::types::HashDigest;

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, size: usize) -> Result<&'a [u8]> {
        if size > self.remaining() {
            return Err(ConsensusError::InvalidEncoding);
        }
        let bytes = &self.data[self.position..self.position + size];
        self.position += size;
        Ok(bytes)
    }

    pub fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.position..];
        self.position = self.data.len();
        bytes
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<HashDigest> {
        self.read_array()
    }

    /// Read a compact size, rejecting non-canonical encodings.
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let value = match self.read_u8()? {
            0xff => {
                let value = self.read_u64()?;
                if value <= 0xffff_ffff {
                    return Err(ConsensusError::InvalidEncoding);
                }
                value
            }
            0xfe => {
                let value = self.read_u32()? as u64;
                if value <= 0xffff {
                    return Err(ConsensusError::InvalidEncoding);
                }
                value
            }
            0xfd => {
                let value = self.read_u16()? as u64;
                if value < 0xfd {
                    return Err(ConsensusError::InvalidEncoding);
                }
                value
            }
            byte => byte as u64,
        };
        Ok(value)
    }

    /// Read a compact size that counts items or bytes still to come.
    ///
    /// No item is smaller than one byte, so a count beyond the remaining
    /// bytes is malformed.
    pub fn read_size(&mut self) -> Result<usize> {
        let size = self.read_compact_size()?;
        if size > self.remaining() as u64 {
            return Err(ConsensusError::InvalidEncoding);
        }
        Ok(size as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let size = self.read_size()?;
        self.read_bytes(size)
    }
}

/// Append-only byte sink.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_hash(&mut self, hash: &HashDigest) {
        self.write_bytes(hash);
    }

    pub fn write_compact_size(&mut self, value: u64) {
        match value {
            0..=0xfc => self.write_u8(value as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd);
                self.write_u16(value as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe);
                self.write_u32(value as u32);
            }
            _ => {
                self.write_u8(0xff);
                self.write_u64(value);
            }
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Encoded length of a compact size
pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}
