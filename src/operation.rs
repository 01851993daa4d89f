//! A single script operation: an opcode plus, for pushes, its data

use crate::constants::MAX_PUSH_DATA_SIZE;
use crate::error::Result;
use crate::number;
use crate::opcode::{self, *};
use crate::serialization::{compact_size_len, Reader, Writer};
use crate::types::DataChunk;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    code: u8,
    data: DataChunk,
    valid: bool,
}

impl Operation {
    /// Non-push operation.
    pub fn new(code: u8) -> Self {
        Operation {
            code,
            data: Vec::new(),
            valid: true,
        }
    }

    /// Push operation for `data`. A minimal push uses the dedicated number
    /// opcodes where they exist; otherwise the opcode follows from size.
    pub fn from_data(data: DataChunk, minimal: bool) -> Self {
        let code = if minimal {
            opcode::minimal_opcode_from_data(&data)
        } else {
            opcode::opcode_from_size(data.len())
        };

        // Number opcodes carry their value in the code itself.
        let data = if is_numeric(code) { Vec::new() } else { data };

        Operation {
            code,
            data,
            valid: true,
        }
    }

    /// Explicit opcode and data, not checked for consistency.
    pub fn from_parts(code: u8, data: DataChunk) -> Self {
        Operation {
            code,
            data,
            valid: true,
        }
    }

    fn invalid(code: u8) -> Self {
        Operation {
            code,
            data: Vec::new(),
            valid: false,
        }
    }

    /// Parse one operation. A push whose length prefix or data runs past
    /// the end yields an invalid operation; the reader is then exhausted.
    pub fn read(reader: &mut Reader<'_>) -> Result<Operation> {
        let code = reader.read_u8()?;

        let size = match code {
            OP_PUSHDATA1 => reader.read_u8().map(|size| size as usize),
            OP_PUSHDATA2 => reader.read_u16().map(|size| size as usize),
            OP_PUSHDATA4 => reader.read_u32().map(|size| size as usize),
            code if code <= OP_PUSHBYTES_75 => Ok(code as usize),
            _ => return Ok(Operation::new(code)),
        };

        let data = size.and_then(|size| reader.read_bytes(size));
        match data {
            Ok(data) => Ok(Operation::from_parts(code, data.to_vec())),
            Err(_) => {
                reader.read_remaining();
                Ok(Operation::invalid(code))
            }
        }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_data(&self) -> DataChunk {
        let mut writer = Writer::with_capacity(self.serialized_size());
        self.write(&mut writer);
        writer.into_inner()
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.code);
        match self.code {
            OP_PUSHDATA1 => writer.write_u8(self.data.len() as u8),
            OP_PUSHDATA2 => writer.write_u16(self.data.len() as u16),
            OP_PUSHDATA4 => writer.write_u32(self.data.len() as u32),
            _ => {}
        }
        writer.write_bytes(&self.data);
    }

    pub fn serialized_size(&self) -> usize {
        let prefix = match self.code {
            OP_PUSHDATA1 => 1,
            OP_PUSHDATA2 => 2,
            OP_PUSHDATA4 => 4,
            _ => 0,
        };
        1 + prefix + self.data.len()
    }

    /// Carries data bytes.
    pub fn is_payload(&self) -> bool {
        opcode::is_payload(self.code)
    }

    pub fn is_push(&self) -> bool {
        opcode::is_push(self.code)
    }

    pub fn is_relaxed_push(&self) -> bool {
        opcode::is_relaxed_push(self.code)
    }

    pub fn is_counted(&self) -> bool {
        opcode::is_counted(self.code)
    }

    pub fn is_positive(&self) -> bool {
        opcode::is_positive(self.code)
    }

    pub fn is_disabled(&self) -> bool {
        opcode::is_disabled(self.code)
    }

    pub fn is_conditional(&self) -> bool {
        opcode::is_conditional(self.code)
    }

    pub fn is_oversized(&self) -> bool {
        self.data.len() > MAX_PUSH_DATA_SIZE
    }

    /// The push uses the shortest available encoding for its data.
    pub fn is_minimal_push(&self) -> bool {
        self.code == opcode::minimal_opcode_from_data(&self.data)
    }

    /// Parsed completely and, for pushes, the declared length matches the
    /// data carried.
    pub fn is_valid(&self) -> bool {
        if !self.valid {
            return false;
        }

        let size = self.data.len();
        match self.code {
            OP_PUSHDATA1 => size <= u8::MAX as usize,
            OP_PUSHDATA2 => size <= u16::MAX as usize,
            OP_PUSHDATA4 => size <= u32::MAX as usize,
            code if code <= OP_PUSHBYTES_75 => size == code as usize,
            _ => size == 0,
        }
    }

    /// Mnemonic token: pushes show their data as `[hex]`, prefixed with the
    /// length width when the opcode is not the size-based default.
    pub fn to_string(&self, active_forks: u32) -> String {
        if !self.valid {
            return "<invalid>".to_string();
        }

        if !self.is_payload() || (self.code == OP_0 && self.data.is_empty()) {
            return opcode::to_string(self.code, active_forks);
        }

        let data = hex::encode(&self.data);
        if self.code == opcode::opcode_from_size(self.data.len()) {
            return format!("[{}]", data);
        }

        let width = match self.code {
            OP_PUSHDATA1 => "1",
            OP_PUSHDATA2 => "2",
            OP_PUSHDATA4 => "4",
            _ => return format!("[{}]", data),
        };
        format!("[{}.{}]", width, data)
    }

    /// Parse one mnemonic token produced by `to_string`. Also accepts
    /// decimal numbers (minimal push) and `'text'` (push of the bytes).
    pub fn from_string(token: &str) -> Option<Operation> {
        if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let (code, hex) = match inner.split_once('.') {
                Some(("1", hex)) => (Some(OP_PUSHDATA1), hex),
                Some(("2", hex)) => (Some(OP_PUSHDATA2), hex),
                Some(("4", hex)) => (Some(OP_PUSHDATA4), hex),
                Some(_) => return None,
                None => (None, inner),
            };

            let data = hex::decode(hex).ok()?;
            let code = code.unwrap_or_else(|| opcode::opcode_from_size(data.len()));
            let operation = Operation::from_parts(code, data);
            return operation.is_valid().then_some(operation);
        }

        if let Some(text) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
            return Some(Operation::from_data(text.as_bytes().to_vec(), false));
        }

        if let Some(code) = opcode::from_string(token) {
            return Some(Operation::new(code));
        }

        let value = token.parse::<i64>().ok()?;
        Some(Operation::from_data(number::encode(value), true))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string(0))
    }
}

/// Serialized size of a script with an optional compact-size prefix.
pub(crate) fn prefixed_size(content: usize, prefix: bool) -> usize {
    if prefix {
        compact_size_len(content as u64) + content
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_minimal() {
        let op = Operation::from_data(vec![], true);
        assert_eq!(op.code(), OP_0);
        assert!(op.data().is_empty());

        let op = Operation::from_data(vec![5], true);
        assert_eq!(op.code(), 0x55);
        assert!(op.data().is_empty());

        let op = Operation::from_data(vec![0x81], true);
        assert_eq!(op.code(), OP_1NEGATE);

        let op = Operation::from_data(vec![5], false);
        assert_eq!(op.code(), OP_PUSHBYTES_1);
        assert_eq!(op.data(), &[5]);
    }

    #[test]
    fn test_from_data_large() {
        let op = Operation::from_data(vec![0xaa; 300], false);
        assert_eq!(op.code(), OP_PUSHDATA2);
        assert_eq!(op.serialized_size(), 1 + 2 + 300);
        assert!(op.is_valid());
        assert!(!op.is_oversized());

        let op = Operation::from_data(vec![0xaa; 521], false);
        assert!(op.is_oversized());
    }

    #[test]
    fn test_read_truncated_push() {
        let bytes = [OP_PUSHBYTES_20, 0x01, 0x02];
        let mut reader = Reader::new(&bytes);
        let op = Operation::read(&mut reader).unwrap();
        assert!(!op.is_valid());
        assert!(op.data().is_empty());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_read_pushdata1() {
        let bytes = [OP_PUSHDATA1, 0x02, 0xaa, 0xbb, OP_DUP];
        let mut reader = Reader::new(&bytes);
        let op = Operation::read(&mut reader).unwrap();
        assert!(op.is_valid());
        assert_eq!(op.data(), &[0xaa, 0xbb]);
        assert!(!op.is_minimal_push());
        assert_eq!(Operation::read(&mut reader).unwrap(), Operation::new(OP_DUP));
    }

    #[test]
    fn test_inconsistent_parts_are_invalid() {
        let op = Operation::from_parts(OP_PUSHBYTES_20, vec![0u8; 19]);
        assert!(!op.is_valid());
        assert_eq!(op.serialized_size(), 20);

        let op = Operation::from_parts(OP_DUP, vec![1]);
        assert!(!op.is_valid());
    }

    #[test]
    fn test_mnemonic_tokens() {
        assert_eq!(Operation::new(OP_DUP).to_string(0), "dup");
        assert_eq!(Operation::from_data(vec![0xab, 0xcd], false).to_string(0), "[abcd]");
        assert_eq!(Operation::from_parts(OP_PUSHDATA1, vec![0xab]).to_string(0), "[1.ab]");
        assert_eq!(Operation::new(OP_0).to_string(0), "zero");
    }

    #[test]
    fn test_mnemonic_parse() {
        assert_eq!(Operation::from_string("dup"), Some(Operation::new(OP_DUP)));
        assert_eq!(
            Operation::from_string("[abcd]"),
            Some(Operation::from_data(vec![0xab, 0xcd], false))
        );
        assert_eq!(
            Operation::from_string("[1.ab]"),
            Some(Operation::from_parts(OP_PUSHDATA1, vec![0xab]))
        );
        assert_eq!(Operation::from_string("[3.ab]"), None);
        assert_eq!(Operation::from_string("[zz]"), None);
        assert_eq!(
            Operation::from_string("'hi'"),
            Some(Operation::from_data(b"hi".to_vec(), false))
        );
        assert_eq!(Operation::from_string("1000").unwrap().data(), &[0xe8, 0x03]);
        assert_eq!(Operation::from_string("bogus"), None);
    }
}
