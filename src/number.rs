//! Script numbers: little-endian sign-magnitude byte strings

use crate::constants::MAX_NUMBER_SIZE;
use crate::error::{ConsensusError, Result};
use crate::types::DataChunk;

/// Encode an integer in minimal script-number form (zero is empty).
pub fn encode(value: i64) -> DataChunk {
    if value == 0 {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut magnitude = value.unsigned_abs();

    while magnitude > 0 {
        result.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }

    if let Some(last) = result.last_mut() {
        if *last & 0x80 != 0 {
            result.push(if value < 0 { 0x80 } else { 0x00 });
        } else if value < 0 {
            *last |= 0x80;
        }
    }

    result
}

/// Decode a script number no longer than `max_size` bytes.
///
/// Non-minimal encodings are accepted, as in legacy evaluation.
pub fn decode(bytes: &[u8], max_size: usize) -> Result<i64> {
    if bytes.len() > max_size {
        return Err(ConsensusError::InvalidNumber);
    }

    if bytes.is_empty() {
        return Ok(0);
    }

    let mut result: i64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= (byte as i64) << (8 * i);
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
        Ok(-(result & mask))
    } else {
        Ok(result)
    }
}

/// Decode with the default four-byte operand limit.
pub fn decode_default(bytes: &[u8]) -> Result<i64> {
    decode(bytes, MAX_NUMBER_SIZE)
}

/// Script truth: any non-zero byte, except a lone sign bit in the last byte.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &byte) in bytes.iter().enumerate() {
        if byte != 0 {
            return !(i == bytes.len() - 1 && byte == 0x80);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_small_values() {
        assert_eq!(encode(0), Vec::<u8>::new());
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(-1), vec![0x81]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x00]);
        assert_eq!(encode(-128), vec![0x80, 0x80]);
        assert_eq!(encode(255), vec![0xff, 0x00]);
        assert_eq!(encode(256), vec![0x00, 0x01]);
    }

    #[test]
    fn test_decode_values() {
        assert_eq!(decode_default(&[]).unwrap(), 0);
        assert_eq!(decode_default(&[0x81]).unwrap(), -1);
        assert_eq!(decode_default(&[0x80, 0x00]).unwrap(), 128);
        assert_eq!(decode_default(&[0xff, 0xff, 0xff, 0x7f]).unwrap(), i32::MAX as i64);
        // Negative zero.
        assert_eq!(decode_default(&[0x80]).unwrap(), 0);
        // Non-minimal padding is tolerated.
        assert_eq!(decode_default(&[0x01, 0x00]).unwrap(), 1);
    }

    #[test]
    fn test_decode_size_limit() {
        assert_eq!(decode_default(&[0, 0, 0, 0, 1]), Err(ConsensusError::InvalidNumber));
        assert_eq!(decode(&[0, 0, 0, 0, 1], 5).unwrap(), 1 << 32);
    }

    #[test]
    fn test_cast_to_bool() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00, 0x00]));
        assert!(!cast_to_bool(&[0x00, 0x80]));
        assert!(cast_to_bool(&[0x80, 0x00]));
        assert!(cast_to_bool(&[0x01]));
    }
}
