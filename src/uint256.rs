//! 256-bit unsigned integers for targets and chain work

use std::cmp::Ordering;
use std::fmt;

/// 256-bit integer, four little-endian 64-bit words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const ONE: U256 = U256([1, 0, 0, 0]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    /// Interpret 32 bytes as a little-endian number (hash digests use this order).
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(chunk);
        }
        U256(words)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, &word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Low 64 bits.
    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    fn bit(&self, index: u32) -> bool {
        let word = (index / 64) as usize;
        (self.0[word] >> (index % 64)) & 1 == 1
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }

        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }

        result
    }

    pub fn not(&self) -> Self {
        U256([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }

    pub fn wrapping_add(&self, other: &U256) -> Self {
        let mut result = [0u64; 4];
        let mut carry = false;
        for (i, word) in result.iter_mut().enumerate() {
            let (sum, overflow1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, overflow2) = sum.overflowing_add(carry as u64);
            *word = sum;
            carry = overflow1 || overflow2;
        }
        U256(result)
    }

    pub fn wrapping_sub(&self, other: &U256) -> Self {
        let mut result = [0u64; 4];
        let mut borrow = false;
        for (i, word) in result.iter_mut().enumerate() {
            let (diff, overflow1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, overflow2) = diff.overflowing_sub(borrow as u64);
            *word = diff;
            borrow = overflow1 || overflow2;
        }
        U256(result)
    }

    /// Long division. Returns `None` for a zero divisor.
    pub fn checked_div(&self, divisor: &U256) -> Option<U256> {
        if divisor.is_zero() {
            return None;
        }

        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for index in (0..self.bits()).rev() {
            remainder = remainder.shl(1);
            if self.bit(index) {
                remainder.0[0] |= 1;
            }
            if remainder >= *divisor {
                remainder = remainder.wrapping_sub(divisor);
                quotient.0[(index / 64) as usize] |= 1 << (index % 64);
            }
        }

        Some(quotient)
    }

    /// Expand a compact ("bits") encoding.
    ///
    /// Returns `None` when the encoding is negative or overflows 256 bits.
    pub fn from_compact(bits: u32) -> Option<U256> {
        let exponent = bits >> 24;
        let mantissa = bits & 0x007f_ffff;
        let negative = mantissa != 0 && (bits & 0x0080_0000) != 0;
        let overflow = mantissa != 0
            && (exponent > 34
                || (mantissa > 0xff && exponent > 33)
                || (mantissa > 0xffff && exponent > 32));

        if negative || overflow {
            return None;
        }

        let value = U256::from_u64(mantissa as u64);
        Some(if exponent <= 3 {
            value.shr(8 * (3 - exponent))
        } else {
            value.shl(8 * (exponent - 3))
        })
    }

    /// Normalized compact encoding.
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut mantissa = if size <= 3 {
            (self.low_u64() << (8 * (3 - size))) as u32
        } else {
            self.shr(8 * (size - 3)).low_u64() as u32
        };

        // The sign bit must stay clear.
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            size += 1;
        }

        mantissa | (size << 24)
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.to_le_bytes();
        bytes.reverse();
        write!(f, "0x{}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_zero() {
        assert!(U256::ZERO.is_zero());
        assert_eq!(U256::ZERO.bits(), 0);
        assert!(!U256::ONE.is_zero());
    }

    #[test]
    fn test_u256_shl_shr() {
        let value = U256::from_u64(1);
        assert_eq!(value.shl(64), U256([0, 1, 0, 0]));
        assert_eq!(value.shl(255).bits(), 256);
        assert_eq!(value.shl(256), U256::ZERO);
        assert_eq!(value.shl(100).shr(100), value);
        assert_eq!(U256([0, 1, 0, 0]).shr(1), U256([1 << 63, 0, 0, 0]));
    }

    #[test]
    fn test_u256_add_sub() {
        let a = U256::from_u64(u64::MAX);
        let b = a.wrapping_add(&U256::ONE);
        assert_eq!(b, U256([0, 1, 0, 0]));
        assert_eq!(b.wrapping_sub(&U256::ONE), a);
        assert_eq!(U256::MAX.wrapping_add(&U256::ONE), U256::ZERO);
    }

    #[test]
    fn test_u256_div() {
        let a = U256::from_u64(1_000_000);
        assert_eq!(a.checked_div(&U256::from_u64(7)), Some(U256::from_u64(142_857)));
        assert_eq!(a.checked_div(&U256::ZERO), None);

        let big = U256::ONE.shl(200);
        assert_eq!(big.checked_div(&U256::ONE.shl(100)), Some(U256::ONE.shl(100)));
    }

    #[test]
    fn test_u256_ordering() {
        assert!(U256([0, 0, 0, 1]) > U256([u64::MAX, u64::MAX, u64::MAX, 0]));
        assert!(U256::from_u64(2) > U256::ONE);
    }

    #[test]
    fn test_u256_bytes_round_trip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[31] = 0x80;
        let value = U256::from_le_bytes(&bytes);
        assert_eq!(value.bits(), 256);
        assert_eq!(value.to_le_bytes(), bytes);
    }

    #[test]
    fn test_compact_genesis_target() {
        let target = U256::from_compact(0x1d00ffff).unwrap();
        assert_eq!(target, U256::from_u64(0xffff).shl(8 * 26));
        assert_eq!(target.to_compact(), 0x1d00ffff);
    }

    #[test]
    fn test_compact_small_exponent() {
        assert_eq!(U256::from_compact(0x03123456), Some(U256::from_u64(0x123456)));
        assert_eq!(U256::from_compact(0x02123456), Some(U256::from_u64(0x1234)));
        assert_eq!(U256::from_compact(0x01003456), Some(U256::ZERO));
    }

    #[test]
    fn test_compact_negative_and_overflow() {
        assert_eq!(U256::from_compact(0x04923456), None);
        assert_eq!(U256::from_compact(0xff123456), None);
        // A zero mantissa is neither negative nor overflowed.
        assert_eq!(U256::from_compact(0xff000000), Some(U256::ZERO));
    }
}
