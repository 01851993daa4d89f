//! Hash functions used by consensus

use crate::types::{HashDigest, ShortHash};
use bitcoin_hashes::{sha1, sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> HashDigest {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

/// SHA256(SHA256(x))
pub fn bitcoin_hash(data: &[u8]) -> HashDigest {
    sha256d::Hash::hash(data).into_inner()
}

pub fn ripemd160(data: &[u8]) -> ShortHash {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&Ripemd160::digest(data));
    hash
}

/// RIPEMD160(SHA256(x))
pub fn bitcoin_short_hash(data: &[u8]) -> ShortHash {
    ripemd160(&sha256(data))
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    sha1::Hash::hash(data).into_inner()
}

/// Hex display form of a hash: byte-reversed, as block explorers show it.
pub fn encode_hash(hash: &HashDigest) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse the display form produced by `encode_hash`.
pub fn decode_hash(text: &str) -> Option<HashDigest> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(text, &mut hash).ok()?;
    hash.reverse();
    Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_bitcoin_hash_is_double_sha256() {
        assert_eq!(bitcoin_hash(b"abc"), sha256(&sha256(b"abc")));
    }

    #[test]
    fn test_short_hash_length() {
        assert_eq!(bitcoin_short_hash(&[0x51]).len(), 20);
        assert_eq!(bitcoin_short_hash(b"x"), ripemd160(&sha256(b"x")));
    }

    #[test]
    fn test_sha1_abc() {
        assert_eq!(hex::encode(sha1(b"abc")), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_hash_display_round_trip() {
        let mut hash = [0u8; 32];
        hash[0] = 0x01;
        hash[31] = 0xff;
        let text = encode_hash(&hash);
        assert!(text.starts_with("ff"));
        assert!(text.ends_with("01"));
        assert_eq!(decode_hash(&text), Some(hash));
        assert_eq!(decode_hash("zz"), None);
    }
}
