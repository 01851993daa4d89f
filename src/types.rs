//! Core byte and hash types for consensus validation

/// Hash type: 256-bit hash, in internal (little-endian) byte order
pub type HashDigest = [u8; 32];

/// Short hash type: 160-bit hash (RIPEMD160 of SHA256)
pub type ShortHash = [u8; 20];

/// Byte string type
pub type DataChunk = Vec<u8>;

/// Stack of byte strings
pub type DataStack = Vec<DataChunk>;

/// DER signature followed by one sighash byte
pub type Endorsement = Vec<u8>;

/// The all-zero hash, used by null output points
pub const NULL_HASH: HashDigest = [0u8; 32];
