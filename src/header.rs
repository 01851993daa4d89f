//! Block header: wire codec, hash and header-level consensus checks

use crate::chain_state::ChainState;
use crate::error::{Code, ConsensusError, Result};
use crate::hash::bitcoin_hash;
use crate::serialization::{Reader, Writer};
use crate::settings::Settings;
use crate::types::{DataChunk, HashDigest, NULL_HASH};
use crate::uint256::U256;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u32,
    pub previous_block_hash: HashDigest,
    pub merkle: HashDigest,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    pub const SERIALIZED_SIZE: usize = 80;

    pub fn from_data(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::read(&mut reader)
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Header {
            version: reader.read_u32()?,
            previous_block_hash: reader.read_hash()?,
            merkle: reader.read_hash()?,
            timestamp: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }

    pub fn to_data(&self) -> DataChunk {
        let mut writer = Writer::with_capacity(Self::SERIALIZED_SIZE);
        self.write(&mut writer);
        writer.into_inner()
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_hash(&self.previous_block_hash);
        writer.write_hash(&self.merkle);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.bits);
        writer.write_u32(self.nonce);
    }

    /// Any field set. A default header is not valid.
    pub fn is_valid(&self) -> bool {
        self.version != 0
            || self.previous_block_hash != NULL_HASH
            || self.merkle != NULL_HASH
            || self.timestamp != 0
            || self.bits != 0
            || self.nonce != 0
    }

    pub fn hash(&self) -> HashDigest {
        bitcoin_hash(&self.to_data())
    }

    /// The hash, read as a little-endian number, does not exceed the target
    /// encoded by `bits`, and that target is within `proof_of_work_limit`.
    pub fn is_valid_proof_of_work(&self, proof_of_work_limit: u32) -> bool {
        let target = match U256::from_compact(self.bits) {
            Some(target) if !target.is_zero() => target,
            _ => return false,
        };

        match U256::from_compact(proof_of_work_limit) {
            Some(limit) if target <= limit => {}
            _ => return false,
        }

        U256::from_le_bytes(&self.hash()) <= target
    }

    /// Timestamp no more than `timestamp_limit_seconds` ahead of `now`.
    pub fn is_valid_timestamp(&self, timestamp_limit_seconds: u32, now: u32) -> bool {
        self.timestamp <= now.saturating_add(timestamp_limit_seconds)
    }

    /// Context-free checks against the local clock.
    pub fn check(&self, settings: &Settings) -> Code {
        self.check_at(settings, unix_time())
    }

    pub fn check_at(&self, settings: &Settings, now: u32) -> Code {
        if !self.is_valid_proof_of_work(settings.proof_of_work_limit) {
            return Err(ConsensusError::InvalidProofOfWork);
        }
        if !self.is_valid_timestamp(settings.timestamp_limit_seconds, now) {
            return Err(ConsensusError::FuturisticTimestamp);
        }
        Ok(())
    }

    /// Checks against the chain the header extends.
    pub fn accept(&self, state: &ChainState) -> Code {
        if self.bits != state.work_required {
            return Err(ConsensusError::IncorrectProofOfWork);
        }
        if self.version < state.minimum_version {
            return Err(ConsensusError::OldVersionBlock);
        }
        if self.timestamp <= state.median_time_past {
            return Err(ConsensusError::TimestampTooEarly);
        }
        Ok(())
    }
}

fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_state::forks;
    use crate::hash::decode_hash;

    fn genesis_header() -> Header {
        Header {
            version: 1,
            previous_block_hash: NULL_HASH,
            merkle: decode_hash("4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b").unwrap(),
            timestamp: 1231006505,
            bits: 0x1d00ffff,
            nonce: 2083236893,
        }
    }

    fn state() -> ChainState {
        ChainState {
            height: 1,
            enabled_forks: forks::BIP16_RULE,
            median_time_past: 1231006504,
            minimum_version: 1,
            work_required: 0x1d00ffff,
        }
    }

    #[test]
    fn test_serialization_layout() {
        let header = genesis_header();
        let data = header.to_data();
        assert_eq!(data.len(), Header::SERIALIZED_SIZE);
        assert_eq!(&data[..4], &[1, 0, 0, 0]);
        assert_eq!(&data[72..76], &[0xff, 0xff, 0x00, 0x1d]);
        assert_eq!(Header::from_data(&data).unwrap(), header);
        assert_eq!(Header::from_data(&data[..79]), Err(ConsensusError::InvalidEncoding));
    }

    #[test]
    fn test_genesis_hash() {
        assert_eq!(
            crate::hash::encode_hash(&genesis_header().hash()),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_default_is_invalid() {
        assert!(!Header::default().is_valid());
        assert!(genesis_header().is_valid());
    }

    #[test]
    fn test_proof_of_work() {
        let header = genesis_header();
        assert!(header.is_valid_proof_of_work(0x1d00ffff));

        // Target above the limit.
        assert!(!header.is_valid_proof_of_work(0x1c00ffff));

        let mut tampered = header.clone();
        tampered.nonce += 1;
        assert!(!tampered.is_valid_proof_of_work(0x1d00ffff));

        let mut negative = header;
        negative.bits = 0x1d80ffff;
        assert!(!negative.is_valid_proof_of_work(0x1d00ffff));
    }

    #[test]
    fn test_timestamp_window() {
        let header = genesis_header();
        assert!(header.is_valid_timestamp(7200, header.timestamp - 7200));
        assert!(!header.is_valid_timestamp(7200, header.timestamp - 7201));
        assert_eq!(
            header.check_at(&Settings::mainnet(), header.timestamp - 10_000),
            Err(ConsensusError::FuturisticTimestamp)
        );
        assert!(header.check(&Settings::mainnet()).is_ok());
    }

    #[test]
    fn test_accept() {
        let header = genesis_header();
        assert!(header.accept(&state()).is_ok());

        let mut wrong_bits = state();
        wrong_bits.work_required = 0x1c00ffff;
        assert_eq!(header.accept(&wrong_bits), Err(ConsensusError::IncorrectProofOfWork));

        let mut new_version = state();
        new_version.minimum_version = 2;
        assert_eq!(header.accept(&new_version), Err(ConsensusError::OldVersionBlock));

        let mut late = state();
        late.median_time_past = header.timestamp;
        assert_eq!(header.accept(&late), Err(ConsensusError::TimestampTooEarly));
    }
}
