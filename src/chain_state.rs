//! Chain state snapshot consumed by contextual validation

use serde::{Deserialize, Serialize};

/// Rule fork bits for `ChainState::enabled_forks` and script evaluation.
pub mod forks {
    /// Allow minimum difficulty blocks (test networks).
    pub const EASY_BLOCKS: u32 = 1 << 0;
    /// Pay-to-script-hash.
    pub const BIP16_RULE: u32 = 1 << 1;
    /// No duplicate unspent transaction ids.
    pub const BIP30_RULE: u32 = 1 << 2;
    /// Coinbase must include the block height.
    pub const BIP34_RULE: u32 = 1 << 3;
    /// Strict DER signatures.
    pub const BIP66_RULE: u32 = 1 << 4;
    /// OP_CHECKLOCKTIMEVERIFY.
    pub const BIP65_RULE: u32 = 1 << 5;
    /// Buried activation heights for BIP34, BIP65 and BIP66.
    pub const BIP90_RULE: u32 = 1 << 6;
    /// Assume no transaction hash collisions.
    pub const ALLOW_COLLISIONS: u32 = 1 << 7;
    /// Relative lock time.
    pub const BIP68_RULE: u32 = 1 << 8;
    /// OP_CHECKSEQUENCEVERIFY.
    pub const BIP112_RULE: u32 = 1 << 9;
    /// Median time past as the lock time clock.
    pub const BIP113_RULE: u32 = 1 << 10;

    pub const ALL_RULES: u32 = EASY_BLOCKS
        | BIP16_RULE
        | BIP30_RULE
        | BIP34_RULE
        | BIP66_RULE
        | BIP65_RULE
        | BIP90_RULE
        | ALLOW_COLLISIONS
        | BIP68_RULE
        | BIP112_RULE
        | BIP113_RULE;
}

/// Chain facts at the height of the block being validated, computed by the
/// caller from the chain it already has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Height of the block being validated.
    pub height: usize,
    pub enabled_forks: u32,
    pub median_time_past: u32,
    pub minimum_version: u32,
    /// Compact target the block must carry.
    pub work_required: u32,
}

impl ChainState {
    pub fn is_enabled(&self, fork: u32) -> bool {
        fork & self.enabled_forks != 0
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_bits_are_distinct() {
        let bits = [
            forks::EASY_BLOCKS,
            forks::BIP16_RULE,
            forks::BIP30_RULE,
            forks::BIP34_RULE,
            forks::BIP66_RULE,
            forks::BIP65_RULE,
            forks::BIP90_RULE,
            forks::ALLOW_COLLISIONS,
            forks::BIP68_RULE,
            forks::BIP112_RULE,
            forks::BIP113_RULE,
        ];
        let combined = bits.iter().fold(0, |acc, bit| {
            assert_eq!(acc & bit, 0);
            acc | bit
        });
        assert_eq!(combined, forks::ALL_RULES);
    }

    #[test]
    fn test_is_enabled() {
        let state = ChainState {
            height: 10,
            enabled_forks: forks::BIP16_RULE | forks::BIP65_RULE,
            median_time_past: 0,
            minimum_version: 1,
            work_required: 0x207fffff,
        };
        assert!(state.is_enabled(forks::BIP16_RULE));
        assert!(!state.is_enabled(forks::BIP34_RULE));
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"{"height":227931,"enabled_forks":14,"median_time_past":1363000000,"minimum_version":2,"work_required":436469756}"#;
        let state = ChainState::from_json(json).unwrap();
        assert_eq!(state.height, 227_931);
        assert!(state.is_enabled(forks::BIP34_RULE));
        assert_eq!(ChainState::from_json(&state.to_json().unwrap()).unwrap(), state);

        assert!(ChainState::from_json("{\"height\":1}").is_err());
    }
}
