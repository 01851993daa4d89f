//! Network configuration

use crate::constants::{
    MAINNET_PROOF_OF_WORK_LIMIT, REGTEST_PROOF_OF_WORK_LIMIT, TIMESTAMP_FUTURE_SECONDS,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Context-free validation parameters. Everything that depends on chain
/// position lives in `ChainState` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub network: Network,
    /// Highest permitted target, compact encoded.
    pub proof_of_work_limit: u32,
    /// How far a header timestamp may run ahead of the local clock.
    #[serde(default = "default_timestamp_limit")]
    pub timestamp_limit_seconds: u32,
}

fn default_timestamp_limit() -> u32 {
    TIMESTAMP_FUTURE_SECONDS
}

impl Settings {
    pub fn mainnet() -> Self {
        Settings {
            network: Network::Mainnet,
            proof_of_work_limit: MAINNET_PROOF_OF_WORK_LIMIT,
            timestamp_limit_seconds: TIMESTAMP_FUTURE_SECONDS,
        }
    }

    pub fn testnet() -> Self {
        Settings {
            network: Network::Testnet,
            ..Self::mainnet()
        }
    }

    pub fn regtest() -> Self {
        Settings {
            network: Network::Regtest,
            proof_of_work_limit: REGTEST_PROOF_OF_WORK_LIMIT,
            timestamp_limit_seconds: TIMESTAMP_FUTURE_SECONDS,
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        if settings.proof_of_work_limit >> 24 == 0 {
            anyhow::bail!(
                "proof_of_work_limit {:#010x} has a zero exponent",
                settings.proof_of_work_limit
            );
        }
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::mainnet()
    }
}
