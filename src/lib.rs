//! # Consensus Engine
//!
//! Legacy Bitcoin consensus validation: block and script codecs, the script
//! interpreter, signature hashing and the three-stage block pipeline.
//!
//! ## Pipeline
//!
//! - `check`: context-free structure (size, coinbase placement, merkle root,
//!   duplicate transactions, legacy sigops)
//! - `accept`: rules that need a `ChainState` (header work, finality, BIP34
//!   height commitment, coinbase claim, populated previous outputs)
//! - `connect`: script execution of every non-coinbase input
//!
//! Stages must run in that order; `ConsensusEngine::validate` does so and
//! stops at the first failure.
//!
//! ## Usage
//!
//! ```rust
//! use consensus_engine::{Block, ConsensusEngine, Network, Settings};
//!
//! let engine = ConsensusEngine::new(Settings::mainnet());
//! let genesis = Block::genesis(Network::Mainnet);
//! assert!(engine.check(&genesis).is_ok());
//! assert_eq!(Block::subsidy(210_000), 2_500_000_000);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod cache;
pub mod serialization;
pub mod hash;
pub mod uint256;
pub mod opcode;
pub mod number;
pub mod operation;
pub mod script;
pub mod signature;
pub mod interpreter;
pub mod transaction;
pub mod header;
pub mod chain_state;
pub mod settings;
pub mod validation;
pub mod block;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{Code, ConsensusError, ErrorCategory, Result};
pub use block::Block;
pub use chain_state::{forks, ChainState};
pub use header::Header;
pub use operation::Operation;
pub use script::{Script, ScriptPattern};
pub use settings::{Network, Settings};
pub use transaction::{Input, Output, OutputPoint, PointValidation, Transaction};
pub use uint256::U256;
pub use validation::{Instrument, Stage, StageClock, Validation};

use log::debug;
use std::sync::Arc;

/// Drives validation stages in consensus order for one network.
///
/// # Examples
///
/// ```
/// use consensus_engine::{ConsensusEngine, Network};
///
/// let engine = ConsensusEngine::for_network(Network::Regtest);
/// assert_eq!(engine.settings().proof_of_work_limit, 0x207fffff);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    settings: Settings,
}

impl ConsensusEngine {
    pub fn new(settings: Settings) -> Self {
        ConsensusEngine { settings }
    }

    pub fn for_network(network: Network) -> Self {
        Self::new(Settings::for_network(network))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Context-free block check.
    pub fn check(&self, block: &Block) -> Code {
        block.check(&self.settings)
    }

    /// Full validation: check, accept, then connect. The block's previous
    /// outputs must already be populated.
    pub fn validate(&self, block: &Block, state: Arc<ChainState>) -> Code {
        block.check(&self.settings)?;
        block.accept(state.clone(), true, true)?;
        block.connect(state)
    }

    /// Pool validation of a loose transaction against `state`.
    pub fn validate_transaction(&self, tx: &Transaction, state: &ChainState) -> Code {
        let result = tx
            .check(true)
            .and_then(|()| tx.accept(state, true))
            .and_then(|()| tx.connect(state));

        if let Err(error) = &result {
            debug!("pool transaction {} rejected: {}", hash::encode_hash(&tx.hash()), error);
        }
        result
    }

    /// Script verification of a single input.
    pub fn verify_input(&self, tx: &Transaction, input_index: u32, active_forks: u32) -> Code {
        interpreter::verify(tx, input_index, active_forks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::*;

    fn state() -> ChainState {
        ChainState {
            height: 200,
            enabled_forks: forks::BIP16_RULE,
            median_time_past: 1_500_000_000,
            minimum_version: 1,
            work_required: REGTEST_PROOF_OF_WORK_LIMIT,
        }
    }

    fn pool_transaction(input_script: Vec<Operation>) -> Transaction {
        let mut tx = Transaction::new(
            1,
            vec![Input::new(
                OutputPoint::new([9; 32], 1),
                Script::from_operations(input_script),
                SEQUENCE_FINAL,
            )],
            vec![Output::new(900, Script::from_operations(vec![Operation::new(OP_1)]))],
            0,
        );
        tx.populate(
            0,
            PointValidation {
                cache: Some(Output::new(
                    1000,
                    Script::from_operations(vec![Operation::new(OP_2), Operation::new(OP_EQUAL)]),
                )),
                height: 10,
                ..PointValidation::default()
            },
        );
        tx
    }

    #[test]
    fn test_engine_defaults_to_mainnet() {
        assert_eq!(ConsensusEngine::default().settings(), &Settings::mainnet());
    }

    #[test]
    fn test_genesis_check() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let engine = ConsensusEngine::for_network(network);
            assert_eq!(engine.check(&Block::genesis(network)), Ok(()));
        }
    }

    #[test]
    fn test_validate_transaction() {
        let engine = ConsensusEngine::default();
        let tx = pool_transaction(vec![Operation::new(OP_2)]);
        assert_eq!(engine.validate_transaction(&tx, &state()), Ok(()));
        assert_eq!(engine.verify_input(&tx, 0, 0), Ok(()));

        let wrong = pool_transaction(vec![Operation::new(OP_3)]);
        assert_eq!(engine.validate_transaction(&wrong, &state()), Err(ConsensusError::StackFalse));
    }

    #[test]
    fn test_validate_transaction_rejects_coinbase() {
        let genesis = Block::genesis(Network::Mainnet);
        let engine = ConsensusEngine::default();
        assert_eq!(
            engine.validate_transaction(&genesis.transactions()[0], &state()),
            Err(ConsensusError::CoinbaseTransaction)
        );
    }
}
