//! Block structure, derived values and the check / accept / connect pipeline

use crate::cache::Memo;
use crate::chain_state::{forks, ChainState};
use crate::constants::*;
use crate::error::{Code, ConsensusError};
use crate::hash::{bitcoin_hash, encode_hash};
use crate::header::Header;
use crate::operation::Operation;
use crate::script::Script;
use crate::serialization::{compact_size_len, Reader, Writer};
use crate::settings::{Network, Settings};
use crate::transaction::{Input, Output, OutputPoint, Transaction};
use crate::types::{DataChunk, HashDigest, NULL_HASH};
use crate::uint256::U256;
use crate::validation::{Stage, Validation};
use log::{debug, trace};
use std::collections::HashSet;
use std::sync::Arc;

const GENESIS_MESSAGE: &[u8] = b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

const GENESIS_PUBLIC_KEY: [u8; 65] = [
    0x04, 0x67, 0x8a, 0xfd, 0xb0, 0xfe, 0x55, 0x48, 0x27, 0x19, 0x67, 0xf1, 0xa6, 0x71, 0x30, 0xb7,
    0x10, 0x5c, 0xd6, 0xa8, 0x28, 0xe0, 0x39, 0x09, 0xa6, 0x79, 0x62, 0xe0, 0xea, 0x1f, 0x61, 0xde,
    0xb6, 0x49, 0xf6, 0xbc, 0x3f, 0x4c, 0xef, 0x38, 0xc4, 0xf3, 0x55, 0x04, 0xe5, 0x1e, 0xc1, 0x12,
    0xde, 0x5c, 0x38, 0x4d, 0xf7, 0xba, 0x0b, 0x8d, 0x57, 0x8a, 0x4c, 0x70, 0x2b, 0x6b, 0xf1, 0x1d,
    0x5f,
];

/// A header and its ordered transactions, coinbase first.
///
/// Not `Copy`. `clone()` is the only way to duplicate a block.
#[derive(Debug, Default)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    total_inputs: Memo<usize>,
    non_coinbase_inputs: Memo<usize>,
    pub validation: Validation,
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Block {
            header: self.header.clone(),
            transactions: self.transactions.clone(),
            total_inputs: self.total_inputs.clone(),
            non_coinbase_inputs: self.non_coinbase_inputs.clone(),
            validation: self.validation.clone(),
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for Block {}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
            ..Self::default()
        }
    }

    // Deserialization.

    /// Block from bytes; check `is_valid()` for the outcome.
    pub fn factory(data: &[u8]) -> Self {
        let mut block = Block::default();
        block.from_data(data);
        block
    }

    pub fn from_data(&mut self, data: &[u8]) -> bool {
        let mut reader = Reader::new(data);
        self.read(&mut reader)
    }

    /// Read a header and its transactions. On failure the block is reset
    /// and left invalid.
    pub fn read(&mut self, reader: &mut Reader<'_>) -> bool {
        self.validation.start(Stage::Deserialize);

        match Self::read_parts(reader) {
            Some((header, transactions)) => {
                self.header = header;
                self.transactions = transactions;
                self.reset_caches();
                true
            }
            None => {
                self.reset();
                false
            }
        }
    }

    fn read_parts(reader: &mut Reader<'_>) -> Option<(Header, Vec<Transaction>)> {
        let header = Header::read(reader).ok()?;
        let count = reader.read_size().ok()?;

        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::read(reader).ok()?);
        }

        Some((header, transactions))
    }

    /// A valid header and at least one transaction.
    pub fn is_valid(&self) -> bool {
        self.header.is_valid() && !self.transactions.is_empty()
    }

    // Serialization.

    pub fn to_data(&self) -> DataChunk {
        let mut writer = Writer::with_capacity(self.serialized_size());
        self.write(&mut writer);
        writer.into_inner()
    }

    pub fn write(&self, writer: &mut Writer) {
        self.header.write(writer);
        writer.write_compact_size(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.write(writer);
        }
    }

    /// Transaction hashes in block order.
    pub fn to_hashes(&self) -> Vec<HashDigest> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    // Properties.

    pub fn serialized_size(&self) -> usize {
        Header::SERIALIZED_SIZE
            + compact_size_len(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Transaction::serialized_size)
                .sum::<usize>()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn set_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
        self.reset_caches();
    }

    pub fn hash(&self) -> HashDigest {
        self.header.hash()
    }

    fn reset(&mut self) {
        self.header = Header::default();
        self.transactions.clear();
        self.reset_caches();
    }

    fn reset_caches(&mut self) {
        self.total_inputs.reset();
        self.non_coinbase_inputs.reset();
    }

    // Utilities.

    /// Genesis block of `network`.
    pub fn genesis(network: Network) -> Block {
        let (timestamp, bits, nonce) = match network {
            Network::Mainnet => (1231006505, MAINNET_PROOF_OF_WORK_LIMIT, 2083236893),
            Network::Testnet => (1296688602, MAINNET_PROOF_OF_WORK_LIMIT, 414098458),
            Network::Regtest => (1296688602, REGTEST_PROOF_OF_WORK_LIMIT, 2),
        };

        let input_script = Script::from_operations(vec![
            Operation::from_data(MAINNET_PROOF_OF_WORK_LIMIT.to_le_bytes().to_vec(), false),
            Operation::from_data(vec![0x04], false),
            Operation::from_data(GENESIS_MESSAGE.to_vec(), false),
        ]);
        let output_script = Script::from_operations(Script::to_pay_public_key_pattern(&GENESIS_PUBLIC_KEY));

        let coinbase = Transaction::new(
            1,
            vec![Input::new(OutputPoint::null(), input_script, SEQUENCE_FINAL)],
            vec![Output::new(INITIAL_SUBSIDY, output_script)],
            0,
        );

        let header = Header {
            version: 1,
            previous_block_hash: NULL_HASH,
            merkle: coinbase.hash(),
            timestamp,
            bits,
            nonce,
        };

        Block::new(header, vec![coinbase])
    }

    /// Capacity to reserve for a locator from `top`: the linear heights, the
    /// base-2 log of the rest rounded up, and genesis. Never less than the
    /// locator's length.
    pub fn locator_size(top: usize) -> usize {
        let linear = top.min(LOCATOR_LINEAR_COUNT);
        let remaining = top - linear;
        let back_off = match remaining {
            0 => 0,
            1 => 1,
            n => (usize::BITS - (n - 1).leading_zeros()) as usize,
        };
        linear + back_off + 1
    }

    /// Heights for a block locator: the top ten, then exponentially
    /// sparser, always ending at genesis.
    pub fn locator_heights(top: usize) -> Vec<usize> {
        let mut heights = Vec::with_capacity(Self::locator_size(top));
        let mut step = 1usize;
        let mut height = top;

        while height > 0 {
            if heights.len() >= LOCATOR_LINEAR_COUNT {
                step = step.saturating_mul(2);
            }
            heights.push(height);
            height = height.saturating_sub(step);
        }

        heights.push(0);
        heights
    }

    // Validation.

    /// Initial subsidy halved every `SUBSIDY_INTERVAL` blocks.
    pub fn subsidy(height: usize) -> u64 {
        let halvings = height as u64 / SUBSIDY_INTERVAL;
        if halvings >= MAX_HALVINGS {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    /// Expected hashes to meet the target encoded by `bits`:
    /// 2^256 / (target + 1). Zero for an invalid or zero target.
    pub fn proof(bits: u32) -> U256 {
        let target = match U256::from_compact(bits) {
            Some(target) if !target.is_zero() => target,
            _ => return U256::ZERO,
        };

        // 2^256 / (t + 1) == (2^256 - t - 1) / (t + 1) + 1
        target
            .not()
            .checked_div(&target.wrapping_add(&U256::ONE))
            .map(|quotient| quotient.wrapping_add(&U256::ONE))
            .unwrap_or(U256::ZERO)
    }

    /// Proof of this block's header.
    pub fn work(&self) -> U256 {
        Self::proof(self.header.bits)
    }

    pub fn fees(&self) -> u64 {
        self.transactions
            .iter()
            .fold(0u64, |total, tx| total.saturating_add(tx.fees()))
    }

    /// Value the coinbase pays out.
    pub fn claim(&self) -> u64 {
        self.transactions
            .first()
            .map_or(0, Transaction::total_output_value)
    }

    /// Subsidy plus fees.
    pub fn reward(&self, height: usize) -> u64 {
        self.fees().saturating_add(Self::subsidy(height))
    }

    /// Merkle root of the transaction hashes, duplicating the last hash of
    /// any odd level.
    pub fn generate_merkle_root(&self) -> HashDigest {
        let mut level = self.to_hashes();
        if level.is_empty() {
            return NULL_HASH;
        }

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                level.push(level[level.len() - 1]);
            }

            level = level
                .chunks(2)
                .map(|pair| {
                    let mut concatenated = [0u8; 64];
                    concatenated[..32].copy_from_slice(&pair[0]);
                    concatenated[32..].copy_from_slice(&pair[1]);
                    bitcoin_hash(&concatenated)
                })
                .collect();
        }

        level[0]
    }

    pub fn signature_operations(&self, bip16: bool) -> usize {
        self.transactions.iter().fold(0usize, |total, tx| {
            total.saturating_add(tx.signature_operations(bip16))
        })
    }

    pub fn total_inputs(&self) -> usize {
        self.total_inputs.get_or_compute(|| {
            self.transactions
                .iter()
                .map(|tx| tx.inputs().len())
                .sum()
        })
    }

    pub fn total_non_coinbase_inputs(&self) -> usize {
        self.non_coinbase_inputs.get_or_compute(|| {
            self.transactions
                .iter()
                .skip(1)
                .map(|tx| tx.inputs().len())
                .sum()
        })
    }

    /// Times the `total_inputs` cache was filled.
    pub fn total_inputs_computations(&self) -> usize {
        self.total_inputs.computations()
    }

    /// A coinbase anywhere after the first position.
    pub fn is_extra_coinbases(&self) -> bool {
        self.transactions.iter().skip(1).any(Transaction::is_coinbase)
    }

    pub fn is_final(&self, height: usize, block_time: u32) -> bool {
        self.transactions
            .iter()
            .all(|tx| tx.is_final(height, block_time))
    }

    pub fn is_distinct_transaction_set(&self) -> bool {
        let mut hashes = HashSet::with_capacity(self.transactions.len());
        self.transactions.iter().all(|tx| hashes.insert(tx.hash()))
    }

    pub fn is_valid_coinbase_claim(&self, height: usize) -> bool {
        self.claim() <= self.reward(height)
    }

    /// The coinbase script starts with a push of the block height (BIP34).
    pub fn is_valid_coinbase_script(&self, height: usize) -> bool {
        match self.transactions.first() {
            Some(coinbase) if coinbase.is_coinbase() => {
                Script::is_coinbase_pattern(&coinbase.inputs()[0].script.operations(), height)
            }
            _ => false,
        }
    }

    /// Any point spent by more than one input across the block.
    /// Some transaction spends an output the populate step did not find.
    pub fn is_missing_previous_outputs(&self) -> bool {
        self.transactions
            .iter()
            .any(Transaction::is_missing_previous_outputs)
    }

    pub fn is_internal_double_spend(&self) -> bool {
        let mut spent = HashSet::with_capacity(self.total_inputs());
        self.transactions
            .iter()
            .skip(1)
            .flat_map(|tx| tx.inputs())
            .any(|input| !spent.insert(&input.previous_output))
    }

    pub fn is_valid_merkle_root(&self) -> bool {
        self.generate_merkle_root() == self.header.merkle
    }

    /// Context-free checks, in order:
    /// 1. header proof of work and timestamp
    /// 2. at least one transaction, within `MAX_BLOCK_SIZE`
    /// 3. exactly one coinbase, first
    /// 4. no duplicate transaction and no point spent twice
    /// 5. merkle root matches the header
    /// 6. legacy sigops within `MAX_BLOCK_SIGOPS`
    /// 7. each transaction's own check
    pub fn check(&self, settings: &Settings) -> Code {
        self.validation.start(Stage::Check);
        trace!("checking block {}", encode_hash(&self.hash()));

        let result = self.check_inner(settings);
        self.log_rejection("check", &result);
        self.validation.record(result, None)
    }

    fn check_inner(&self, settings: &Settings) -> Code {
        self.header.check(settings)?;

        if self.transactions.is_empty() {
            return Err(ConsensusError::EmptyBlock);
        }
        if self.serialized_size() > MAX_BLOCK_SIZE {
            return Err(ConsensusError::BlockSizeLimit);
        }
        if !self.transactions[0].is_coinbase() {
            return Err(ConsensusError::FirstNotCoinbase);
        }
        if self.is_extra_coinbases() {
            return Err(ConsensusError::ExtraCoinbases);
        }
        if !self.is_distinct_transaction_set() {
            return Err(ConsensusError::InternalDuplicate);
        }
        if self.is_internal_double_spend() {
            return Err(ConsensusError::BlockInternalDoubleSpend);
        }
        if !self.is_valid_merkle_root() {
            return Err(ConsensusError::MerkleMismatch);
        }
        if self.signature_operations(false) > MAX_BLOCK_SIGOPS {
            return Err(ConsensusError::BlockLegacySigopLimit);
        }

        self.check_transactions()
    }

    pub fn check_transactions(&self) -> Code {
        self.transactions.iter().try_for_each(|tx| tx.check(false))
    }

    /// Contextual checks against `state`, in order:
    /// 1. header accept (when `header`)
    /// 2. every transaction final at the block time, which is the median
    ///    time past under BIP113
    /// 3. coinbase commits to the height under BIP34
    /// 4. previous outputs populated, coinbase claim within reward, embedded
    ///    sigops within `MAX_BLOCK_SIGOPS`, each transaction's accept (when
    ///    `transactions`)
    pub fn accept(&self, state: Arc<ChainState>, transactions: bool, header: bool) -> Code {
        self.validation.start(Stage::Accept);
        trace!("accepting block {} at height {}", encode_hash(&self.hash()), state.height);

        let result = self.accept_inner(&state, transactions, header);
        self.log_rejection("accept", &result);
        self.validation.record(result, Some(state))
    }

    fn accept_inner(&self, state: &ChainState, transactions: bool, header: bool) -> Code {
        let bip16 = state.is_enabled(forks::BIP16_RULE);
        let bip34 = state.is_enabled(forks::BIP34_RULE);
        let bip113 = state.is_enabled(forks::BIP113_RULE);

        if header {
            self.header.accept(state)?;
        }

        let block_time = if bip113 {
            state.median_time_past
        } else {
            self.header.timestamp
        };
        if !self.is_final(state.height, block_time) {
            return Err(ConsensusError::BlockNonFinal);
        }
        if bip34 && !self.is_valid_coinbase_script(state.height) {
            return Err(ConsensusError::CoinbaseHeightMismatch);
        }

        if !transactions {
            return Ok(());
        }

        // Fees count an unpopulated previous output as zero.
        if self.is_missing_previous_outputs() {
            return Err(ConsensusError::MissingPreviousOutput);
        }
        if !self.is_valid_coinbase_claim(state.height) {
            return Err(ConsensusError::CoinbaseValueLimit);
        }
        if self.signature_operations(bip16) > MAX_BLOCK_SIGOPS {
            return Err(ConsensusError::BlockEmbeddedSigopLimit);
        }

        self.accept_transactions(state)
    }

    pub fn accept_transactions(&self, state: &ChainState) -> Code {
        self.transactions
            .iter()
            .try_for_each(|tx| tx.accept(state, false))
    }

    /// Script verification of every non-coinbase input.
    pub fn connect(&self, state: Arc<ChainState>) -> Code {
        self.validation.start(Stage::Connect);
        trace!("connecting block {}", encode_hash(&self.hash()));

        let result = self.connect_transactions(&state);
        self.log_rejection("connect", &result);
        self.validation.record(result, Some(state))
    }

    pub fn connect_transactions(&self, state: &ChainState) -> Code {
        self.transactions.iter().try_for_each(|tx| tx.connect(state))
    }

    fn log_rejection(&self, stage: &str, result: &Code) {
        if let Err(error) = result {
            debug!("block {} failed {}: {}", encode_hash(&self.hash()), stage, error);
        }
    }
}
