//! Transactions, their inputs and outputs, and transaction-level validation

use crate::cache::Memo;
use crate::chain_state::{forks, ChainState};
use crate::constants::*;
use crate::error::{Code, ConsensusError, Result};
use crate::hash::bitcoin_hash;
use crate::interpreter;
use crate::script::Script;
use crate::serialization::{compact_size_len, Reader, Writer};
use crate::types::{DataChunk, HashDigest, NULL_HASH};
use log::{debug, trace};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Facts about a previous output, filled in by whoever resolves prevouts
/// against the chain before `accept` and `connect` run.
#[derive(Debug, Clone, Default)]
pub struct PointValidation {
    /// The referenced output, `None` until found.
    pub cache: Option<Output>,
    /// Height of the block that confirmed the previous output.
    pub height: usize,
    /// Median time past at that block.
    pub median_time_past: u32,
    pub spent: bool,
    /// The previous output belongs to a coinbase transaction.
    pub coinbase: bool,
}

/// Reference to an output of an earlier transaction.
///
/// Equality, hashing and serialization cover only `hash` and `index`.
#[derive(Debug, Clone, Default)]
pub struct OutputPoint {
    pub hash: HashDigest,
    pub index: u32,
    pub validation: PointValidation,
}

impl PartialEq for OutputPoint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.index == other.index
    }
}

impl Eq for OutputPoint {}

impl Hash for OutputPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
        self.index.hash(state);
    }
}

impl OutputPoint {
    pub fn new(hash: HashDigest, index: u32) -> Self {
        OutputPoint {
            hash,
            index,
            validation: PointValidation::default(),
        }
    }

    /// The point a coinbase input spends.
    pub fn null() -> Self {
        Self::new(NULL_HASH, u32::MAX)
    }

    pub fn is_null(&self) -> bool {
        self.hash == NULL_HASH && self.index == u32::MAX
    }

    /// Null points and outputs of non-coinbase transactions are always
    /// mature; coinbase outputs need `COINBASE_MATURITY` confirmations.
    pub fn is_mature(&self, height: usize) -> bool {
        if !self.validation.coinbase || self.is_null() {
            return true;
        }

        height.saturating_sub(self.validation.height) >= COINBASE_MATURITY
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let hash = reader.read_hash()?;
        let index = reader.read_u32()?;
        Ok(Self::new(hash, index))
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.hash);
        writer.write_u32(self.index);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub previous_output: OutputPoint,
    pub script: Script,
    pub sequence: u32,
}

impl Input {
    pub fn new(previous_output: OutputPoint, script: Script, sequence: u32) -> Self {
        Input {
            previous_output,
            script,
            sequence,
        }
    }

    pub fn is_final(&self) -> bool {
        self.sequence == SEQUENCE_FINAL
    }

    /// BIP68: the input is younger than its relative lock time.
    pub fn is_locked(&self, block_height: usize, median_time_past: u32) -> bool {
        if self.sequence & RELATIVE_LOCKTIME_DISABLED != 0 {
            return false;
        }

        let minimum = self.sequence & RELATIVE_LOCKTIME_MASK;
        let prevout = &self.previous_output.validation;

        if self.sequence & RELATIVE_LOCKTIME_TIME_LOCKED != 0 {
            let age_seconds = median_time_past.saturating_sub(prevout.median_time_past);
            return (age_seconds as u64) < ((minimum as u64) << RELATIVE_LOCKTIME_SECONDS_SHIFT);
        }

        let age_blocks = block_height.saturating_sub(prevout.height);
        age_blocks < minimum as usize
    }

    /// Legacy sigops, plus redeem script sigops under BIP16 when the
    /// previous output is known.
    pub fn signature_operations(&self, bip16: bool) -> usize {
        let mut sigops = self.script.sigops(false);
        if bip16 {
            if let Some(prevout) = &self.previous_output.validation.cache {
                sigops += self.script.embedded_sigops(&prevout.script);
            }
        }
        sigops
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let previous_output = OutputPoint::read(reader)?;
        let mut script = Script::new();
        if !script.read(reader, true) {
            return Err(ConsensusError::InvalidEncoding);
        }
        let sequence = reader.read_u32()?;
        Ok(Input::new(previous_output, script, sequence))
    }

    fn write(&self, writer: &mut Writer) {
        self.previous_output.write(writer);
        self.script.write(writer, true);
        writer.write_u32(self.sequence);
    }

    fn serialized_size(&self) -> usize {
        32 + 4 + self.script.serialized_size(true) + 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub value: u64,
    pub script: Script,
}

impl Output {
    /// Sentinel value of an output that does not exist.
    pub const NOT_FOUND: u64 = u64::MAX;

    pub fn new(value: u64, script: Script) -> Self {
        Output { value, script }
    }

    /// Placeholder written for skipped outputs by SINGLE signature hashing.
    pub fn null() -> Self {
        Output::new(Self::NOT_FOUND, Script::new())
    }

    pub fn signature_operations(&self) -> usize {
        self.script.sigops(false)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.read_u64()?;
        let mut script = Script::new();
        if !script.read(reader, true) {
            return Err(ConsensusError::InvalidEncoding);
        }
        Ok(Output::new(value, script))
    }

    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.value);
        self.script.write(writer, true);
    }

    fn serialized_size(&self) -> usize {
        8 + self.script.serialized_size(true)
    }
}

/// A legacy (non-witness) transaction. The hash is computed once and
/// invalidated by the setters.
#[derive(Debug, Clone)]
pub struct Transaction {
    version: u32,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    locktime: u32,
    hash: Memo<HashDigest>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.locktime == other.locktime
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<Input>, outputs: Vec<Output>, locktime: u32) -> Self {
        Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: Memo::new(),
        }
    }

    pub fn from_data(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        Self::read(&mut reader)
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.read_u32()?;

        let input_count = reader.read_size()?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(Input::read(reader)?);
        }

        let output_count = reader.read_size()?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(Output::read(reader)?);
        }

        let locktime = reader.read_u32()?;
        Ok(Transaction::new(version, inputs, outputs, locktime))
    }

    pub fn to_data(&self) -> DataChunk {
        let mut writer = Writer::with_capacity(self.serialized_size());
        self.write(&mut writer);
        writer.into_inner()
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.version);
        writer.write_compact_size(self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(writer);
        }
        writer.write_compact_size(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(writer);
        }
        writer.write_u32(self.locktime);
    }

    pub fn serialized_size(&self) -> usize {
        4 + compact_size_len(self.inputs.len() as u64)
            + self.inputs.iter().map(Input::serialized_size).sum::<usize>()
            + compact_size_len(self.outputs.len() as u64)
            + self.outputs.iter().map(Output::serialized_size).sum::<usize>()
            + 4
    }

    pub fn hash(&self) -> HashDigest {
        self.hash.get_or_compute(|| bitcoin_hash(&self.to_data()))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
        self.hash.reset();
    }

    pub fn set_locktime(&mut self, locktime: u32) {
        self.locktime = locktime;
        self.hash.reset();
    }

    pub fn set_inputs(&mut self, inputs: Vec<Input>) {
        self.inputs = inputs;
        self.hash.reset();
    }

    pub fn set_outputs(&mut self, outputs: Vec<Output>) {
        self.outputs = outputs;
        self.hash.reset();
    }

    /// Attach prevout facts to an input. Metadata is not serialized, so the
    /// hash stays valid. Returns false for an out of range index.
    pub fn populate(&mut self, input_index: usize, validation: PointValidation) -> bool {
        match self.inputs.get_mut(input_index) {
            Some(input) => {
                input.previous_output.validation = validation;
                true
            }
            None => false,
        }
    }

    // Properties.

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// A non-coinbase transaction spending a null point.
    pub fn is_null_non_coinbase(&self) -> bool {
        !self.is_coinbase()
            && self
                .inputs
                .iter()
                .any(|input| input.previous_output.is_null())
    }

    pub fn is_oversized_coinbase(&self) -> bool {
        if !self.is_coinbase() {
            return false;
        }

        let size = self.inputs[0].script.serialized_size(false);
        !(MIN_COINBASE_SIZE..=MAX_COINBASE_SIZE).contains(&size)
    }

    /// Lock time satisfied at `block_height`/`block_time`, or every input final.
    pub fn is_final(&self, block_height: usize, block_time: u32) -> bool {
        if self.locktime == 0 {
            return true;
        }

        let limit = if self.locktime < LOCKTIME_THRESHOLD {
            block_height as u64
        } else {
            block_time as u64
        };

        (self.locktime as u64) < limit || self.inputs.iter().all(Input::is_final)
    }

    /// BIP68 relative lock time not yet satisfied by some input.
    pub fn is_locked(&self, block_height: usize, median_time_past: u32) -> bool {
        if self.version < RELATIVE_LOCKTIME_MIN_VERSION || self.is_coinbase() {
            return false;
        }

        self.inputs
            .iter()
            .any(|input| input.is_locked(block_height, median_time_past))
    }

    /// Sum of populated previous output values; unresolved prevouts add zero.
    pub fn total_input_value(&self) -> u64 {
        self.inputs.iter().fold(0u64, |total, input| {
            let value = input
                .previous_output
                .validation
                .cache
                .as_ref()
                .map_or(0, |output| output.value);
            total.saturating_add(value)
        })
    }

    /// Saturates instead of overflowing.
    pub fn total_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |total, output| total.saturating_add(output.value))
    }

    pub fn fees(&self) -> u64 {
        self.total_input_value()
            .saturating_sub(self.total_output_value())
    }

    pub fn is_overspent(&self) -> bool {
        !self.is_coinbase() && self.total_output_value() > self.total_input_value()
    }

    pub fn is_immature(&self, target_height: usize) -> bool {
        self.inputs
            .iter()
            .any(|input| !input.previous_output.is_mature(target_height))
    }

    /// Some non-null previous output was not found.
    pub fn is_missing_previous_outputs(&self) -> bool {
        self.inputs.iter().any(|input| {
            let prevout = &input.previous_output;
            prevout.validation.cache.is_none() && !prevout.is_null()
        })
    }

    pub fn is_double_spend(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| input.previous_output.validation.spent)
    }

    /// Two inputs spend the same point.
    pub fn is_internal_double_spend(&self) -> bool {
        let mut points = HashSet::with_capacity(self.inputs.len());
        !self
            .inputs
            .iter()
            .all(|input| points.insert(&input.previous_output))
    }

    pub fn signature_operations(&self, bip16: bool) -> usize {
        let inputs = self
            .inputs
            .iter()
            .fold(0usize, |total, input| total.saturating_add(input.signature_operations(bip16)));
        self.outputs
            .iter()
            .fold(inputs, |total, output| total.saturating_add(output.signature_operations()))
    }

    // Validation.

    /// Context-free checks.
    ///
    /// A transaction is well formed if:
    /// 1. it has inputs and outputs
    /// 2. no non-coinbase input spends the null point
    /// 3. its outputs sum to at most `MAX_MONEY`
    /// 4. in a block, a coinbase script is 2 to 100 bytes
    /// 5. in the pool, it is not a coinbase, spends no point twice, is
    ///    smaller than a block and stays under the block sigop limit
    pub fn check(&self, transaction_pool: bool) -> Code {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(ConsensusError::EmptyTransaction);
        }
        if self.is_null_non_coinbase() {
            return Err(ConsensusError::PreviousOutputNull);
        }
        if self.total_output_value() > MAX_MONEY {
            return Err(ConsensusError::SpendOverflow);
        }
        if !transaction_pool && self.is_oversized_coinbase() {
            return Err(ConsensusError::InvalidCoinbaseScriptSize);
        }

        if transaction_pool {
            if self.is_coinbase() {
                return Err(ConsensusError::CoinbaseTransaction);
            }
            if self.is_internal_double_spend() {
                return Err(ConsensusError::TransactionInternalDoubleSpend);
            }
            if self.serialized_size() >= MAX_BLOCK_SIZE {
                return Err(ConsensusError::TransactionSizeLimit);
            }
            // BIP16 activation is unknown without chain state.
            if self.signature_operations(false) > MAX_BLOCK_SIGOPS {
                return Err(ConsensusError::TransactionLegacySigopLimit);
            }
        }

        Ok(())
    }

    /// Checks against populated previous outputs and the chain state.
    pub fn accept(&self, state: &ChainState, transaction_pool: bool) -> Code {
        let result = self.accept_inner(state, transaction_pool);
        if let Err(error) = &result {
            debug!(
                "transaction {} rejected at height {}: {}",
                crate::hash::encode_hash(&self.hash()),
                state.height,
                error
            );
        }
        result
    }

    fn accept_inner(&self, state: &ChainState, transaction_pool: bool) -> Code {
        let bip16 = state.is_enabled(forks::BIP16_RULE);
        let bip68 = state.is_enabled(forks::BIP68_RULE);

        if transaction_pool && !self.is_final(state.height, state.median_time_past) {
            return Err(ConsensusError::TransactionNonFinal);
        }
        if self.is_missing_previous_outputs() {
            return Err(ConsensusError::MissingPreviousOutput);
        }
        if self.is_double_spend() {
            return Err(ConsensusError::DoubleSpend);
        }
        if self.is_immature(state.height) {
            return Err(ConsensusError::CoinbaseMaturity);
        }
        if self.is_overspent() {
            return Err(ConsensusError::SpendExceedsValue);
        }
        if bip68 && self.is_locked(state.height, state.median_time_past) {
            return Err(ConsensusError::SequenceLocked);
        }
        if transaction_pool && self.signature_operations(bip16) > MAX_BLOCK_SIGOPS {
            return Err(ConsensusError::TransactionEmbeddedSigopLimit);
        }

        Ok(())
    }

    /// Run every input script against its previous output.
    pub fn connect(&self, state: &ChainState) -> Code {
        for index in 0..self.inputs.len() {
            self.connect_input(state, index)?;
        }
        Ok(())
    }

    pub fn connect_input(&self, state: &ChainState, input_index: usize) -> Code {
        if input_index >= self.inputs.len() {
            return Err(ConsensusError::InvalidInput);
        }
        if self.is_coinbase() {
            return Ok(());
        }
        if self.inputs[input_index].previous_output.validation.cache.is_none() {
            return Err(ConsensusError::MissingPreviousOutput);
        }

        trace!("verifying input {} at height {}", input_index, state.height);
        interpreter::verify(self, input_index as u32, state.enabled_forks)
    }
}
