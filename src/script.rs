//! Scripts: raw bytes with a lazily parsed operation list
//!
//! A script keeps the bytes it was read from, so serialization always
//! reproduces the input exactly. Operations are parsed on first use and
//! memoized; the parse is shared by every clone made after it.

use crate::cache::Memo;
use crate::chain_state::forks;
use crate::constants::*;
use crate::interpreter::is_enabled;
use crate::number;
use crate::opcode::*;
use crate::operation::{prefixed_size, Operation};
use crate::serialization::{Reader, Writer};
use crate::types::{DataChunk, Endorsement, ShortHash};
use secp256k1::PublicKey;
use std::sync::Arc;

/// Structural classification of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptPattern {
    NullData,
    PayPublicKey,
    PayKeyHash,
    PayScriptHash,
    PayMultisig,
    SignPublicKey,
    SignKeyHash,
    SignScriptHash,
    SignMultisig,
    NonStandard,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    bytes: DataChunk,
    valid: bool,
    operations: Memo<Arc<Vec<Operation>>>,
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Script {}

impl Script {
    /// Empty and invalid until read or built from operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `operations`. An operation whose push length disagrees with
    /// its data ends the script: a push opcode is written bare, so it reads
    /// back as a truncated push. Any other inconsistent operation has no
    /// encoding and yields an invalid script.
    pub fn from_operations(operations: Vec<Operation>) -> Self {
        let mut writer = Writer::new();
        let first_invalid = operations.iter().position(|op| !op.is_valid());

        for operation in &operations[..first_invalid.unwrap_or(operations.len())] {
            operation.write(&mut writer);
        }

        let cached = match first_invalid.map(|index| operations[index].code()) {
            None => Some(operations),
            Some(code) if code != OP_0 && is_payload(code) => {
                writer.write_u8(code);
                None
            }
            Some(_) => return Script::new(),
        };

        let script = Script {
            bytes: writer.into_inner(),
            valid: true,
            operations: Memo::new(),
        };
        // Otherwise parsed from the bytes on first use.
        if let Some(operations) = cached {
            script.operations.set(Arc::new(operations));
        }
        script
    }

    /// Script from bytes; check `is_valid()` for the outcome.
    pub fn factory(bytes: &[u8], prefix: bool) -> Self {
        let mut script = Script::new();
        script.from_data(bytes, prefix);
        script
    }

    /// Parse whitespace separated operation mnemonics.
    pub fn from_string(mnemonic: &str) -> Option<Script> {
        let operations = mnemonic
            .split_whitespace()
            .map(Operation::from_string)
            .collect::<Option<Vec<_>>>()?;
        Some(Script::from_operations(operations))
    }

    pub fn from_data(&mut self, bytes: &[u8], prefix: bool) -> bool {
        let mut reader = Reader::new(bytes);
        self.read(&mut reader, prefix)
    }

    /// Read from a stream. With `prefix` the script is length delimited,
    /// otherwise it consumes the rest of the reader.
    pub fn read(&mut self, reader: &mut Reader<'_>, prefix: bool) -> bool {
        self.reset();

        let bytes = if prefix {
            match reader.read_var_bytes() {
                Ok(bytes) => bytes,
                Err(_) => return false,
            }
        } else {
            reader.read_remaining()
        };

        self.bytes = bytes.to_vec();
        self.valid = true;
        true
    }

    pub fn to_data(&self, prefix: bool) -> DataChunk {
        let mut writer = Writer::with_capacity(self.serialized_size(prefix));
        self.write(&mut writer, prefix);
        writer.into_inner()
    }

    pub fn write(&self, writer: &mut Writer, prefix: bool) {
        if prefix {
            writer.write_var_bytes(&self.bytes);
        } else {
            writer.write_bytes(&self.bytes);
        }
    }

    pub fn serialized_size(&self, prefix: bool) -> usize {
        prefixed_size(self.bytes.len(), prefix)
    }

    /// Script length without the size prefix.
    pub fn satoshi_content_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_string(&self, active_forks: u32) -> String {
        self.operations()
            .iter()
            .map(|operation| operation.to_string(active_forks))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Every operation parsed completely with a consistent push length.
    pub fn is_valid_operations(&self) -> bool {
        self.operations().iter().all(Operation::is_valid)
    }

    /// Parsed operations. An invalid script has none.
    pub fn operations(&self) -> Arc<Vec<Operation>> {
        self.operations
            .get_or_compute(|| Arc::new(parse_operations(self.valid, &self.bytes)))
    }

    pub(crate) fn operations_memo(&self) -> &Memo<Arc<Vec<Operation>>> {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn op(&self, index: usize) -> Option<Operation> {
        self.operations().get(index).cloned()
    }

    pub(crate) fn reset(&mut self) {
        self.bytes.clear();
        self.valid = false;
        self.operations.reset();
    }

    // Patterns.

    pub fn pattern(&self) -> ScriptPattern {
        match self.output_pattern() {
            ScriptPattern::NonStandard => self.input_pattern(),
            pattern => pattern,
        }
    }

    pub fn output_pattern(&self) -> ScriptPattern {
        let ops = self.operations();

        if Self::is_null_data_pattern(&ops) {
            ScriptPattern::NullData
        } else if Self::is_pay_multisig_pattern(&ops) {
            ScriptPattern::PayMultisig
        } else if Self::is_pay_public_key_pattern(&ops) {
            ScriptPattern::PayPublicKey
        } else if Self::is_pay_key_hash_pattern(&ops) {
            ScriptPattern::PayKeyHash
        } else if Self::is_pay_script_hash_pattern(&ops) {
            ScriptPattern::PayScriptHash
        } else {
            ScriptPattern::NonStandard
        }
    }

    pub fn input_pattern(&self) -> ScriptPattern {
        let ops = self.operations();

        if Self::is_sign_script_hash_pattern(&ops) {
            ScriptPattern::SignScriptHash
        } else if Self::is_sign_multisig_pattern(&ops) {
            ScriptPattern::SignMultisig
        } else if Self::is_sign_public_key_pattern(&ops) {
            ScriptPattern::SignPublicKey
        } else if Self::is_sign_key_hash_pattern(&ops) {
            ScriptPattern::SignKeyHash
        } else {
            ScriptPattern::NonStandard
        }
    }

    pub fn is_push_only(ops: &[Operation]) -> bool {
        ops.iter().all(Operation::is_push)
    }

    /// Push-only, also admitting `OP_RESERVED`.
    pub fn is_relaxed_push(ops: &[Operation]) -> bool {
        ops.iter().all(Operation::is_relaxed_push)
    }

    /// The first push commits to the block height (BIP34).
    pub fn is_coinbase_pattern(ops: &[Operation], height: usize) -> bool {
        match ops.first() {
            Some(first) => first.is_push() && first.data() == number::encode(height as i64).as_slice(),
            None => false,
        }
    }

    pub fn is_null_data_pattern(ops: &[Operation]) -> bool {
        ops.len() == 2
            && ops[0].code() == OP_RETURN
            && ops[1].is_push()
            && ops[1].data().len() <= MAX_NULL_DATA_SIZE
    }

    pub fn is_pay_multisig_pattern(ops: &[Operation]) -> bool {
        let count = ops.len();
        if count < 4 || ops[count - 1].code() != OP_CHECKMULTISIG {
            return false;
        }

        let (required, keys) = match (
            opcode_to_positive(ops[0].code()),
            opcode_to_positive(ops[count - 2].code()),
        ) {
            (Some(required), Some(keys)) => (required as usize, keys as usize),
            _ => return false,
        };

        if required > keys || keys != count - 3 {
            return false;
        }

        ops[1..count - 2]
            .iter()
            .all(|op| is_public_key(op.data()))
    }

    pub fn is_pay_public_key_pattern(ops: &[Operation]) -> bool {
        ops.len() == 2
            && ops[0].is_push()
            && is_public_key(ops[0].data())
            && ops[1].code() == OP_CHECKSIG
    }

    pub fn is_pay_key_hash_pattern(ops: &[Operation]) -> bool {
        ops.len() == 5
            && ops[0].code() == OP_DUP
            && ops[1].code() == OP_HASH160
            && ops[2].code() == OP_PUSHBYTES_20
            && ops[2].data().len() == 20
            && ops[3].code() == OP_EQUALVERIFY
            && ops[4].code() == OP_CHECKSIG
    }

    pub fn is_pay_script_hash_pattern(ops: &[Operation]) -> bool {
        ops.len() == 3
            && ops[0].code() == OP_HASH160
            && ops[1].code() == OP_PUSHBYTES_20
            && ops[1].data().len() == 20
            && ops[2].code() == OP_EQUAL
    }

    /// `OP_0` (the multisig dummy) followed by pushes.
    pub fn is_sign_multisig_pattern(ops: &[Operation]) -> bool {
        ops.len() >= 2 && Self::is_push_only(ops) && ops[0].code() == OP_0
    }

    pub fn is_sign_public_key_pattern(ops: &[Operation]) -> bool {
        ops.len() == 1 && Self::is_push_only(ops)
    }

    pub fn is_sign_key_hash_pattern(ops: &[Operation]) -> bool {
        ops.len() == 2 && Self::is_push_only(ops) && is_public_key(ops[1].data())
    }

    /// Pushes whose last item parses as a standard output script.
    pub fn is_sign_script_hash_pattern(ops: &[Operation]) -> bool {
        if ops.len() < 2 || !Self::is_push_only(ops) {
            return false;
        }

        let redeem_data = ops[ops.len() - 1].data();
        if redeem_data.is_empty() {
            return false;
        }

        let redeem = Script::factory(redeem_data, false);
        matches!(
            redeem.output_pattern(),
            ScriptPattern::PayMultisig
                | ScriptPattern::PayPublicKey
                | ScriptPattern::PayKeyHash
                | ScriptPattern::PayScriptHash
                | ScriptPattern::NullData
        )
    }

    /// Empty when `data` exceeds the null-data limit.
    pub fn to_null_data_pattern(data: &[u8]) -> Vec<Operation> {
        if data.len() > MAX_NULL_DATA_SIZE {
            return Vec::new();
        }

        vec![
            Operation::new(OP_RETURN),
            Operation::from_data(data.to_vec(), false),
        ]
    }

    /// Empty when `point` is not a public key encoding.
    pub fn to_pay_public_key_pattern(point: &[u8]) -> Vec<Operation> {
        if !is_public_key(point) {
            return Vec::new();
        }

        vec![
            Operation::from_data(point.to_vec(), false),
            Operation::new(OP_CHECKSIG),
        ]
    }

    pub fn to_pay_key_hash_pattern(hash: &ShortHash) -> Vec<Operation> {
        vec![
            Operation::new(OP_DUP),
            Operation::new(OP_HASH160),
            Operation::from_data(hash.to_vec(), false),
            Operation::new(OP_EQUALVERIFY),
            Operation::new(OP_CHECKSIG),
        ]
    }

    pub fn to_pay_script_hash_pattern(hash: &ShortHash) -> Vec<Operation> {
        vec![
            Operation::new(OP_HASH160),
            Operation::from_data(hash.to_vec(), false),
            Operation::new(OP_EQUAL),
        ]
    }

    /// m-of-n multisig output. Empty unless `1 <= m <= n <= 16` and every
    /// point is a public key encoding.
    pub fn to_pay_multisig_pattern(signatures: u8, points: &[DataChunk]) -> Vec<Operation> {
        let (required, keys) = match (
            opcode_from_positive(signatures),
            u8::try_from(points.len()).ok().and_then(opcode_from_positive),
        ) {
            (Some(required), Some(keys)) if signatures as usize <= points.len() => {
                (required, keys)
            }
            _ => return Vec::new(),
        };

        let mut ops = Vec::with_capacity(points.len() + 3);
        ops.push(Operation::new(required));
        for point in points {
            if !is_public_key(point) {
                return Vec::new();
            }
            ops.push(Operation::from_data(point.clone(), false));
        }
        ops.push(Operation::new(keys));
        ops.push(Operation::new(OP_CHECKMULTISIG));
        ops
    }

    pub fn to_pay_multisig_pattern_from_keys(signatures: u8, keys: &[PublicKey]) -> Vec<Operation> {
        let points = keys
            .iter()
            .map(|key| key.serialize().to_vec())
            .collect::<Vec<_>>();
        Self::to_pay_multisig_pattern(signatures, &points)
    }

    // Signature operations.

    /// Count signature operations. Multisig counts its declared key count
    /// when `accurate` and the preceding op is `OP_1..OP_16`, otherwise the
    /// worst case of twenty.
    pub fn sigops(&self, accurate: bool) -> usize {
        let mut total = 0;
        let mut preceding = OP_0;

        for op in self.operations().iter() {
            match op.code() {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => total += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    total += match opcode_to_positive(preceding) {
                        Some(keys) if accurate => keys as usize,
                        _ => MULTISIG_DEFAULT_SIGOPS,
                    };
                }
                _ => {}
            }
            preceding = op.code();
        }

        total
    }

    /// Sigops of the redeem script this input script carries when it spends
    /// a pay-to-script-hash output.
    pub fn embedded_sigops(&self, prevout_script: &Script) -> usize {
        if !Self::is_pay_script_hash_pattern(&prevout_script.operations()) {
            return 0;
        }

        let ops = self.operations();
        match ops.last() {
            Some(last) if Self::is_relaxed_push(&ops) => {
                Script::factory(last.data(), false).sigops(true)
            }
            _ => 0,
        }
    }

    /// Remove every push of any of `endorsements` found at an operation
    /// boundary. Bytes are rewritten; the operation cache is dropped.
    pub(crate) fn find_and_delete(&mut self, endorsements: &[Endorsement]) {
        let mut found = false;
        for endorsement in endorsements {
            let pattern = Operation::from_data(endorsement.clone(), false).to_data();
            found |= self.find_and_delete_pattern(&pattern);
        }

        if found {
            self.operations.reset();
        }
    }

    fn find_and_delete_pattern(&mut self, pattern: &[u8]) -> bool {
        if pattern.is_empty() {
            return false;
        }

        let bytes = &self.bytes;
        let mut result = Vec::with_capacity(bytes.len());
        let mut found = false;
        let mut pc = 0;
        let mut copied = 0;

        loop {
            result.extend_from_slice(&bytes[copied..pc]);
            while bytes[pc..].starts_with(pattern) {
                pc += pattern.len();
                found = true;
            }
            copied = pc;

            match next_operation(bytes, pc) {
                Some(next) => pc = next,
                None => break,
            }
        }

        if found {
            result.extend_from_slice(&bytes[copied..]);
            self.bytes = result;
        }

        found
    }

    /// Copy without `OP_CODESEPARATOR`s. A truncated trailing push is kept
    /// byte for byte.
    pub(crate) fn strip_code_separators(&self) -> Script {
        let bytes = &self.bytes;
        let mut result = Vec::with_capacity(bytes.len());
        let mut pc = 0;

        while pc < bytes.len() {
            match next_operation(bytes, pc) {
                Some(next) => {
                    if bytes[pc] != OP_CODESEPARATOR {
                        result.extend_from_slice(&bytes[pc..next]);
                    }
                    pc = next;
                }
                None => {
                    result.extend_from_slice(&bytes[pc..]);
                    break;
                }
            }
        }

        Script {
            bytes: result,
            valid: self.valid,
            operations: Memo::new(),
        }
    }

    // Validation.

    /// Provably unspendable: starts with `OP_RETURN` or exceeds the size limit.
    pub fn is_unspendable(&self) -> bool {
        self.bytes.len() > MAX_SCRIPT_SIZE || self.bytes.first() == Some(&OP_RETURN)
    }

    pub fn is_pay_to_script_hash(&self, active_forks: u32) -> bool {
        is_enabled(active_forks, forks::BIP16_RULE)
            && Self::is_pay_script_hash_pattern(&self.operations())
    }
}

/// Public key encoding by size and leading byte.
pub fn is_public_key(data: &[u8]) -> bool {
    match data.len() {
        COMPRESSED_KEY_SIZE => data[0] == 0x02 || data[0] == 0x03,
        UNCOMPRESSED_KEY_SIZE => data[0] == 0x04,
        _ => false,
    }
}

fn parse_operations(valid: bool, bytes: &[u8]) -> Vec<Operation> {
    let mut ops = Vec::new();
    if !valid {
        return ops;
    }

    let mut reader = Reader::new(bytes);
    while !reader.is_exhausted() {
        match Operation::read(&mut reader) {
            Ok(op) => ops.push(op),
            Err(_) => break,
        }
    }
    ops
}

/// Offset just past the operation at `pc`, or `None` at the end of the
/// script or for a truncated push.
fn next_operation(bytes: &[u8], pc: usize) -> Option<usize> {
    let code = *bytes.get(pc)?;
    let mut reader = Reader::new(&bytes[pc + 1..]);

    let size = match code {
        OP_PUSHDATA1 => reader.read_u8().ok()? as usize,
        OP_PUSHDATA2 => reader.read_u16().ok()? as usize,
        OP_PUSHDATA4 => reader.read_u32().ok()? as usize,
        code if code <= OP_PUSHBYTES_75 => code as usize,
        _ => 0,
    };

    reader.read_bytes(size).ok()?;
    Some(pc + 1 + reader.position())
}
