//! Script evaluation
//!
//! A `Program` runs one script over a data stack. `verify` chains the input
//! script, the previous output script and, for pay-to-script-hash, the
//! redeem script carried by the input.

use crate::chain_state::forks;
use crate::constants::*;
use crate::error::{Code, ConsensusError, Result};
use crate::hash::{bitcoin_hash, bitcoin_short_hash, ripemd160, sha1, sha256};
use crate::number;
use crate::opcode::*;
use crate::operation::Operation;
use crate::script::Script;
use crate::signature::{check_signature, is_valid_signature_encoding, parse_signature};
use crate::transaction::Transaction;
use crate::types::{DataChunk, DataStack};
use log::trace;

/// Whether `fork` is among `active_forks`.
pub fn is_enabled(active_forks: u32, fork: u32) -> bool {
    fork & active_forks != 0
}

/// Verify input `input_index` of `tx` against its populated previous output.
pub fn verify(tx: &Transaction, input_index: u32, active_forks: u32) -> Code {
    let input = tx
        .inputs()
        .get(input_index as usize)
        .ok_or(ConsensusError::InvalidInput)?;
    let prevout = input
        .previous_output
        .validation
        .cache
        .as_ref()
        .ok_or(ConsensusError::MissingPreviousOutput)?;

    verify_scripts(tx, input_index, active_forks, &input.script, &prevout.script)
}

/// Run `input_script`, then `prevout_script` on the resulting stack, then
/// the embedded redeem script when `prevout_script` is pay-to-script-hash
/// and BIP16 is active.
pub fn verify_scripts(
    tx: &Transaction,
    input_index: u32,
    active_forks: u32,
    input_script: &Script,
    prevout_script: &Script,
) -> Code {
    let result = run_stages(tx, input_index, active_forks, input_script, prevout_script);
    if let Err(error) = &result {
        trace!("input {} failed script verification: {}", input_index, error);
    }
    result
}

fn run_stages(
    tx: &Transaction,
    input_index: u32,
    active_forks: u32,
    input_script: &Script,
    prevout_script: &Script,
) -> Code {
    let mut input = Program::new(input_script, tx, input_index, active_forks);
    input.evaluate()?;
    let stack = input.into_stack();

    let mut prevout = Program::with_stack(prevout_script, tx, input_index, active_forks, stack.clone());
    prevout.evaluate()?;
    if !prevout.stack_result() {
        return Err(ConsensusError::StackFalse);
    }

    if !prevout_script.is_pay_to_script_hash(active_forks) {
        return Ok(());
    }

    if !Script::is_relaxed_push(&input_script.operations()) {
        return Err(ConsensusError::InvalidScriptEmbed);
    }

    // The serialized redeem script is the last item the input pushed.
    let mut stack = stack;
    let redeem_data = stack.pop().ok_or(ConsensusError::InvalidScriptEmbed)?;
    let redeem = Script::factory(&redeem_data, false);

    let mut embedded = Program::with_stack(&redeem, tx, input_index, active_forks, stack);
    embedded
        .evaluate()
        .map_err(|error| ConsensusError::EmbeddedScript(Box::new(error)))?;
    if !embedded.stack_result() {
        return Err(ConsensusError::EmbeddedStackFalse);
    }

    Ok(())
}

/// Evaluation state of one script.
pub struct Program<'a> {
    script: &'a Script,
    tx: &'a Transaction,
    input_index: u32,
    forks: u32,
    primary: DataStack,
    alternate: DataStack,
    condition: Vec<bool>,
    operation_count: usize,
    /// First operation of the signature script code.
    jump: usize,
}

impl<'a> Program<'a> {
    pub fn new(script: &'a Script, tx: &'a Transaction, input_index: u32, forks: u32) -> Self {
        Self::with_stack(script, tx, input_index, forks, Vec::new())
    }

    pub fn with_stack(
        script: &'a Script,
        tx: &'a Transaction,
        input_index: u32,
        forks: u32,
        stack: DataStack,
    ) -> Self {
        Program {
            script,
            tx,
            input_index,
            forks,
            primary: stack,
            alternate: Vec::new(),
            condition: Vec::new(),
            operation_count: 0,
            jump: 0,
        }
    }

    pub fn stack(&self) -> &DataStack {
        &self.primary
    }

    pub fn into_stack(self) -> DataStack {
        self.primary
    }

    /// Top of the stack is true.
    pub fn stack_result(&self) -> bool {
        self.primary.last().map_or(false, |top| number::cast_to_bool(top))
    }

    /// Execute every operation.
    ///
    /// Fails if:
    /// 1. the script exceeds `MAX_SCRIPT_SIZE` or holds a malformed push
    /// 2. a push exceeds `MAX_PUSH_DATA_SIZE`
    /// 3. more than `MAX_SCRIPT_OPS` counted operations appear
    /// 4. a disabled opcode or `OP_VERIF`/`OP_VERNOTIF` appears anywhere,
    ///    executed or not
    /// 5. an executed operation fails
    /// 6. the stacks together exceed `MAX_STACK_SIZE`
    /// 7. a conditional is left open
    pub fn evaluate(&mut self) -> Code {
        if self.script.satoshi_content_size() > MAX_SCRIPT_SIZE {
            return Err(ConsensusError::InvalidScriptSize);
        }
        if !self.script.is_valid() || !self.script.is_valid_operations() {
            return Err(ConsensusError::InvalidScript);
        }

        let ops = self.script.operations();
        for (index, op) in ops.iter().enumerate() {
            if op.is_oversized() {
                return Err(ConsensusError::InvalidPushDataSize);
            }

            if op.is_counted() {
                self.operation_count += 1;
                if self.operation_count > MAX_SCRIPT_OPS {
                    return Err(ConsensusError::InvalidOperationCount);
                }
            }

            if op.is_disabled() {
                return Err(ConsensusError::OpDisabled);
            }
            if op.code() == OP_VERIF || op.code() == OP_VERNOTIF {
                return Err(ConsensusError::OpReserved);
            }

            let executing = self.condition.iter().all(|&branch| branch);
            if executing || op.is_conditional() {
                self.execute(index, op, executing)?;
            }

            if self.primary.len() + self.alternate.len() > MAX_STACK_SIZE {
                return Err(ConsensusError::InvalidStackSize);
            }
        }

        if !self.condition.is_empty() {
            return Err(ConsensusError::InvalidStackScope);
        }

        Ok(())
    }

    fn execute(&mut self, index: usize, op: &Operation, executing: bool) -> Code {
        let code = op.code();
        match code {
            // Data pushes
            OP_0..=OP_PUSHDATA4 => {
                self.primary.push(op.data().to_vec());
            }
            OP_1NEGATE => self.primary.push(number::encode(-1)),
            OP_1..=OP_16 => self.primary.push(number::encode((code - OP_1 + 1) as i64)),

            // Flow control
            OP_NOP | OP_NOP1 | OP_NOP4..=OP_NOP10 => {}
            OP_CHECKLOCKTIMEVERIFY => {
                if is_enabled(self.forks, forks::BIP65_RULE) {
                    self.check_locktime_verify()?;
                }
            }
            OP_CHECKSEQUENCEVERIFY => {
                if is_enabled(self.forks, forks::BIP112_RULE) {
                    self.check_sequence_verify()?;
                }
            }
            OP_IF | OP_NOTIF => {
                let mut value = false;
                if executing {
                    value = number::cast_to_bool(&self.pop()?);
                    if code == OP_NOTIF {
                        value = !value;
                    }
                }
                self.condition.push(value);
            }
            OP_ELSE => {
                let branch = self
                    .condition
                    .last_mut()
                    .ok_or(ConsensusError::InvalidStackScope)?;
                *branch = !*branch;
            }
            OP_ENDIF => {
                self.condition
                    .pop()
                    .ok_or(ConsensusError::InvalidStackScope)?;
            }
            OP_VERIFY => {
                if !number::cast_to_bool(&self.pop()?) {
                    return Err(ConsensusError::OpVerify);
                }
            }
            OP_RETURN => return Err(ConsensusError::OpReturn),

            // Stack
            OP_TOALTSTACK => {
                let item = self.pop()?;
                self.alternate.push(item);
            }
            OP_FROMALTSTACK => {
                let item = self
                    .alternate
                    .pop()
                    .ok_or(ConsensusError::InsufficientStack)?;
                self.primary.push(item);
            }
            OP_2DROP => {
                self.require(2)?;
                self.primary.truncate(self.primary.len() - 2);
            }
            OP_2DUP => {
                self.require(2)?;
                let len = self.primary.len();
                self.primary.extend_from_within(len - 2..);
            }
            OP_3DUP => {
                self.require(3)?;
                let len = self.primary.len();
                self.primary.extend_from_within(len - 3..);
            }
            OP_2OVER => {
                self.require(4)?;
                let len = self.primary.len();
                self.primary.extend_from_within(len - 4..len - 2);
            }
            OP_2ROT => {
                self.require(6)?;
                let start = self.primary.len() - 6;
                let first = self.primary.remove(start);
                let second = self.primary.remove(start);
                self.primary.push(first);
                self.primary.push(second);
            }
            OP_2SWAP => {
                self.require(4)?;
                let len = self.primary.len();
                self.primary.swap(len - 4, len - 2);
                self.primary.swap(len - 3, len - 1);
            }
            OP_IFDUP => {
                let top = self.top(0)?.clone();
                if number::cast_to_bool(&top) {
                    self.primary.push(top);
                }
            }
            OP_DEPTH => {
                let depth = self.primary.len() as i64;
                self.primary.push(number::encode(depth));
            }
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                let top = self.top(0)?.clone();
                self.primary.push(top);
            }
            OP_NIP => {
                self.require(2)?;
                let len = self.primary.len();
                self.primary.remove(len - 2);
            }
            OP_OVER => {
                let second = self.top(1)?.clone();
                self.primary.push(second);
            }
            OP_PICK | OP_ROLL => {
                let depth = self.pop_number()?;
                if depth < 0 || depth as usize >= self.primary.len() {
                    return Err(ConsensusError::InsufficientStack);
                }
                let position = self.primary.len() - 1 - depth as usize;
                let item = if code == OP_ROLL {
                    self.primary.remove(position)
                } else {
                    self.primary[position].clone()
                };
                self.primary.push(item);
            }
            OP_ROT => {
                self.require(3)?;
                let len = self.primary.len();
                let third = self.primary.remove(len - 3);
                self.primary.push(third);
            }
            OP_SWAP => {
                self.require(2)?;
                let len = self.primary.len();
                self.primary.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                self.require(2)?;
                let top = self.top(0)?.clone();
                let len = self.primary.len();
                self.primary.insert(len - 2, top);
            }

            // Splice
            OP_SIZE => {
                let size = self.top(0)?.len() as i64;
                self.primary.push(number::encode(size));
            }

            // Bitwise logic
            OP_EQUAL | OP_EQUALVERIFY => {
                let a = self.pop()?;
                let b = self.pop()?;
                if code == OP_EQUALVERIFY {
                    if a != b {
                        return Err(ConsensusError::OpEqualVerify);
                    }
                } else {
                    self.push_bool(a == b);
                }
            }

            // Arithmetic
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let value = self.pop_number()?;
                let result = match code {
                    OP_1ADD => value + 1,
                    OP_1SUB => value - 1,
                    OP_NEGATE => -value,
                    OP_ABS => value.abs(),
                    OP_NOT => (value == 0) as i64,
                    _ => (value != 0) as i64,
                };
                self.primary.push(number::encode(result));
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
            | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
            | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                let b = self.pop_number()?;
                let a = self.pop_number()?;
                let result = match code {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };

                if code == OP_NUMEQUALVERIFY {
                    if result == 0 {
                        return Err(ConsensusError::OpNumEqualVerify);
                    }
                } else {
                    self.primary.push(number::encode(result));
                }
            }
            OP_WITHIN => {
                let maximum = self.pop_number()?;
                let minimum = self.pop_number()?;
                let value = self.pop_number()?;
                self.push_bool(minimum <= value && value < maximum);
            }

            // Crypto
            OP_RIPEMD160 => {
                let item = self.pop()?;
                self.primary.push(ripemd160(&item).to_vec());
            }
            OP_SHA1 => {
                let item = self.pop()?;
                self.primary.push(sha1(&item).to_vec());
            }
            OP_SHA256 => {
                let item = self.pop()?;
                self.primary.push(sha256(&item).to_vec());
            }
            OP_HASH160 => {
                let item = self.pop()?;
                self.primary.push(bitcoin_short_hash(&item).to_vec());
            }
            OP_HASH256 => {
                let item = self.pop()?;
                self.primary.push(bitcoin_hash(&item).to_vec());
            }
            OP_CODESEPARATOR => self.jump = index + 1,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let public_key = self.pop()?;
                let endorsement = self.pop()?;

                let mut script_code = self.subscript();
                script_code.find_and_delete(std::slice::from_ref(&endorsement));
                let valid = self.check_endorsement(&endorsement, &public_key, &script_code)?;

                if code == OP_CHECKSIGVERIFY {
                    if !valid {
                        return Err(ConsensusError::OpCheckSigVerify);
                    }
                } else {
                    self.push_bool(valid);
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let valid = self.check_multisig()?;
                if code == OP_CHECKMULTISIGVERIFY {
                    if !valid {
                        return Err(ConsensusError::OpCheckMultisigVerify);
                    }
                } else {
                    self.push_bool(valid);
                }
            }

            // OP_RESERVED, OP_VER, OP_RESERVED1, OP_RESERVED2 and unassigned codes
            _ => return Err(ConsensusError::OpReserved),
        }

        Ok(())
    }

    fn check_multisig(&mut self) -> Result<bool> {
        let key_count = self.pop_number()?;
        if key_count < 0 || key_count as usize > MAX_SCRIPT_PUBLIC_KEYS {
            return Err(ConsensusError::InvalidMultisigKeyCount);
        }

        self.operation_count += key_count as usize;
        if self.operation_count > MAX_SCRIPT_OPS {
            return Err(ConsensusError::InvalidOperationCount);
        }

        // Both lists come off the stack top first.
        let keys = self.pop_many(key_count as usize)?;

        let signature_count = self.pop_number()?;
        if signature_count < 0 || signature_count > key_count {
            return Err(ConsensusError::InvalidMultisigSignatureCount);
        }
        let endorsements = self.pop_many(signature_count as usize)?;

        // Dummy element consumed by the legacy off-by-one.
        self.pop()?;

        let mut script_code = self.subscript();
        script_code.find_and_delete(&endorsements);

        let mut key = keys.iter();
        for endorsement in &endorsements {
            loop {
                let public_key = match key.next() {
                    Some(public_key) => public_key,
                    None => return Ok(false),
                };
                if self.check_endorsement(endorsement, public_key, &script_code)? {
                    break;
                }
            }
        }

        Ok(true)
    }

    /// Signature check of one endorsement. Encoding errors under BIP66 fail
    /// evaluation; any other mismatch is a false result.
    fn check_endorsement(&self, endorsement: &[u8], public_key: &[u8], script_code: &Script) -> Result<bool> {
        let Some((&sighash_type, der)) = endorsement.split_last() else {
            return Ok(false);
        };

        let strict = is_enabled(self.forks, forks::BIP66_RULE);
        if strict && !is_valid_signature_encoding(endorsement) {
            return Err(ConsensusError::InvalidSignatureEncoding);
        }

        let signature = match parse_signature(der, strict) {
            Some(signature) => signature,
            None => return Ok(false),
        };

        Ok(check_signature(
            &signature,
            sighash_type,
            public_key,
            script_code,
            self.tx,
            self.input_index,
        ))
    }

    /// BIP65: the spending transaction's lock time reaches the operand.
    fn check_locktime_verify(&self) -> Code {
        let operand = number::decode(self.top(0)?, MAX_CHECK_LOCKTIME_VERIFY_NUMBER_SIZE)?;
        if operand < 0 {
            return Err(ConsensusError::OpCheckLocktimeVerify);
        }

        let locktime = self.tx.locktime() as i64;
        let threshold = LOCKTIME_THRESHOLD as i64;
        let same_kind = (locktime < threshold) == (operand < threshold);
        if !same_kind || operand > locktime {
            return Err(ConsensusError::OpCheckLocktimeVerify);
        }

        // A final input would disable the lock time.
        if self.input().map_or(true, |input| input.is_final()) {
            return Err(ConsensusError::OpCheckLocktimeVerify);
        }

        Ok(())
    }

    /// BIP112: the input's relative lock time reaches the operand.
    fn check_sequence_verify(&self) -> Code {
        let operand = number::decode(self.top(0)?, MAX_CHECK_LOCKTIME_VERIFY_NUMBER_SIZE)?;
        if operand < 0 {
            return Err(ConsensusError::OpCheckSequenceVerify);
        }

        let operand = operand as u64;
        if operand & RELATIVE_LOCKTIME_DISABLED as u64 != 0 {
            return Ok(());
        }

        if self.tx.version() < RELATIVE_LOCKTIME_MIN_VERSION {
            return Err(ConsensusError::OpCheckSequenceVerify);
        }

        let sequence = self
            .input()
            .map(|input| input.sequence)
            .ok_or(ConsensusError::OpCheckSequenceVerify)?;
        if sequence & RELATIVE_LOCKTIME_DISABLED != 0 {
            return Err(ConsensusError::OpCheckSequenceVerify);
        }

        let mask = (RELATIVE_LOCKTIME_TIME_LOCKED | RELATIVE_LOCKTIME_MASK) as u64;
        let required = operand & mask;
        let actual = sequence as u64 & mask;
        let time_locked = RELATIVE_LOCKTIME_TIME_LOCKED as u64;

        let same_kind = (required < time_locked) == (actual < time_locked);
        if !same_kind || required > actual {
            return Err(ConsensusError::OpCheckSequenceVerify);
        }

        Ok(())
    }

    fn input(&self) -> Option<&crate::transaction::Input> {
        self.tx.inputs().get(self.input_index as usize)
    }

    /// Operations after the last executed `OP_CODESEPARATOR`.
    fn subscript(&self) -> Script {
        let ops = self.script.operations();
        Script::from_operations(ops[self.jump.min(ops.len())..].to_vec())
    }

    fn require(&self, count: usize) -> Code {
        if self.primary.len() < count {
            return Err(ConsensusError::InsufficientStack);
        }
        Ok(())
    }

    fn top(&self, depth: usize) -> Result<&DataChunk> {
        self.require(depth + 1)?;
        Ok(&self.primary[self.primary.len() - 1 - depth])
    }

    fn pop(&mut self) -> Result<DataChunk> {
        self.primary.pop().ok_or(ConsensusError::InsufficientStack)
    }

    fn pop_many(&mut self, count: usize) -> Result<DataStack> {
        self.require(count)?;
        let split = self.primary.len() - count;
        let mut items = self.primary.split_off(split);
        items.reverse();
        Ok(items)
    }

    fn pop_number(&mut self) -> Result<i64> {
        number::decode_default(&self.pop()?)
    }

    fn push_bool(&mut self, value: bool) {
        self.primary.push(if value { vec![1] } else { Vec::new() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::signature::{create_endorsement, SIGHASH_ALL};
    use crate::transaction::{Input, Output, OutputPoint, PointValidation};
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    fn dummy_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input::new(OutputPoint::new([7; 32], 0), Script::new(), 0)],
            vec![Output::new(1, Script::new())],
            0,
        )
    }

    fn script(mnemonic: &str) -> Script {
        Script::from_string(mnemonic).unwrap()
    }

    fn run(mnemonic: &str, forks: u32) -> (Code, DataStack) {
        let tx = dummy_tx();
        let script = script(mnemonic);
        let mut program = Program::new(&script, &tx, 0, forks);
        let result = program.evaluate();
        (result, program.into_stack())
    }

    fn evaluates_true(mnemonic: &str) -> bool {
        let tx = dummy_tx();
        let script = script(mnemonic);
        let mut program = Program::new(&script, &tx, 0, 0);
        program.evaluate().is_ok() && program.stack_result()
    }

    #[test]
    fn test_is_enabled() {
        assert!(is_enabled(forks::ALL_RULES, forks::BIP16_RULE));
        assert!(!is_enabled(forks::BIP65_RULE, forks::BIP16_RULE));
    }

    #[test]
    fn test_push_and_arithmetic() {
        assert!(evaluates_true("2 3 add 5 numequal"));
        assert!(evaluates_true("7 3 sub 4 equal"));
        assert!(evaluates_true("-1 abs 1 numequal"));
        assert!(evaluates_true("0 not"));
        assert!(evaluates_true("3 2 5 within"));
        assert!(!evaluates_true("5 2 5 within"));
        assert!(evaluates_true("9 4 max 9 numequal"));
        assert!(evaluates_true("1000 1000 numequal"));
    }

    #[test]
    fn test_stack_operations() {
        let (result, stack) = run("1 2 3 rot", 0);
        assert!(result.is_ok());
        assert_eq!(stack, vec![vec![2], vec![3], vec![1]]);

        let (_, stack) = run("1 2 3 4 5 6 2rot", 0);
        assert_eq!(stack, vec![vec![3], vec![4], vec![5], vec![6], vec![1], vec![2]]);

        let (_, stack) = run("1 2 3 4 2swap", 0);
        assert_eq!(stack, vec![vec![3], vec![4], vec![1], vec![2]]);

        let (_, stack) = run("1 2 tuck", 0);
        assert_eq!(stack, vec![vec![2], vec![1], vec![2]]);

        let (_, stack) = run("1 2 3 2 roll", 0);
        assert_eq!(stack, vec![vec![2], vec![3], vec![1]]);

        let (_, stack) = run("1 2 3 2 pick", 0);
        assert_eq!(stack, vec![vec![1], vec![2], vec![3], vec![1]]);

        let (_, stack) = run("1 toaltstack 2 fromaltstack", 0);
        assert_eq!(stack, vec![vec![2], vec![1]]);

        let (_, stack) = run("[abcd] size", 0);
        assert_eq!(stack, vec![vec![0xab, 0xcd], vec![2]]);
    }

    #[test]
    fn test_insufficient_stack() {
        assert_eq!(run("dup", 0).0, Err(ConsensusError::InsufficientStack));
        assert_eq!(run("1 swap", 0).0, Err(ConsensusError::InsufficientStack));
        assert_eq!(run("1 5 pick", 0).0, Err(ConsensusError::InsufficientStack));
        assert_eq!(run("fromaltstack", 0).0, Err(ConsensusError::InsufficientStack));
    }

    #[test]
    fn test_conditionals() {
        assert!(evaluates_true("1 if 1 else 0 endif"));
        assert!(!evaluates_true("0 if 1 else 0 endif"));
        assert!(evaluates_true("0 notif 1 endif"));
        assert!(evaluates_true("1 1 if if 1 endif endif"));
        assert_eq!(run("1 if 1", 0).0, Err(ConsensusError::InvalidStackScope));
        assert_eq!(run("else", 0).0, Err(ConsensusError::InvalidStackScope));
        assert_eq!(run("endif", 0).0, Err(ConsensusError::InvalidStackScope));
    }

    #[test]
    fn test_unexecuted_branches() {
        // Reserved opcodes only fail when executed.
        assert!(evaluates_true("0 if reserved endif 1"));
        assert_eq!(run("1 if reserved endif", 0).0, Err(ConsensusError::OpReserved));

        // Disabled opcodes and verif fail regardless.
        assert_eq!(run("0 if cat endif 1", 0).0, Err(ConsensusError::OpDisabled));
        assert_eq!(run("0 if verif endif 1", 0).0, Err(ConsensusError::OpReserved));
    }

    #[test]
    fn test_verify_family() {
        assert_eq!(run("0 verify", 0).0, Err(ConsensusError::OpVerify));
        assert_eq!(run("1 2 equalverify", 0).0, Err(ConsensusError::OpEqualVerify));
        assert_eq!(run("1 2 numequalverify", 0).0, Err(ConsensusError::OpNumEqualVerify));
        assert_eq!(run("1 return", 0).0, Err(ConsensusError::OpReturn));
        assert!(run("2 2 equalverify", 0).0.is_ok());
    }

    #[test]
    fn test_number_operand_limit() {
        assert_eq!(run("[0000000001] add1", 0).0, Err(ConsensusError::InvalidNumber));
    }

    #[test]
    fn test_hashes() {
        let (_, stack) = run("[] sha256", 0);
        assert_eq!(stack[0], sha256(&[]).to_vec());
        let (_, stack) = run("[01] hash160", 0);
        assert_eq!(stack[0].len(), 20);
        let (_, stack) = run("[01] hash256 size", 0);
        assert_eq!(stack[1], vec![32]);
    }

    #[test]
    fn test_operation_count_limit() {
        let at_limit = vec!["nop"; MAX_SCRIPT_OPS].join(" ");
        assert!(run(&format!("{} 1", at_limit), 0).0.is_ok());

        let over_limit = vec!["nop"; MAX_SCRIPT_OPS + 1].join(" ");
        assert_eq!(run(&over_limit, 0).0, Err(ConsensusError::InvalidOperationCount));
    }

    #[test]
    fn test_stack_size_limit() {
        let at_limit = vec!["1"; MAX_STACK_SIZE].join(" ");
        assert!(run(&at_limit, 0).0.is_ok());

        let over_limit = vec!["1"; MAX_STACK_SIZE + 1].join(" ");
        assert_eq!(run(&over_limit, 0).0, Err(ConsensusError::InvalidStackSize));
    }

    #[test]
    fn test_push_size_limit() {
        let push = Operation::from_data(vec![0; MAX_PUSH_DATA_SIZE + 1], false);
        let script = Script::from_operations(vec![push]);
        let tx = dummy_tx();
        let mut program = Program::new(&script, &tx, 0, 0);
        assert_eq!(program.evaluate(), Err(ConsensusError::InvalidPushDataSize));
    }

    #[test]
    fn test_malformed_script() {
        let script = Script::factory(&[OP_1, OP_PUSHBYTES_20, 0x00], false);
        let tx = dummy_tx();
        let mut program = Program::new(&script, &tx, 0, 0);
        assert_eq!(program.evaluate(), Err(ConsensusError::InvalidScript));
    }

    #[test]
    fn test_oversized_script() {
        let script = Script::factory(&vec![OP_NOP; MAX_SCRIPT_SIZE + 1], false);
        let tx = dummy_tx();
        let mut program = Program::new(&script, &tx, 0, 0);
        assert_eq!(program.evaluate(), Err(ConsensusError::InvalidScriptSize));
    }

    #[test]
    fn test_nop_upgrades_gated_by_fork() {
        // Lock time 0 with a one-block operand fails once BIP65 applies.
        assert!(run("1 nop2", 0).0.is_ok());
        assert_eq!(
            run("1 checklocktimeverify", forks::BIP65_RULE).0,
            Err(ConsensusError::OpCheckLocktimeVerify)
        );
        assert!(run("1 nop3", 0).0.is_ok());
        assert_eq!(
            run("1 checksequenceverify", forks::BIP112_RULE).0,
            Err(ConsensusError::OpCheckSequenceVerify)
        );
    }

    #[test]
    fn test_check_locktime_verify() {
        let script = script("[e803] checklocktimeverify");
        let mut tx = dummy_tx();
        tx.set_locktime(1000);
        let mut program = Program::new(&script, &tx, 0, forks::BIP65_RULE);
        assert!(program.evaluate().is_ok());

        tx.set_locktime(999);
        let mut program = Program::new(&script, &tx, 0, forks::BIP65_RULE);
        assert_eq!(program.evaluate(), Err(ConsensusError::OpCheckLocktimeVerify));

        // Timestamp lock time against a height operand.
        tx.set_locktime(LOCKTIME_THRESHOLD + 1);
        let mut program = Program::new(&script, &tx, 0, forks::BIP65_RULE);
        assert_eq!(program.evaluate(), Err(ConsensusError::OpCheckLocktimeVerify));
    }

    #[test]
    fn test_check_sequence_verify() {
        let script = script("10 checksequenceverify");
        let mut tx = dummy_tx();
        tx.set_version(2);
        let mut input = tx.inputs()[0].clone();
        input.sequence = 10;
        tx.set_inputs(vec![input.clone()]);

        let mut program = Program::new(&script, &tx, 0, forks::BIP112_RULE);
        assert!(program.evaluate().is_ok());

        input.sequence = 9;
        tx.set_inputs(vec![input]);
        let mut program = Program::new(&script, &tx, 0, forks::BIP112_RULE);
        assert_eq!(program.evaluate(), Err(ConsensusError::OpCheckSequenceVerify));

        tx.set_version(1);
        let mut program = Program::new(&script, &tx, 0, forks::BIP112_RULE);
        assert_eq!(program.evaluate(), Err(ConsensusError::OpCheckSequenceVerify));
    }

    #[test]
    fn test_check_sequence_verify_five_byte_operand() {
        let mut tx = dummy_tx();
        tx.set_version(2);
        let mut input = tx.inputs()[0].clone();
        input.sequence = 10;
        tx.set_inputs(vec![input]);

        // 2^32 + 10: bits above the mask are ignored.
        let lock = script("[0a00000001] checksequenceverify");
        let mut program = Program::new(&lock, &tx, 0, forks::BIP112_RULE);
        assert_eq!(program.evaluate(), Ok(()));

        // 2^31 needs a fifth byte and sets the disable flag.
        tx.set_version(1);
        let lock = script("[0000008000] checksequenceverify");
        let mut program = Program::new(&lock, &tx, 0, forks::BIP112_RULE);
        assert_eq!(program.evaluate(), Ok(()));

        let lock = script("[000000000001] checksequenceverify");
        let mut program = Program::new(&lock, &tx, 0, forks::BIP112_RULE);
        assert_eq!(program.evaluate(), Err(ConsensusError::InvalidNumber));
    }

    struct Signer {
        secret: SecretKey,
        public_key: Vec<u8>,
    }

    impl Signer {
        fn new(seed: u8) -> Self {
            let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
            let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret)
                .serialize()
                .to_vec();
            Signer { secret, public_key }
        }
    }

    fn spending_tx(prevout_script: &Script) -> Transaction {
        let mut tx = dummy_tx();
        tx.populate(
            0,
            PointValidation {
                cache: Some(Output::new(5000, prevout_script.clone())),
                ..PointValidation::default()
            },
        );
        tx
    }

    fn with_input_script(tx: &Transaction, input_script: Script) -> Transaction {
        let mut signed = tx.clone();
        let mut input = signed.inputs()[0].clone();
        input.script = input_script;
        signed.set_inputs(vec![input]);
        signed
    }

    #[test]
    fn test_pay_key_hash_spend() {
        let signer = Signer::new(0x21);
        let prevout = Script::from_operations(Script::to_pay_key_hash_pattern(&bitcoin_short_hash(
            &signer.public_key,
        )));
        let tx = spending_tx(&prevout);

        let endorsement = create_endorsement(&signer.secret, &prevout, &tx, 0, SIGHASH_ALL).unwrap();
        let input_script = Script::from_operations(vec![
            Operation::from_data(endorsement.clone(), false),
            Operation::from_data(signer.public_key.clone(), false),
        ]);
        let signed = with_input_script(&tx, input_script);
        assert_eq!(verify(&signed, 0, forks::ALL_RULES), Ok(()));

        // Another key's signature checks false.
        let other = Signer::new(0x22);
        let input_script = Script::from_operations(vec![
            Operation::from_data(endorsement, false),
            Operation::from_data(other.public_key, false),
        ]);
        let signed = with_input_script(&tx, input_script);
        assert_eq!(verify(&signed, 0, forks::ALL_RULES), Err(ConsensusError::OpEqualVerify));
    }

    #[test]
    fn test_bad_signature_is_stack_false() {
        let signer = Signer::new(0x31);
        let prevout = Script::from_operations(Script::to_pay_public_key_pattern(&signer.public_key));
        let tx = spending_tx(&prevout);

        let mut endorsement = create_endorsement(&signer.secret, &prevout, &tx, 0, SIGHASH_ALL).unwrap();
        let signed = with_input_script(
            &tx,
            Script::from_operations(vec![Operation::from_data(endorsement.clone(), false)]),
        );
        assert_eq!(verify(&signed, 0, 0), Ok(()));

        // Flip the sighash byte: still strict DER, wrong digest.
        let last = endorsement.len() - 1;
        endorsement[last] = 0x02;
        let signed = with_input_script(
            &tx,
            Script::from_operations(vec![Operation::from_data(endorsement, false)]),
        );
        assert_eq!(verify(&signed, 0, forks::BIP66_RULE), Err(ConsensusError::StackFalse));
    }

    #[test]
    fn test_strict_encoding_under_bip66() {
        let signer = Signer::new(0x41);
        let prevout = Script::from_operations(Script::to_pay_public_key_pattern(&signer.public_key));
        let tx = spending_tx(&prevout);

        let junk = vec![0x30, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x01];
        let signed = with_input_script(&tx, Script::from_operations(vec![Operation::from_data(junk, false)]));
        assert_eq!(verify(&signed, 0, 0), Err(ConsensusError::StackFalse));
        assert_eq!(
            verify(&signed, 0, forks::BIP66_RULE),
            Err(ConsensusError::InvalidSignatureEncoding)
        );
    }

    #[test]
    fn test_multisig_spend() {
        let signers = [Signer::new(0x51), Signer::new(0x52), Signer::new(0x53)];
        let points = signers.iter().map(|s| s.public_key.clone()).collect::<Vec<_>>();
        let prevout = Script::from_operations(Script::to_pay_multisig_pattern(2, &points));
        let tx = spending_tx(&prevout);

        let sign = |signer: &Signer| {
            Operation::from_data(create_endorsement(&signer.secret, &prevout, &tx, 0, SIGHASH_ALL).unwrap(), false)
        };

        // Signatures in key order succeed.
        let input_script = Script::from_operations(vec![Operation::new(OP_0), sign(&signers[0]), sign(&signers[2])]);
        assert_eq!(verify(&with_input_script(&tx, input_script), 0, forks::ALL_RULES), Ok(()));

        // Out of order fails.
        let input_script = Script::from_operations(vec![Operation::new(OP_0), sign(&signers[2]), sign(&signers[0])]);
        assert_eq!(
            verify(&with_input_script(&tx, input_script), 0, forks::ALL_RULES),
            Err(ConsensusError::StackFalse)
        );

        // The dummy item is required.
        let input_script = Script::from_operations(vec![sign(&signers[0]), sign(&signers[1])]);
        assert_eq!(
            verify(&with_input_script(&tx, input_script), 0, forks::ALL_RULES),
            Err(ConsensusError::InsufficientStack)
        );
    }

    #[test]
    fn test_multisig_counts() {
        assert_eq!(
            run("0 0 21 checkmultisig", 0).0,
            Err(ConsensusError::InvalidMultisigKeyCount)
        );
        assert_eq!(
            run("0 [02] 2 [02] 1 checkmultisig", 0).0,
            Err(ConsensusError::InvalidMultisigSignatureCount)
        );
        // Zero of zero succeeds.
        assert!(evaluates_true("0 0 0 checkmultisig"));
    }

    #[test]
    fn test_pay_script_hash_spend() {
        let signer = Signer::new(0x61);
        let redeem = Script::from_operations(Script::to_pay_public_key_pattern(&signer.public_key));
        let redeem_data = redeem.to_data(false);
        let prevout = Script::from_operations(Script::to_pay_script_hash_pattern(&bitcoin_short_hash(&redeem_data)));
        let tx = spending_tx(&prevout);

        // The redeem script is the script code.
        let endorsement = create_endorsement(&signer.secret, &redeem, &tx, 0, SIGHASH_ALL).unwrap();
        let input_script = Script::from_operations(vec![
            Operation::from_data(endorsement.clone(), false),
            Operation::from_data(redeem_data.clone(), false),
        ]);
        let signed = with_input_script(&tx, input_script);
        assert_eq!(verify(&signed, 0, forks::ALL_RULES), Ok(()));

        // Without BIP16 only the hash is checked.
        let input_script = Script::from_operations(vec![
            Operation::from_data(vec![0x01], false),
            Operation::from_data(redeem_data.clone(), false),
        ]);
        let unsigned = with_input_script(&tx, input_script);
        assert_eq!(verify(&unsigned, 0, 0), Ok(()));
        assert_eq!(verify(&unsigned, 0, forks::BIP16_RULE), Err(ConsensusError::EmbeddedStackFalse));

        // Input must be push only.
        let input_script = Script::from_operations(vec![
            Operation::from_data(endorsement, false),
            Operation::new(OP_NOP),
            Operation::from_data(redeem_data, false),
        ]);
        let impure = with_input_script(&tx, input_script);
        assert_eq!(verify(&impure, 0, forks::BIP16_RULE), Err(ConsensusError::InvalidScriptEmbed));
    }

    #[test]
    fn test_redeem_failure_is_embedded() {
        let tx = dummy_tx();
        let redeem_data = script("return").to_data(false);
        let prevout = Script::from_operations(Script::to_pay_script_hash_pattern(&bitcoin_short_hash(&redeem_data)));
        let input_script = Script::from_operations(vec![Operation::from_data(redeem_data, false)]);

        let nested = verify_scripts(&tx, 0, forks::BIP16_RULE, &input_script, &prevout);
        assert_eq!(nested, Err(ConsensusError::EmbeddedScript(Box::new(ConsensusError::OpReturn))));
        assert_eq!(nested.unwrap_err().category(), ErrorCategory::EmbeddedScript);

        let outer = verify_scripts(&tx, 0, forks::BIP16_RULE, &script("1"), &script("return"));
        assert_eq!(outer, Err(ConsensusError::OpReturn));
        assert_eq!(outer.unwrap_err().category(), ErrorCategory::Script);
    }

    #[test]
    fn test_verify_requires_prevout() {
        let tx = dummy_tx();
        assert_eq!(verify(&tx, 0, 0), Err(ConsensusError::MissingPreviousOutput));
        assert_eq!(verify(&tx, 1, 0), Err(ConsensusError::InvalidInput));
    }

    #[test]
    fn test_false_result() {
        let tx = dummy_tx();
        assert_eq!(
            verify_scripts(&tx, 0, 0, &script("1"), &script("drop 0")),
            Err(ConsensusError::StackFalse)
        );
        assert_eq!(
            verify_scripts(&tx, 0, 0, &script(""), &script("")),
            Err(ConsensusError::StackFalse)
        );
    }
}
