//! Result codes for consensus validation

use thiserror::Error;

/// Every failure the engine reports. The set is closed: callers match on it
/// to pick a policy (reject, penalize peer, retry elsewhere).
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConsensusError {
    // Default state of a validation record.
    #[error("object not found or not yet validated")]
    NotFound,

    // Deserialization.
    #[error("invalid encoding")]
    InvalidEncoding,

    // Block check.
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("block size exceeds limit")]
    BlockSizeLimit,
    #[error("first transaction is not a coinbase")]
    FirstNotCoinbase,
    #[error("more than one coinbase")]
    ExtraCoinbases,
    #[error("duplicate transaction in block")]
    InternalDuplicate,
    #[error("double spend within block")]
    BlockInternalDoubleSpend,
    #[error("merkle root mismatch")]
    MerkleMismatch,
    #[error("too many legacy signature operations in block")]
    BlockLegacySigopLimit,
    #[error("proof of work is invalid")]
    InvalidProofOfWork,
    #[error("timestamp too far in the future")]
    FuturisticTimestamp,

    // Transaction check.
    #[error("transaction has no inputs or outputs")]
    EmptyTransaction,
    #[error("non-coinbase input spends a null output")]
    PreviousOutputNull,
    #[error("output value sum exceeds money supply")]
    SpendOverflow,
    #[error("coinbase script size out of range")]
    InvalidCoinbaseScriptSize,
    #[error("coinbase not allowed here")]
    CoinbaseTransaction,
    #[error("double spend within transaction")]
    TransactionInternalDoubleSpend,
    #[error("transaction size exceeds limit")]
    TransactionSizeLimit,
    #[error("too many legacy signature operations in transaction")]
    TransactionLegacySigopLimit,

    // Block accept.
    #[error("bits do not match the required work")]
    IncorrectProofOfWork,
    #[error("block version below enforced minimum")]
    OldVersionBlock,
    #[error("timestamp not above median time past")]
    TimestampTooEarly,
    #[error("block contains a non-final transaction")]
    BlockNonFinal,
    #[error("coinbase script does not commit to the block height")]
    CoinbaseHeightMismatch,
    #[error("coinbase claims more than subsidy plus fees")]
    CoinbaseValueLimit,
    #[error("too many signature operations in block")]
    BlockEmbeddedSigopLimit,

    // Transaction accept.
    #[error("transaction is not final")]
    TransactionNonFinal,
    #[error("previous output not found")]
    MissingPreviousOutput,
    #[error("previous output already spent")]
    DoubleSpend,
    #[error("coinbase output spent before maturity")]
    CoinbaseMaturity,
    #[error("spend exceeds input value")]
    SpendExceedsValue,
    #[error("relative lock time not satisfied")]
    SequenceLocked,
    #[error("too many signature operations in transaction")]
    TransactionEmbeddedSigopLimit,

    // Script evaluation (connect).
    #[error("input index out of range")]
    InvalidInput,
    #[error("script is malformed")]
    InvalidScript,
    #[error("script size exceeds limit")]
    InvalidScriptSize,
    #[error("push data exceeds size limit")]
    InvalidPushDataSize,
    #[error("operation count exceeds limit")]
    InvalidOperationCount,
    #[error("stack size exceeds limit")]
    InvalidStackSize,
    #[error("unbalanced conditional")]
    InvalidStackScope,
    #[error("pay-to-script-hash input script is not push only")]
    InvalidScriptEmbed,
    #[error("signature encoding is not strict DER")]
    InvalidSignatureEncoding,
    #[error("script number out of range")]
    InvalidNumber,
    #[error("multisig public key count out of range")]
    InvalidMultisigKeyCount,
    #[error("multisig signature count out of range")]
    InvalidMultisigSignatureCount,
    #[error("insufficient stack items")]
    InsufficientStack,
    #[error("disabled opcode")]
    OpDisabled,
    #[error("reserved or unknown opcode")]
    OpReserved,
    #[error("OP_RETURN executed")]
    OpReturn,
    #[error("OP_VERIFY failed")]
    OpVerify,
    #[error("OP_EQUALVERIFY failed")]
    OpEqualVerify,
    #[error("OP_NUMEQUALVERIFY failed")]
    OpNumEqualVerify,
    #[error("OP_CHECKSIGVERIFY failed")]
    OpCheckSigVerify,
    #[error("OP_CHECKMULTISIGVERIFY failed")]
    OpCheckMultisigVerify,
    #[error("OP_CHECKLOCKTIMEVERIFY failed")]
    OpCheckLocktimeVerify,
    #[error("OP_CHECKSEQUENCEVERIFY failed")]
    OpCheckSequenceVerify,
    #[error("script evaluated to false")]
    StackFalse,
    #[error("embedded script evaluated to false")]
    EmbeddedStackFalse,
    /// Execution failure inside a pay-to-script-hash redeem script.
    #[error("embedded script failed: {0}")]
    EmbeddedScript(Box<ConsensusError>),
}

/// Coarse grouping of result codes by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Deserialization,
    Check,
    Accept,
    Script,
    EmbeddedScript,
}

impl ConsensusError {
    pub fn category(&self) -> ErrorCategory {
        use ConsensusError::*;

        match self {
            NotFound => ErrorCategory::NotFound,
            InvalidEncoding => ErrorCategory::Deserialization,
            EmptyBlock | BlockSizeLimit | FirstNotCoinbase | ExtraCoinbases
            | InternalDuplicate | BlockInternalDoubleSpend | MerkleMismatch
            | BlockLegacySigopLimit | InvalidProofOfWork | FuturisticTimestamp
            | EmptyTransaction | PreviousOutputNull | SpendOverflow
            | InvalidCoinbaseScriptSize | CoinbaseTransaction
            | TransactionInternalDoubleSpend | TransactionSizeLimit
            | TransactionLegacySigopLimit => ErrorCategory::Check,
            IncorrectProofOfWork | OldVersionBlock | TimestampTooEarly | BlockNonFinal
            | CoinbaseHeightMismatch | CoinbaseValueLimit | BlockEmbeddedSigopLimit
            | TransactionNonFinal | MissingPreviousOutput | DoubleSpend
            | CoinbaseMaturity | SpendExceedsValue | SequenceLocked
            | TransactionEmbeddedSigopLimit => ErrorCategory::Accept,
            InvalidScriptEmbed | EmbeddedStackFalse | EmbeddedScript(_) => {
                ErrorCategory::EmbeddedScript
            }
            _ => ErrorCategory::Script,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Outcome of a validation stage: `Ok(())` is success.
pub type Code = Result<()>;
