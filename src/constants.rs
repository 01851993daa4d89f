//! Bitcoin consensus constants

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * SATOSHIS_PER_BTC;

/// Initial block subsidy: 50 BTC
pub const INITIAL_SUBSIDY: u64 = 50 * SATOSHIS_PER_BTC;

/// Halving interval: 210,000 blocks
pub const SUBSIDY_INTERVAL: u64 = 210_000;

/// Number of halvings after which the subsidy is zero
pub const MAX_HALVINGS: u64 = 64;

/// Maximum serialized block size: 1MB
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum signature operations per block
pub const MAX_BLOCK_SIGOPS: usize = MAX_BLOCK_SIZE / 50;

/// Blocks before a coinbase output may be spent
pub const COINBASE_MATURITY: usize = 100;

/// Coinbase input script size bounds
pub const MIN_COINBASE_SIZE: usize = 2;
pub const MAX_COINBASE_SIZE: usize = 100;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum push data size
pub const MAX_PUSH_DATA_SIZE: usize = 520;

/// Maximum primary plus alternate stack size during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of counted operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum public keys in a checkmultisig
pub const MAX_SCRIPT_PUBLIC_KEYS: usize = 20;

/// Sigops charged for a multisig whose key count is not a small positive opcode
pub const MULTISIG_DEFAULT_SIGOPS: usize = MAX_SCRIPT_PUBLIC_KEYS;

/// Maximum data carried by a null-data output
pub const MAX_NULL_DATA_SIZE: usize = 80;

/// Endorsement (DER signature + sighash byte) size bounds
pub const MIN_ENDORSEMENT_SIZE: usize = 9;
pub const MAX_ENDORSEMENT_SIZE: usize = 73;

/// Public key encodings
pub const COMPRESSED_KEY_SIZE: usize = 33;
pub const UNCOMPRESSED_KEY_SIZE: usize = 65;

/// Script number size limits
pub const MAX_NUMBER_SIZE: usize = 4;
pub const MAX_CHECK_LOCKTIME_VERIFY_NUMBER_SIZE: usize = 5;

/// Lock time threshold: values below are block heights, above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// BIP68 relative lock time fields
pub const RELATIVE_LOCKTIME_DISABLED: u32 = 1 << 31;
pub const RELATIVE_LOCKTIME_TIME_LOCKED: u32 = 1 << 22;
pub const RELATIVE_LOCKTIME_MASK: u32 = 0x0000ffff;
pub const RELATIVE_LOCKTIME_SECONDS_SHIFT: u32 = 9;

/// Minimum transaction version for relative lock time
pub const RELATIVE_LOCKTIME_MIN_VERSION: u32 = 2;

/// Number of recent block hashes before the locator backs off exponentially
pub const LOCATOR_LINEAR_COUNT: usize = 10;

/// Seconds a header timestamp may run ahead of the local clock
pub const TIMESTAMP_FUTURE_SECONDS: u32 = 2 * 60 * 60;

/// Proof of work limit of the main and test networks (compact)
pub const MAINNET_PROOF_OF_WORK_LIMIT: u32 = 0x1d00ffff;

/// Proof of work limit of regression test networks (compact)
pub const REGTEST_PROOF_OF_WORK_LIMIT: u32 = 0x207fffff;
