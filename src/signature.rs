//! Legacy signature hashing, ECDSA verification and endorsement creation

use crate::constants::{MAX_ENDORSEMENT_SIZE, MIN_ENDORSEMENT_SIZE};
use crate::hash::bitcoin_hash;
use crate::script::Script;
use crate::serialization::Writer;
use crate::transaction::{Output, Transaction};
use crate::types::{Endorsement, HashDigest};
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use std::sync::OnceLock;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONE_CAN_PAY: u8 = 0x80;

const SIGHASH_BASE_MASK: u8 = 0x1f;

/// Returned instead of a digest when the input or its SINGLE output does
/// not exist.
const ONE_HASH: HashDigest = [
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

fn context() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// Legacy signature hash of `tx` for signing input `input_index` with
/// `script_code` as the previous output script.
///
/// The digest covers a modified copy of the transaction:
/// 1. `OP_CODESEPARATOR`s are removed from the script code, which replaces
///    the signed input's script; every other input script is emptied
/// 2. NONE and SINGLE zero the other inputs' sequences
/// 3. NONE drops all outputs; SINGLE keeps outputs up to the signed index,
///    nulling all but the last
/// 4. ANYONE_CAN_PAY keeps only the signed input
/// 5. the sighash type is appended as four little-endian bytes
pub fn generate_signature_hash(
    tx: &Transaction,
    input_index: u32,
    script_code: &Script,
    sighash_type: u8,
) -> HashDigest {
    let index = input_index as usize;
    let base = sighash_type & SIGHASH_BASE_MASK;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONE_CAN_PAY != 0;

    if index >= tx.inputs().len() || (base == SIGHASH_SINGLE && index >= tx.outputs().len()) {
        return ONE_HASH;
    }

    let script_code = script_code.strip_code_separators();
    let empty = Script::new();
    let mut writer = Writer::with_capacity(tx.serialized_size() + script_code.serialized_size(true));

    writer.write_u32(tx.version());

    let signed = &tx.inputs()[index];
    if anyone_can_pay {
        writer.write_compact_size(1);
        writer.write_hash(&signed.previous_output.hash);
        writer.write_u32(signed.previous_output.index);
        script_code.write(&mut writer, true);
        writer.write_u32(signed.sequence);
    } else {
        writer.write_compact_size(tx.inputs().len() as u64);
        for (i, input) in tx.inputs().iter().enumerate() {
            let own = i == index;
            let sequence = if !own && (base == SIGHASH_NONE || base == SIGHASH_SINGLE) {
                0
            } else {
                input.sequence
            };

            writer.write_hash(&input.previous_output.hash);
            writer.write_u32(input.previous_output.index);
            if own {
                script_code.write(&mut writer, true);
            } else {
                empty.write(&mut writer, true);
            }
            writer.write_u32(sequence);
        }
    }

    match base {
        SIGHASH_NONE => writer.write_compact_size(0),
        SIGHASH_SINGLE => {
            writer.write_compact_size(index as u64 + 1);
            let null = Output::null();
            for _ in 0..index {
                null.write(&mut writer);
            }
            tx.outputs()[index].write(&mut writer);
        }
        _ => {
            writer.write_compact_size(tx.outputs().len() as u64);
            for output in tx.outputs() {
                output.write(&mut writer);
            }
        }
    }

    writer.write_u32(tx.locktime());
    writer.write_u32(sighash_type as u32);

    bitcoin_hash(&writer.into_inner())
}

/// Verify `signature` by `public_key` over the signature hash. Malformed
/// keys yield `false`. High-S signatures are normalized first.
pub fn check_signature(
    signature: &Signature,
    sighash_type: u8,
    public_key: &[u8],
    script_code: &Script,
    tx: &Transaction,
    input_index: u32,
) -> bool {
    let key = match PublicKey::from_slice(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let hash = generate_signature_hash(tx, input_index, script_code, sighash_type);
    let message = match Message::from_digest_slice(&hash) {
        Ok(message) => message,
        Err(_) => return false,
    };

    let mut signature = *signature;
    signature.normalize_s();
    context().verify_ecdsa(&message, &signature, &key).is_ok()
}

/// DER signature over the signature hash followed by the sighash byte.
pub fn create_endorsement(
    secret: &SecretKey,
    prevout_script: &Script,
    tx: &Transaction,
    input_index: u32,
    sighash_type: u8,
) -> Option<Endorsement> {
    let hash = generate_signature_hash(tx, input_index, prevout_script, sighash_type);
    let message = Message::from_digest_slice(&hash).ok()?;
    let signature = context().sign_ecdsa(&message, secret);

    let mut endorsement = signature.serialize_der().to_vec();
    endorsement.push(sighash_type);
    Some(endorsement)
}

/// Parse a DER signature without the sighash byte. Lax parsing accepts the
/// malformed encodings valid before BIP66.
pub fn parse_signature(der: &[u8], strict: bool) -> Option<Signature> {
    let parsed = if strict {
        Signature::from_der(der)
    } else {
        Signature::from_der_lax(der)
    };
    parsed.ok()
}

/// Strict DER layout check of an endorsement, sighash byte included (BIP66).
pub fn is_valid_signature_encoding(endorsement: &[u8]) -> bool {
    let sig = endorsement;
    let size = sig.len();

    if !(MIN_ENDORSEMENT_SIZE..=MAX_ENDORSEMENT_SIZE).contains(&size) {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != size - 3 {
        return false;
    }

    let r_size = sig[3] as usize;
    if 5 + r_size >= size {
        return false;
    }

    let s_size = sig[5 + r_size] as usize;
    if r_size + s_size + 7 != size {
        return false;
    }

    // R: positive integer without excess padding.
    if sig[2] != 0x02 || r_size == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if r_size > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    // S, likewise.
    if sig[r_size + 4] != 0x02 || s_size == 0 || sig[r_size + 6] & 0x80 != 0 {
        return false;
    }
    if s_size > 1 && sig[r_size + 6] == 0x00 && sig[r_size + 7] & 0x80 == 0 {
        return false;
    }

    true
}
