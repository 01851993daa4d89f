//! Script opcodes
//!
//! Opcodes are plain bytes. Every byte is a valid opcode value; the ones
//! without a defined meaning are reserved and fail when executed.

use crate::chain_state::forks;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHBYTES_1: u8 = 0x01;
pub const OP_PUSHBYTES_20: u8 = 0x14;
pub const OP_PUSHBYTES_32: u8 = 0x20;
pub const OP_PUSHBYTES_33: u8 = 0x21;
pub const OP_PUSHBYTES_65: u8 = 0x41;
pub const OP_PUSHBYTES_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_2: u8 = 0x52;
pub const OP_3: u8 = 0x53;
pub const OP_4: u8 = 0x54;
pub const OP_5: u8 = 0x55;
pub const OP_6: u8 = 0x56;
pub const OP_7: u8 = 0x57;
pub const OP_8: u8 = 0x58;
pub const OP_9: u8 = 0x59;
pub const OP_10: u8 = 0x5a;
pub const OP_11: u8 = 0x5b;
pub const OP_12: u8 = 0x5c;
pub const OP_13: u8 = 0x5d;
pub const OP_14: u8 = 0x5e;
pub const OP_15: u8 = 0x5f;
pub const OP_16: u8 = 0x60;

// Flow control
pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

// Stack
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

// Splice
pub const OP_CAT: u8 = 0x7e;
pub const OP_SUBSTR: u8 = 0x7f;
pub const OP_LEFT: u8 = 0x80;
pub const OP_RIGHT: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

// Bitwise logic
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

// Arithmetic
pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

// Crypto
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// Expansion
pub const OP_NOP1: u8 = 0xb0;
pub const OP_NOP2: u8 = 0xb1;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = OP_NOP2;
pub const OP_NOP3: u8 = 0xb2;
pub const OP_CHECKSEQUENCEVERIFY: u8 = OP_NOP3;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP10: u8 = 0xb9;

/// Opcodes `0x00..=0x4e` carry data.
pub fn is_payload(code: u8) -> bool {
    code <= OP_PUSHDATA4
}

/// Only puts a value on the stack: payloads, `OP_1NEGATE`, `OP_1..OP_16`.
pub fn is_push(code: u8) -> bool {
    code <= OP_16 && code != OP_RESERVED
}

/// `OP_1NEGATE` and the small integers `OP_1..OP_16`.
pub fn is_numeric(code: u8) -> bool {
    code == OP_1NEGATE || is_positive(code)
}

/// `OP_1..OP_16`
pub fn is_positive(code: u8) -> bool {
    (OP_1..=OP_16).contains(&code)
}

/// Push or `OP_RESERVED`, the set a pay-to-script-hash input may contain.
pub fn is_relaxed_push(code: u8) -> bool {
    code <= OP_16
}

/// Counted against the per-script operation limit.
pub fn is_counted(code: u8) -> bool {
    code > OP_16
}

/// Fail when present in a script even inside an unexecuted branch.
pub fn is_disabled(code: u8) -> bool {
    matches!(
        code,
        OP_CAT
            | OP_SUBSTR
            | OP_LEFT
            | OP_RIGHT
            | OP_INVERT
            | OP_AND
            | OP_OR
            | OP_XOR
            | OP_2MUL
            | OP_2DIV
            | OP_MUL
            | OP_DIV
            | OP_MOD
            | OP_LSHIFT
            | OP_RSHIFT
    )
}

/// Processed even inside an unexecuted branch.
pub fn is_conditional(code: u8) -> bool {
    matches!(code, OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF | OP_VERIF | OP_VERNOTIF)
}

/// No defined behavior: fails when executed.
pub fn is_reserved(code: u8) -> bool {
    matches!(
        code,
        OP_RESERVED | OP_VER | OP_VERIF | OP_VERNOTIF | OP_RESERVED1 | OP_RESERVED2
    ) || code > OP_NOP10
}

/// Value of `OP_1..OP_16`.
pub fn opcode_to_positive(code: u8) -> Option<u8> {
    is_positive(code).then(|| code - OP_1 + 1)
}

/// `OP_1..OP_16` for a value in `1..=16`.
pub fn opcode_from_positive(value: u8) -> Option<u8> {
    (1..=16).contains(&value).then(|| OP_1 + value - 1)
}

/// Size-based push opcode for a data length.
pub fn opcode_from_size(size: usize) -> u8 {
    if size <= OP_PUSHBYTES_75 as usize {
        size as u8
    } else if size <= u8::MAX as usize {
        OP_PUSHDATA1
    } else if size <= u16::MAX as usize {
        OP_PUSHDATA2
    } else {
        OP_PUSHDATA4
    }
}

/// Shortest push opcode for data: small numbers use their dedicated opcode.
pub fn minimal_opcode_from_data(data: &[u8]) -> u8 {
    if data.len() == 1 {
        if data[0] == 0x81 {
            return OP_1NEGATE;
        }
        if let Some(code) = opcode_from_positive(data[0]) {
            return code;
        }
    }

    opcode_from_size(data.len())
}

/// Mnemonic for an opcode. With the corresponding fork active, `OP_NOP2`
/// and `OP_NOP3` display as the lock time checks they became.
pub fn to_string(code: u8, active_forks: u32) -> String {
    if let Some(value) = opcode_to_positive(code) {
        return value.to_string();
    }

    if code > OP_0 && code <= OP_PUSHBYTES_75 {
        return format!("push_{}", code);
    }

    let name = match code {
        OP_0 => "zero",
        OP_PUSHDATA1 => "pushdata1",
        OP_PUSHDATA2 => "pushdata2",
        OP_PUSHDATA4 => "pushdata4",
        OP_1NEGATE => "-1",
        OP_RESERVED => "reserved",
        OP_NOP => "nop",
        OP_VER => "ver",
        OP_IF => "if",
        OP_NOTIF => "notif",
        OP_VERIF => "verif",
        OP_VERNOTIF => "vernotif",
        OP_ELSE => "else",
        OP_ENDIF => "endif",
        OP_VERIFY => "verify",
        OP_RETURN => "return",
        OP_TOALTSTACK => "toaltstack",
        OP_FROMALTSTACK => "fromaltstack",
        OP_2DROP => "2drop",
        OP_2DUP => "2dup",
        OP_3DUP => "3dup",
        OP_2OVER => "2over",
        OP_2ROT => "2rot",
        OP_2SWAP => "2swap",
        OP_IFDUP => "ifdup",
        OP_DEPTH => "depth",
        OP_DROP => "drop",
        OP_DUP => "dup",
        OP_NIP => "nip",
        OP_OVER => "over",
        OP_PICK => "pick",
        OP_ROLL => "roll",
        OP_ROT => "rot",
        OP_SWAP => "swap",
        OP_TUCK => "tuck",
        OP_CAT => "cat",
        OP_SUBSTR => "substr",
        OP_LEFT => "left",
        OP_RIGHT => "right",
        OP_SIZE => "size",
        OP_INVERT => "invert",
        OP_AND => "and",
        OP_OR => "or",
        OP_XOR => "xor",
        OP_EQUAL => "equal",
        OP_EQUALVERIFY => "equalverify",
        OP_RESERVED1 => "reserved1",
        OP_RESERVED2 => "reserved2",
        OP_1ADD => "add1",
        OP_1SUB => "sub1",
        OP_2MUL => "mul2",
        OP_2DIV => "div2",
        OP_NEGATE => "negate",
        OP_ABS => "abs",
        OP_NOT => "not",
        OP_0NOTEQUAL => "nonzero",
        OP_ADD => "add",
        OP_SUB => "sub",
        OP_MUL => "mul",
        OP_DIV => "div",
        OP_MOD => "mod",
        OP_LSHIFT => "lshift",
        OP_RSHIFT => "rshift",
        OP_BOOLAND => "booland",
        OP_BOOLOR => "boolor",
        OP_NUMEQUAL => "numequal",
        OP_NUMEQUALVERIFY => "numequalverify",
        OP_NUMNOTEQUAL => "numnotequal",
        OP_LESSTHAN => "lessthan",
        OP_GREATERTHAN => "greaterthan",
        OP_LESSTHANOREQUAL => "lessthanorequal",
        OP_GREATERTHANOREQUAL => "greaterthanorequal",
        OP_MIN => "min",
        OP_MAX => "max",
        OP_WITHIN => "within",
        OP_RIPEMD160 => "ripemd160",
        OP_SHA1 => "sha1",
        OP_SHA256 => "sha256",
        OP_HASH160 => "hash160",
        OP_HASH256 => "hash256",
        OP_CODESEPARATOR => "codeseparator",
        OP_CHECKSIG => "checksig",
        OP_CHECKSIGVERIFY => "checksigverify",
        OP_CHECKMULTISIG => "checkmultisig",
        OP_CHECKMULTISIGVERIFY => "checkmultisigverify",
        OP_NOP1 => "nop1",
        OP_NOP2 if active_forks & forks::BIP65_RULE != 0 => "checklocktimeverify",
        OP_NOP2 => "nop2",
        OP_NOP3 if active_forks & forks::BIP112_RULE != 0 => "checksequenceverify",
        OP_NOP3 => "nop3",
        0xb3..=OP_NOP10 => return format!("nop{}", code - OP_NOP1 + 1),
        _ => return format!("0x{:02x}", code),
    };

    name.to_string()
}

/// Parse a mnemonic produced by `to_string`. Accepts both names of the
/// lock time opcodes and the `0x..` form for any byte.
pub fn from_string(text: &str) -> Option<u8> {
    if let Ok(value) = text.parse::<u8>() {
        return opcode_from_positive(value);
    }

    if let Some(size) = text.strip_prefix("push_") {
        let size = size.parse::<u8>().ok()?;
        return (size > 0 && size <= OP_PUSHBYTES_75).then_some(size);
    }

    if let Some(hex) = text.strip_prefix("0x") {
        return if hex.len() == 2 {
            u8::from_str_radix(hex, 16).ok()
        } else {
            None
        };
    }

    if let Some(index) = text.strip_prefix("nop") {
        if let Ok(index) = index.parse::<u8>() {
            return (1..=10).contains(&index).then(|| OP_NOP1 + index - 1);
        }
    }

    let code = match text {
        "zero" => OP_0,
        "pushdata1" => OP_PUSHDATA1,
        "pushdata2" => OP_PUSHDATA2,
        "pushdata4" => OP_PUSHDATA4,
        "-1" => OP_1NEGATE,
        "checklocktimeverify" => OP_CHECKLOCKTIMEVERIFY,
        "checksequenceverify" => OP_CHECKSEQUENCEVERIFY,
        _ => return (OP_RESERVED..=OP_NOP1).find(|&code| to_string(code, 0) == text),
    };

    Some(code)
}
