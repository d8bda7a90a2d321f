//! Minimal script constants and opcode-level parsing.
//!
//! Cupric Coin standardness only needs two script shapes: P2PKH spends and
//! OP_RETURN data carriers. This module provides byte-level helpers for both
//! without a full interpreter.

use crate::PubKeyHash;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Serialized size of an uncompressed secp256k1 public key.
pub const PUBLIC_KEY_SIZE: usize = 65;
/// Serialized size of a compressed secp256k1 public key.
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Reads the opcode at `*pc` and advances past it. For push opcodes the pushed
/// bytes are returned; for everything else the data slice is empty. Returns
/// `None` when the script is truncated mid-opcode.
pub fn get_op<'a>(script: &'a [u8], pc: &mut usize) -> Option<(u8, &'a [u8])> {
    if *pc >= script.len() {
        return None;
    }
    let opcode = script[*pc];
    *pc += 1;

    let len = match opcode {
        n if n <= 0x4b => n as usize,
        OP_PUSHDATA1 => {
            let b = *script.get(*pc)?;
            *pc += 1;
            b as usize
        }
        OP_PUSHDATA2 => {
            let b = script.get(*pc..*pc + 2)?;
            *pc += 2;
            u16::from_le_bytes([b[0], b[1]]) as usize
        }
        OP_PUSHDATA4 => {
            let b = script.get(*pc..*pc + 4)?;
            *pc += 4;
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
        }
        _ => 0,
    };

    let data = script.get(*pc..*pc + len)?;
    *pc += len;
    Some((opcode, data))
}

/// Walks the script and returns the first non-empty push payload.
pub fn first_push(script: &[u8]) -> Option<&[u8]> {
    let mut pc = 0usize;
    while pc < script.len() {
        let (_, data) = get_op(script, &mut pc)?;
        if !data.is_empty() {
            return Some(data);
        }
    }
    None
}

/// Returns the first push of pubkey-sized data in a scriptSig, if any.
/// Deliberately stops at the first candidate; multisig and wrapped scripts do
/// not match.
pub fn first_pubkey_push(script_sig: &[u8]) -> Option<&[u8]> {
    let mut pc = 0usize;
    while pc < script_sig.len() {
        let (_, data) = get_op(script_sig, &mut pc)?;
        if data.len() == PUBLIC_KEY_SIZE || data.len() == COMPRESSED_PUBLIC_KEY_SIZE {
            return Some(data);
        }
    }
    None
}

/// Encodes `data` as a minimal pushdata sequence.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    match data.len() {
        n if n <= 0x4b => out.push(n as u8),
        n if n <= 0xff => {
            out.push(OP_PUSHDATA1);
            out.push(n as u8);
        }
        n if n <= 0xffff => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        n => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
    out
}

/// Builds an `OP_RETURN <payload>` data-carrier script.
pub fn op_return_script(payload: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    script.extend_from_slice(&push_data(payload));
    script
}

/// Builds the canonical P2PKH locking script for a key hash.
pub fn p2pkh_script(keyid: &PubKeyHash) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(keyid);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Extracts the destination key hash from a P2PKH script, if the script is
/// exactly that shape.
pub fn extract_destination(script: &[u8]) -> Option<PubKeyHash> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut keyid = [0u8; 20];
        keyid.copy_from_slice(&script[3..23]);
        Some(keyid)
    } else {
        None
    }
}
