//! Hashing, signing and address primitives for Cupric Coin.
//!
//! Consensus-observable digests (record hashes, sig-hashes, key-ids) live
//! here so every crate derives them identically.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{decode_address, encode_address, is_valid_address};
pub use hash::{hash160, sha256d};
pub use keys::{generate_keypair, key_id, recover_compact, sign_compact};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("secp256k1 error: {0}")]
    Secp(#[from] secp256k1::Error),
}
