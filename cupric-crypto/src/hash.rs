//! Hashing algorithms for Cupric Coin governance data.

use cupric_shared_types::{Hash, PubKeyHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Double SHA-256, the digest used for governance record hashes and
/// sig-hashes. These hashes are consensus-observable, so the function must
/// stay byte-identical across releases.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// RIPEMD160 of SHA-256, producing the 20-byte key-id of a serialized
/// public key.
pub fn hash160(data: &[u8]) -> PubKeyHash {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}
