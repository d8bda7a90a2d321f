//! secp256k1 keypairs and compact recoverable signatures.
//!
//! Governance votes carry no public key on the wire; the signer is
//! established by recovering the key from the 65-byte compact signature and
//! comparing its key-id against the voting utxo's destination.

use crate::{hash::hash160, CryptoError};
use cupric_shared_types::{Hash, PubKeyHash};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

/// Size of a compact recoverable signature: one header byte plus r and s.
pub const COMPACT_SIGNATURE_SIZE: usize = 65;

/// Header base for compact signatures over compressed keys.
const COMPACT_HEADER_COMPRESSED: u8 = 27 + 4;

/// Generates a fresh random keypair.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    SECP256K1.generate_keypair(&mut rand::thread_rng())
}

/// The 20-byte key-id of a public key (hash160 of its compressed encoding).
pub fn key_id(pubkey: &PublicKey) -> PubKeyHash {
    hash160(&pubkey.serialize())
}

/// Signs a 32-byte digest, producing a compact recoverable signature.
pub fn sign_compact(secret: &SecretKey, digest: &Hash) -> Result<[u8; COMPACT_SIGNATURE_SIZE], CryptoError> {
    let msg = Message::from_digest(*digest);
    let sig = SECP256K1.sign_ecdsa_recoverable(&msg, secret);
    let (recid, body) = sig.serialize_compact();
    let mut out = [0u8; COMPACT_SIGNATURE_SIZE];
    out[0] = COMPACT_HEADER_COMPRESSED + recid.to_i32() as u8;
    out[1..].copy_from_slice(&body);
    Ok(out)
}

/// Recovers the public key that produced a compact signature over `digest`.
pub fn recover_compact(digest: &Hash, signature: &[u8]) -> Result<PublicKey, CryptoError> {
    if signature.len() != COMPACT_SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignature);
    }
    if signature[0] < 27 {
        return Err(CryptoError::InvalidSignature);
    }
    let recid = RecoveryId::from_i32(((signature[0] - 27) & 0x03) as i32)?;
    let sig = RecoverableSignature::from_compact(&signature[1..], recid)?;
    let msg = Message::from_digest(*digest);
    Ok(SECP256K1.recover_ecdsa(&msg, &sig)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256d;

    #[test]
    fn sign_and_recover_round_trip() {
        let (secret, pubkey) = generate_keypair();
        let digest = sha256d(b"governance vote digest");
        let sig = sign_compact(&secret, &digest).unwrap();
        let recovered = recover_compact(&digest, &sig).unwrap();
        assert_eq!(recovered, pubkey);
        assert_eq!(key_id(&recovered), key_id(&pubkey));
    }

    #[test]
    fn recovery_of_tampered_digest_yields_other_key() {
        let (secret, pubkey) = generate_keypair();
        let digest = sha256d(b"signed message");
        let sig = sign_compact(&secret, &digest).unwrap();
        let other = sha256d(b"different message");
        match recover_compact(&other, &sig) {
            Ok(recovered) => assert_ne!(key_id(&recovered), key_id(&pubkey)),
            Err(_) => {} // point may not exist for the altered digest
        }
    }

    #[test]
    fn rejects_malformed_signatures() {
        let digest = sha256d(b"x");
        assert!(recover_compact(&digest, &[0u8; 64]).is_err());
        assert!(recover_compact(&digest, &[0u8; 65]).is_err());
    }
}
