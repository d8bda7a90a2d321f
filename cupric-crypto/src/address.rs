//! Base58check encoding of P2PKH payment addresses.

use crate::CryptoError;
use cupric_shared_types::PubKeyHash;

/// Version byte for pay-to-pubkey-hash addresses ('C' prefix).
pub const P2PKH_VERSION: u8 = 28;

/// Encodes a key hash as a base58check address.
pub fn encode_address(keyid: &PubKeyHash) -> String {
    bs58::encode(keyid).with_check_version(P2PKH_VERSION).into_string()
}

/// Decodes a base58check address back to its key hash.
pub fn decode_address(address: &str) -> Result<PubKeyHash, CryptoError> {
    let payload = bs58::decode(address)
        .with_check(Some(P2PKH_VERSION))
        .into_vec()
        .map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
    // payload[0] is the version byte, verified above
    if payload.len() != 21 {
        return Err(CryptoError::InvalidAddress(format!(
            "bad payload length {}",
            payload.len()
        )));
    }
    let mut keyid = [0u8; 20];
    keyid.copy_from_slice(&payload[1..]);
    Ok(keyid)
}

/// Returns true if the string decodes to a valid P2PKH address.
pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}
