use alloy_primitives::Address;
use k256::ecdsa::{SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Derives the address controlled by a secp256k1 verifying key.
///
/// Keccak-256 of the 64-byte uncompressed point (without the 0x04 prefix);
/// the last 20 bytes are the address.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Derives the address of a private key.
pub fn address_from_signing_key(key: &SigningKey) -> Address {
    address_from_verifying_key(key.verifying_key())
}

/// Parses a 0x-prefixed address.
///
/// All-lowercase and all-uppercase input is accepted as-is. Mixed case must
/// carry a valid EIP-55 checksum.
pub fn parse_address(address: &str) -> Result<Address, EthError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?;

    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EthError::InvalidAddress(
            "address contains non-hex characters".into(),
        ));
    }

    let bytes = hex::decode(hex_part)
        .map_err(|e| EthError::InvalidAddress(format!("invalid hex: {e}")))?;
    let parsed = Address::from_slice(&bytes);

    let is_all_lower = hex_part.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = hex_part.chars().all(|c| !c.is_ascii_lowercase());
    if !is_all_lower && !is_all_upper && checksum(&parsed)[2..] != *hex_part {
        return Err(EthError::InvalidAddress(format!(
            "bad EIP-55 checksum: {address}"
        )));
    }

    Ok(parsed)
}

/// Renders an address with EIP-55 mixed-case checksum encoding.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Shortened form used in labels and notifications: `0x1234...abcd`.
pub fn short_address(address: &Address) -> String {
    let full = checksum(address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
