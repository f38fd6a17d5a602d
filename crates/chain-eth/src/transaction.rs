use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::address::address_from_verifying_key;
use crate::error::EthError;

/// EIP-2718 type byte of an EIP-1559 transaction.
const EIP1559_TX_TYPE: u8 = 0x02;

/// An unsigned EIP-1559 (type 2) contract call.
#[derive(Debug, Clone)]
pub struct EthTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A signed EIP-1559 transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedEthTransaction {
    /// `0x02 || rlp(signed fields)`.
    pub raw_tx: Vec<u8>,
    pub tx_hash: B256,
}

/// Builds a signing key from raw secret bytes, wiping the intermediate copy.
pub fn signing_key_from_bytes(secret: &[u8]) -> Result<SigningKey, EthError> {
    if secret.len() != 32 {
        return Err(EthError::InvalidPrivateKey(format!(
            "expected 32 bytes, got {}",
            secret.len()
        )));
    }
    let key_bytes = Zeroizing::new(secret.to_vec());
    SigningKey::from_slice(&key_bytes).map_err(|e| EthError::InvalidPrivateKey(e.to_string()))
}

/// Parses a hex private key (with or without `0x`).
pub fn signing_key_from_hex(secret_hex: &str) -> Result<SigningKey, EthError> {
    let trimmed = secret_hex.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(hex_part).map_err(|e| EthError::InvalidPrivateKey(format!("invalid hex: {e}")))?,
    );
    signing_key_from_bytes(&bytes)
}

/// Signs an EIP-1559 transaction.
///
/// The signature covers `keccak256(0x02 || rlp(unsigned fields))`; the
/// transaction hash is `keccak256` of the signed raw bytes.
pub fn sign_transaction(
    tx: &EthTransaction,
    key: &SigningKey,
) -> Result<SignedEthTransaction, EthError> {
    let unsigned_payload = encode_unsigned_tx(tx);
    let msg_hash = Keccak256::digest(&unsigned_payload);

    let (signature, recovery_id): (Signature, RecoveryId) = key
        .sign_prehash(msg_hash.as_slice())
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let signed_fields = SignedTxFields {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        max_fee_per_gas: tx.max_fee_per_gas,
        gas_limit: tx.gas_limit,
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        access_list: Vec::new(),
        signature_y_parity: u8::from(recovery_id.is_y_odd()),
        signature_r: U256::from_be_slice(&signature.r().to_bytes()),
        signature_s: U256::from_be_slice(&signature.s().to_bytes()),
    };

    let raw_tx = typed_envelope(&signed_fields);
    let tx_hash = B256::from_slice(&Keccak256::digest(&raw_tx));

    Ok(SignedEthTransaction { raw_tx, tx_hash })
}

/// Encodes the unsigned transaction as `0x02 || rlp(fields)`.
///
/// The RLP-encoded fields are:
/// `[chain_id, nonce, max_priority_fee_per_gas, max_fee_per_gas, gas_limit, to,
///   value, data, access_list]`
pub fn encode_unsigned_tx(tx: &EthTransaction) -> Vec<u8> {
    let unsigned_fields = UnsignedTxFields {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        max_fee_per_gas: tx.max_fee_per_gas,
        gas_limit: tx.gas_limit,
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        access_list: Vec::new(),
    };
    typed_envelope(&unsigned_fields)
}

fn typed_envelope(fields: &impl Encodable) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + fields.length());
    payload.push(EIP1559_TX_TYPE);
    fields.encode(&mut payload);
    payload
}

/// EIP-191 `personal_sign` digest:
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`.
pub fn hash_message(message: &[u8]) -> B256 {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    B256::from_slice(&hasher.finalize())
}

/// Signs a message with EIP-191 `personal_sign`.
///
/// Returns 65 bytes: `r[32] || s[32] || v` with `v` in {27, 28}.
pub fn sign_message(message: &[u8], key: &SigningKey) -> Result<[u8; 65], EthError> {
    let digest = hash_message(message);
    let (signature, recovery_id): (Signature, RecoveryId) = key
        .sign_prehash(digest.as_slice())
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let mut sig = [0u8; 65];
    sig[..32].copy_from_slice(&signature.r().to_bytes());
    sig[32..64].copy_from_slice(&signature.s().to_bytes());
    sig[64] = u8::from(recovery_id.is_y_odd()) + 27;
    Ok(sig)
}

/// Recovers the address that produced an EIP-191 signature.
pub fn recover_message_signer(message: &[u8], signature: &[u8]) -> Result<Address, EthError> {
    if signature.len() != 65 {
        return Err(EthError::SigningError(format!(
            "expected 65-byte signature, got {}",
            signature.len()
        )));
    }
    let v = match signature[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => return Err(EthError::SigningError(format!("invalid recovery byte {other}"))),
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| EthError::SigningError("invalid recovery id".into()))?;
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let digest = hash_message(message);
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| EthError::SigningError(e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

// ---------------------------------------------------------------------------
// RLP-encodable structures
// ---------------------------------------------------------------------------

#[derive(RlpEncodable)]
struct UnsignedTxFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable)]
struct SignedTxFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    access_list: Vec<AccessListItem>,
    signature_y_parity: u8,
    signature_r: U256,
    signature_s: U256,
}

/// An EIP-2930 access list entry (always empty here).
#[derive(Debug, Clone, RlpEncodable)]
struct AccessListItem {
    address: Address,
    storage_keys: Vec<B256>,
}
