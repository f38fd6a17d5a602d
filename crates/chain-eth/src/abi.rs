/// Minimal ABI encoding for EVM function calls.
///
/// Covers the static argument types the token and settlement contracts need
/// (`address`, `uint256`) plus decoding of single-word return values and
/// `Error(string)` revert payloads.
use alloy_primitives::{Address, U256};
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Selector of the `Error(string)` revert payload: `0x08c379a0`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// A single ABI-encoded parameter.
#[derive(Debug, Clone)]
pub enum AbiParam {
    /// A 20-byte address, left-padded to 32 bytes.
    Address(Address),
    /// A 256-bit unsigned integer, big-endian.
    Uint256(U256),
}

/// Computes the 4-byte selector of a canonical function signature such as
/// `"getDeposit(address)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Encodes a function call with the given 4-byte selector and ABI parameters.
///
/// The output is `selector || encode(params[0]) || encode(params[1]) || ...`
/// where each parameter is encoded as a 32-byte ABI word.
pub fn encode_function_call(selector: [u8; 4], params: &[AbiParam]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + params.len() * 32);
    data.extend_from_slice(&selector);

    for param in params {
        data.extend_from_slice(&encode_param(param));
    }

    data
}

/// Encodes a single [`AbiParam`] as a 32-byte ABI word.
fn encode_param(param: &AbiParam) -> [u8; 32] {
    match param {
        AbiParam::Address(addr) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(addr.as_slice());
            word
        }
        AbiParam::Uint256(value) => value.to_be_bytes::<32>(),
    }
}

/// Decodes a single uint256 return value from ABI-encoded data.
///
/// Extra trailing words are ignored.
pub fn decode_uint256(data: &[u8]) -> Result<U256, EthError> {
    if data.len() < 32 {
        return Err(EthError::EncodingError(format!(
            "expected at least 32 bytes for uint256, got {}",
            data.len()
        )));
    }

    Ok(U256::from_be_slice(&data[..32]))
}

/// Extracts the reason string from an `Error(string)` revert payload.
///
/// Returns `None` for custom errors, panics, or malformed data.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR)?;
    if body.len() < 64 {
        return None;
    }
    let offset = usize::try_from(U256::from_be_slice(&body[..32])).ok()?;
    let len_end = offset.checked_add(32)?;
    let len = usize::try_from(U256::from_be_slice(body.get(offset..len_end)?)).ok()?;
    let bytes = body.get(len_end..len_end.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
