//! Calldata for the settlement contract that holds user deposits.
//!
//! Only the two entry points the client touches are bound here:
//! `deposit(uint256)` and `getDeposit(address) -> uint256`.

use alloy_primitives::{Address, U256};

use crate::abi::{decode_uint256, encode_function_call, selector, AbiParam};
use crate::error::EthError;

pub const DEPOSIT_SIGNATURE: &str = "deposit(uint256)";
pub const GET_DEPOSIT_SIGNATURE: &str = "getDeposit(address)";

/// Encodes `deposit(uint256)` with the amount in token base units.
pub fn encode_deposit(amount: U256) -> Vec<u8> {
    encode_function_call(selector(DEPOSIT_SIGNATURE), &[AbiParam::Uint256(amount)])
}

/// Encodes `getDeposit(address)`.
pub fn encode_get_deposit(user: Address) -> Vec<u8> {
    encode_function_call(selector(GET_DEPOSIT_SIGNATURE), &[AbiParam::Address(user)])
}

/// Decodes the return data of `getDeposit`.
pub fn decode_get_deposit(data: &[u8]) -> Result<U256, EthError> {
    decode_uint256(data)
}
