use alloy_primitives::{Address, U256};

use crate::abi::{decode_uint256, encode_function_call, AbiParam};
use crate::error::EthError;

/// Function selector for `approve(address,uint256)`: `0x095ea7b3`.
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Function selector for `allowance(address,address)`: `0xdd62ed3e`.
const ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];

/// Function selector for `balanceOf(address)`: `0x70a08231`.
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Encodes an ERC-20 `approve(address,uint256)` call.
pub fn encode_approve(spender: Address, amount: U256) -> Vec<u8> {
    let params = [AbiParam::Address(spender), AbiParam::Uint256(amount)];
    encode_function_call(APPROVE_SELECTOR, &params)
}

/// Encodes an ERC-20 `allowance(address,address)` call.
pub fn encode_allowance(owner: Address, spender: Address) -> Vec<u8> {
    let params = [AbiParam::Address(owner), AbiParam::Address(spender)];
    encode_function_call(ALLOWANCE_SELECTOR, &params)
}

/// Encodes an ERC-20 `balanceOf(address)` call.
pub fn encode_balance_of(owner: Address) -> Vec<u8> {
    let params = [AbiParam::Address(owner)];
    encode_function_call(BALANCE_OF_SELECTOR, &params)
}

/// Decodes the return data of `balanceOf` or `allowance`.
pub fn decode_amount(data: &[u8]) -> Result<U256, EthError> {
    decode_uint256(data)
}
