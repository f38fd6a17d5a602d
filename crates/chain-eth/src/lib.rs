//! EVM chain support for the Arc-Yellow trader client.
//!
//! This crate provides:
//! - EIP-55 address checksums and display helpers
//! - EIP-1559 transaction building and signing
//! - EIP-191 personal message signing and recovery
//! - ERC-20 and settlement-contract calldata encoding
//! - Fixed-decimal unit conversion (USDC uses 6 decimals)
//! - EVM network definitions for `wallet_addEthereumChain`
//! - Minimal ABI encoding utilities

pub mod abi;
pub mod address;
pub mod chains;
pub mod erc20;
pub mod error;
pub mod settlement;
pub mod transaction;
pub mod units;
