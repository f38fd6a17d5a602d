use serde::Serialize;
use serde_json::{json, Value};

use crate::error::EthError;

/// Definition of an EVM-compatible blockchain network.
#[derive(Debug, Clone, Serialize)]
pub struct EvmChain {
    pub chain_id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    pub rpc_url: &'static str,
    pub explorer_url: Option<&'static str>,
    pub is_testnet: bool,
}

impl EvmChain {
    /// Chain id in the `0x`-prefixed hex form wallets exchange.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain` (EIP-3085).
    pub fn add_chain_params(&self) -> Value {
        let explorers: Vec<&str> = self.explorer_url.into_iter().collect();
        json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.symbol,
                "symbol": self.symbol,
                "decimals": self.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": explorers,
        })
    }
}

/// Local Anvil / Hardhat node (chain ID 31337).
pub const LOCALHOST: EvmChain = EvmChain {
    chain_id: 31337,
    name: "Anvil Localhost",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "http://127.0.0.1:8545",
    explorer_url: None,
    is_testnet: true,
};

/// Ethereum Mainnet (chain ID 1).
pub const ETHEREUM: EvmChain = EvmChain {
    chain_id: 1,
    name: "Ethereum",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://eth.llamarpc.com",
    explorer_url: Some("https://etherscan.io"),
    is_testnet: false,
};

/// Arbitrum One (chain ID 42161).
pub const ARBITRUM: EvmChain = EvmChain {
    chain_id: 42161,
    name: "Arbitrum One",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://arb1.arbitrum.io/rpc",
    explorer_url: Some("https://arbiscan.io"),
    is_testnet: false,
};

/// Base (chain ID 8453).
pub const BASE: EvmChain = EvmChain {
    chain_id: 8453,
    name: "Base",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://mainnet.base.org",
    explorer_url: Some("https://basescan.org"),
    is_testnet: false,
};

/// Sepolia Testnet (chain ID 11155111).
pub const SEPOLIA: EvmChain = EvmChain {
    chain_id: 11155111,
    name: "Sepolia",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://rpc.sepolia.org",
    explorer_url: Some("https://sepolia.etherscan.io"),
    is_testnet: true,
};

/// Base Sepolia Testnet (chain ID 84532).
pub const BASE_SEPOLIA: EvmChain = EvmChain {
    chain_id: 84532,
    name: "Base Sepolia",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://sepolia.base.org",
    explorer_url: Some("https://sepolia.basescan.org"),
    is_testnet: true,
};

/// All known EVM chains.
const ALL_CHAINS: &[&EvmChain] = &[
    &LOCALHOST,
    &ETHEREUM,
    &ARBITRUM,
    &BASE,
    &SEPOLIA,
    &BASE_SEPOLIA,
];

/// Returns the chain definition for a given chain ID, or `None` if unknown.
pub fn get_chain(chain_id: u64) -> Option<&'static EvmChain> {
    ALL_CHAINS
        .iter()
        .find(|c| c.chain_id == chain_id)
        .copied()
}

/// Returns the chain definition or [`EthError::UnsupportedChain`].
pub fn require_chain(chain_id: u64) -> Result<&'static EvmChain, EthError> {
    get_chain(chain_id).ok_or(EthError::UnsupportedChain(chain_id))
}

/// Returns all known EVM chain definitions.
pub fn supported_chains() -> Vec<&'static EvmChain> {
    ALL_CHAINS.to_vec()
}

/// Parses a chain id as returned by `eth_chainId` (`"0x7a69"`) or given
/// in decimal (`"31337"`).
pub fn parse_chain_id(raw: &str) -> Result<u64, EthError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex_part) => u64::from_str_radix(hex_part, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| EthError::EncodingError(format!("invalid chain id {raw:?}: {e}")))
}
