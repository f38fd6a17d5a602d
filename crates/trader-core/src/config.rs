//! Runtime configuration, read from `TRADER_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use chain_eth::address::parse_address;
use chain_eth::chains::{require_chain, EvmChain};
use secrecy::SecretString;

use crate::error::TraderError;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_SETTLEMENT_ADDRESS: &str = "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9";
pub const DEFAULT_USDC_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const DEFAULT_STATE_DIR: &str = "./.trader";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECEIPT_POLL_MS: u64 = 1000;

#[derive(Debug)]
pub struct TraderConfig {
    /// Relayer backend base URL, without a trailing slash.
    pub backend_api_url: String,
    pub rpc_url: String,
    /// Chain the session forces the wallet onto.
    pub chain_id: u64,
    pub settlement_address: Address,
    pub usdc_address: Address,
    /// Key for the local wallet. `None` means no wallet is available.
    pub private_key: Option<SecretString>,
    /// Where the connected flag is persisted.
    pub state_dir: PathBuf,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub receipt_poll: Duration,
}

impl TraderConfig {
    /// Builds the config from any key lookup; unset and empty values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TraderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend_api_url = get("TRADER_BACKEND_API_URL")
            .ok_or_else(|| TraderError::Config("TRADER_BACKEND_API_URL is required".into()))?
            .trim_end_matches('/')
            .to_string();

        let chain_id = parsed(&get, "TRADER_CHAIN_ID", DEFAULT_CHAIN_ID)?;
        require_chain(chain_id).map_err(|e| TraderError::Config(format!("TRADER_CHAIN_ID: {e}")))?;

        Ok(Self {
            backend_api_url,
            rpc_url: get("TRADER_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            chain_id,
            settlement_address: address(&get, "TRADER_SETTLEMENT_ADDRESS", DEFAULT_SETTLEMENT_ADDRESS)?,
            usdc_address: address(&get, "TRADER_USDC_ADDRESS", DEFAULT_USDC_ADDRESS)?,
            private_key: get("TRADER_PRIVATE_KEY").map(SecretString::from),
            state_dir: get("TRADER_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from),
            request_timeout: Duration::from_secs(parsed(
                &get,
                "TRADER_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            connect_timeout: Duration::from_secs(parsed(
                &get,
                "TRADER_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            receipt_poll: Duration::from_millis(parsed(&get, "TRADER_RECEIPT_POLL_MS", DEFAULT_RECEIPT_POLL_MS)?),
        })
    }

    pub fn target_chain(&self) -> Result<EvmChain, TraderError> {
        Ok(require_chain(self.chain_id)?.clone())
    }

    /// Shared HTTP client for the RPC node and the backend.
    pub fn http_client(&self) -> Result<reqwest::Client, TraderError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| TraderError::Config(format!("http client: {e}")))
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> Result<T, TraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| TraderError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}

fn address<G>(get: &G, key: &str, default: &str) -> Result<Address, TraderError>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    parse_address(&raw).map_err(|e| TraderError::Config(format!("{key}: {e}")))
}
