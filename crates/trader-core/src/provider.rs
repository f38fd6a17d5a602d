//! The wallet-provider seam (EIP-1193).
//!
//! Everything the client does on-chain goes through [`WalletProvider::request`],
//! the same single entry point a browser wallet injects. Account and chain
//! changes arrive on a broadcast channel from [`WalletProvider::subscribe`].

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// The user rejected the request (EIP-1193).
pub const USER_REJECTED: i64 = 4001;
/// The requested account or method is not authorized (EIP-1193).
pub const UNAUTHORIZED: i64 = 4100;
/// The provider is disconnected from all chains (EIP-1193).
pub const DISCONNECTED: i64 = 4900;
/// `wallet_switchEthereumChain` target is not registered in the wallet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
/// JSON-RPC "limit exceeded", used by nodes for rate limiting.
pub const LIMIT_EXCEEDED: i64 = -32005;
/// JSON-RPC invalid params.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC internal error.
pub const INTERNAL_ERROR: i64 = -32603;

const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "too many requests", "request limit"];

/// An error returned by a provider request, shaped like an EIP-1193
/// `ProviderRpcError`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self { code, message: message.into(), data: Some(data) }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == USER_REJECTED || self.message.contains("ACTION_REJECTED")
    }

    /// Transient rate limiting: code -32005 / HTTP 429, or a known phrase in
    /// the message.
    pub fn is_rate_limit(&self) -> bool {
        if self.code == LIMIT_EXCEEDED || self.code == 429 {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        RATE_LIMIT_PATTERNS.iter().any(|p| message.contains(p))
    }

    /// Decoded `Error(string)` reason when `data` carries revert bytes.
    pub fn revert_reason(&self) -> Option<String> {
        let raw = self.data.as_ref()?.as_str()?;
        let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).ok()?;
        chain_eth::abi::decode_revert_reason(&bytes)
    }
}

/// Notifications a wallet pushes to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// `accountsChanged`: the new authorized accounts, first one active.
    AccountsChanged(Vec<Address>),
    /// `chainChanged`: the new active chain id.
    ChainChanged(u64),
}

/// An EIP-1193 wallet provider.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Performs a JSON-RPC style request such as `eth_requestAccounts`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Subscribes to account and chain notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
