use thiserror::Error;

use crate::provider::ProviderError;

/// Errors surfaced by the trader client.
///
/// Every variant is recoverable; flows turn them into a single notification
/// and leave the session usable.
#[derive(Debug, Error)]
pub enum TraderError {
    #[error("MetaMask is not installed. Please install it to use this dApp.")]
    MissingProvider,

    #[error("Please connect your wallet first.")]
    NotConnected,

    #[error("User rejected the transaction")]
    UserRejected,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient USDC balance: you only have {balance} USDC")]
    InsufficientBalance { balance: String },

    #[error("Insufficient allowance: {allowance} USDC approved, approve the deposit amount first")]
    InsufficientAllowance { allowance: String },

    #[error("transaction failed: {0}")]
    OnChain(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Provider(ProviderError),

    #[error("{0}")]
    Backend(String),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Eth(#[from] chain_eth::error::EthError),
}

impl TraderError {
    /// Whether the failure is a transient provider rate limit worth retrying.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, TraderError::RateLimited(_))
    }

    /// Text shown to the user in a failure notification.
    pub fn user_message(&self) -> String {
        match self {
            TraderError::OnChain(reason) => reason.clone(),
            TraderError::RateLimited(message) => message.clone(),
            TraderError::Provider(err) => err.message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ProviderError> for TraderError {
    fn from(err: ProviderError) -> Self {
        if err.is_user_rejected() {
            TraderError::UserRejected
        } else if err.is_rate_limit() {
            TraderError::RateLimited(err.message)
        } else if let Some(reason) = err.revert_reason() {
            TraderError::OnChain(reason)
        } else {
            TraderError::Provider(err)
        }
    }
}
