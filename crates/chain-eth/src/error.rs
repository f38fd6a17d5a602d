use thiserror::Error;

/// Errors from encoding, signing and parsing EVM values.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),
}
