use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U64};
use chain_eth::address::checksum;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::TraderError;
use crate::provider::{ProviderError, WalletProvider, INTERNAL_ERROR};
use crate::rpc::{hex_data, to_hex_data};

pub const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(1);

/// An account that can sign messages and send transactions through its
/// wallet provider.
#[derive(Clone)]
pub struct Signer {
    provider: Arc<dyn WalletProvider>,
    address: Address,
    receipt_poll: Duration,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Inclusion result of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    status: Option<U64>,
}

/// A submitted transaction awaiting inclusion.
pub struct PendingTransaction {
    provider: Arc<dyn WalletProvider>,
    hash: B256,
    receipt_poll: Duration,
}

impl Signer {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address, receipt_poll: DEFAULT_RECEIPT_POLL }
    }

    pub fn with_receipt_poll(mut self, interval: Duration) -> Self {
        self.receipt_poll = interval;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-191 `personal_sign` over a UTF-8 message. Returns the `0x` hex
    /// signature exactly as the wallet produced it.
    pub async fn sign_message(&self, message: &str) -> Result<String, TraderError> {
        let params = json!([to_hex_data(message.as_bytes()), checksum(&self.address)]);
        let signature = self.provider.request("personal_sign", params).await?;
        signature
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| unexpected("personal_sign", &signature))
    }

    /// Read-only `eth_call` against the latest block.
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, TraderError> {
        let params = json!([
            { "from": checksum(&self.address), "to": checksum(&to), "data": to_hex_data(&data) },
            "latest"
        ]);
        let result = self.provider.request("eth_call", params).await?;
        Ok(hex_data(&result)?)
    }

    /// Submits a contract call through the wallet (`eth_sendTransaction`).
    pub async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> Result<PendingTransaction, TraderError> {
        let params = json!([{
            "from": checksum(&self.address),
            "to": checksum(&to),
            "data": to_hex_data(&data),
        }]);
        let result = self.provider.request("eth_sendTransaction", params).await?;
        let hash: B256 = serde_json::from_value(result.clone())
            .map_err(|_| unexpected("eth_sendTransaction", &result))?;
        info!(tx = %hash, to = %to, "transaction submitted");
        Ok(PendingTransaction {
            provider: Arc::clone(&self.provider),
            hash,
            receipt_poll: self.receipt_poll,
        })
    }
}

impl PendingTransaction {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Polls `eth_getTransactionReceipt` until the transaction is included.
    ///
    /// A receipt with status 0 is reported as [`TraderError::OnChain`].
    pub async fn wait(&self) -> Result<TransactionReceipt, TraderError> {
        loop {
            let result = self
                .provider
                .request("eth_getTransactionReceipt", json!([self.hash]))
                .await?;
            if result.is_null() {
                debug!(tx = %self.hash, "receipt pending");
                tokio::time::sleep(self.receipt_poll).await;
                continue;
            }

            let raw: RawReceipt = serde_json::from_value(result.clone())
                .map_err(|_| unexpected("eth_getTransactionReceipt", &result))?;
            if raw.status.is_some_and(|s| s.is_zero()) {
                return Err(TraderError::OnChain(format!("transaction {} reverted", raw.transaction_hash)));
            }
            let block_number = raw.block_number.map_or(0, |n| n.to::<u64>());
            info!(tx = %raw.transaction_hash, block_number, "transaction included");
            return Ok(TransactionReceipt { transaction_hash: raw.transaction_hash, block_number });
        }
    }
}

fn unexpected(method: &str, value: &Value) -> TraderError {
    TraderError::Provider(ProviderError::new(
        INTERNAL_ERROR,
        format!("unexpected {method} result: {value}"),
    ))
}
