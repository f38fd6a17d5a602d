//! Typed handles for the two contracts the client talks to.

use alloy_primitives::{Address, U256};
use chain_eth::{erc20, settlement};

use crate::error::TraderError;
use crate::signer::{PendingTransaction, Signer};

/// An ERC-20 token bound to a signer.
#[derive(Debug, Clone)]
pub struct Erc20Token {
    address: Address,
    signer: Signer,
}

impl Erc20Token {
    pub fn new(address: Address, signer: Signer) -> Self {
        Self { address, signer }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256, TraderError> {
        let data = self.signer.call(self.address, erc20::encode_balance_of(owner)).await?;
        Ok(erc20::decode_amount(&data)?)
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, TraderError> {
        let data = self
            .signer
            .call(self.address, erc20::encode_allowance(owner, spender))
            .await?;
        Ok(erc20::decode_amount(&data)?)
    }

    pub async fn approve(
        &self,
        spender: Address,
        amount: U256,
    ) -> Result<PendingTransaction, TraderError> {
        self.signer
            .send_transaction(self.address, erc20::encode_approve(spender, amount))
            .await
    }
}

/// The settlement contract holding user deposits.
#[derive(Debug, Clone)]
pub struct SettlementContract {
    address: Address,
    signer: Signer,
}

impl SettlementContract {
    pub fn new(address: Address, signer: Signer) -> Self {
        Self { address, signer }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn get_deposit(&self, user: Address) -> Result<U256, TraderError> {
        let data = self
            .signer
            .call(self.address, settlement::encode_get_deposit(user))
            .await?;
        Ok(settlement::decode_get_deposit(&data)?)
    }

    pub async fn deposit(&self, amount: U256) -> Result<PendingTransaction, TraderError> {
        self.signer
            .send_transaction(self.address, settlement::encode_deposit(amount))
            .await
    }
}
