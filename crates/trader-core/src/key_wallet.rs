//! A local-key wallet that speaks EIP-1193.
//!
//! Stands in for a browser extension: it owns one secp256k1 key, answers
//! account/chain queries itself, signs messages and transactions locally,
//! and forwards every other request to the active chain's JSON-RPC node.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use chain_eth::address::{address_from_signing_key, checksum, parse_address};
use chain_eth::chains::parse_chain_id;
use chain_eth::transaction::{sign_message, sign_transaction, EthTransaction};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::provider::{
    ProviderError, ProviderEvent, WalletProvider, DISCONNECTED, INVALID_PARAMS, UNAUTHORIZED, UNRECOGNIZED_CHAIN,
};
use crate::rpc::{hex_data, quantity, quantity_u128, quantity_u64, to_hex_data, RpcClient};

const EVENT_CAPACITY: usize = 16;
const FALLBACK_PRIORITY_FEE: u128 = 1_000_000_000;

struct Networks {
    active: u64,
    endpoints: HashMap<u64, Arc<RpcClient>>,
}

pub struct KeyWallet {
    key: SigningKey,
    address: Address,
    http: reqwest::Client,
    networks: RwLock<Networks>,
    events: broadcast::Sender<ProviderEvent>,
}

impl KeyWallet {
    /// Creates a wallet whose only known network is `chain_id` at `rpc_url`.
    pub fn new(key: SigningKey, chain_id: u64, rpc_url: &str, http: reqwest::Client) -> Self {
        let address = address_from_signing_key(&key);
        let mut endpoints = HashMap::new();
        endpoints.insert(chain_id, Arc::new(RpcClient::new(http.clone(), rpc_url)));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key,
            address,
            http,
            networks: RwLock::new(Networks { active: chain_id, endpoints }),
            events,
        }
    }

    /// Creates a wallet on whatever chain the node at `rpc_url` serves.
    pub async fn connect(
        key: SigningKey,
        rpc_url: &str,
        http: reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let node = RpcClient::new(http.clone(), rpc_url);
        let chain_id = quantity_u64(&node.request("eth_chainId", json!([])).await?)?;
        info!(chain_id, rpc_url, "key wallet attached to node");
        Ok(Self::new(key, chain_id, rpc_url, http))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn active_chain(&self) -> u64 {
        self.networks.read().unwrap_or_else(PoisonError::into_inner).active
    }

    fn active_rpc(&self) -> Result<(u64, Arc<RpcClient>), ProviderError> {
        let networks = self.networks.read().unwrap_or_else(PoisonError::into_inner);
        let rpc = networks.endpoints.get(&networks.active).cloned().ok_or_else(|| {
            ProviderError::new(DISCONNECTED, format!("no endpoint for chain {}", networks.active))
        })?;
        Ok((networks.active, rpc))
    }

    /// Switches to a registered chain. Broadcasts `ChainChanged` when the
    /// active chain actually changes.
    fn switch_to(&self, chain_id: u64) -> Result<(), ProviderError> {
        let changed = {
            let mut networks = self.networks.write().unwrap_or_else(PoisonError::into_inner);
            if !networks.endpoints.contains_key(&chain_id) {
                return Err(ProviderError::new(
                    UNRECOGNIZED_CHAIN,
                    format!("Unrecognized chain ID {chain_id:#x}. Try adding the chain using wallet_addEthereumChain first."),
                ));
            }
            let changed = networks.active != chain_id;
            networks.active = chain_id;
            changed
        };
        if changed {
            info!(chain_id, "wallet switched chain");
            // No subscribers is fine.
            let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        }
        Ok(())
    }

    fn add_chain(&self, params: &Value) -> Result<(), ProviderError> {
        let chain = params.get(0).ok_or_else(|| missing("chain parameters"))?;
        let chain_id = chain_id_param(chain)?;
        let rpc_url = chain
            .get("rpcUrls")
            .and_then(|urls| urls.get(0))
            .and_then(Value::as_str)
            .ok_or_else(|| missing("rpcUrls[0]"))?;
        {
            let mut networks = self.networks.write().unwrap_or_else(PoisonError::into_inner);
            networks
                .endpoints
                .insert(chain_id, Arc::new(RpcClient::new(self.http.clone(), rpc_url)));
        }
        info!(chain_id, rpc_url, "wallet registered chain");
        self.switch_to(chain_id)
    }

    fn personal_sign(&self, params: &Value) -> Result<Value, ProviderError> {
        let message = params.get(0).and_then(Value::as_str).ok_or_else(|| missing("message"))?;
        if let Some(account) = params.get(1).and_then(Value::as_str) {
            self.check_account(account)?;
        }
        let bytes = match message.strip_prefix("0x").map(hex::decode) {
            Some(Ok(decoded)) => decoded,
            _ => message.as_bytes().to_vec(),
        };
        let signature = sign_message(&bytes, &self.key)
            .map_err(|e| ProviderError::new(INVALID_PARAMS, e.to_string()))?;
        Ok(json!(to_hex_data(&signature)))
    }

    async fn send_transaction(&self, params: &Value) -> Result<Value, ProviderError> {
        let request = params.get(0).ok_or_else(|| missing("transaction"))?;
        if let Some(from) = request.get("from").and_then(Value::as_str) {
            self.check_account(from)?;
        }
        let to = request
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("to"))
            .and_then(|raw| parse_address(raw).map_err(|e| ProviderError::new(INVALID_PARAMS, e.to_string())))?;
        let data = match request.get("data") {
            Some(v) if !v.is_null() => hex_data(v)?,
            _ => Vec::new(),
        };
        let value = match request.get("value") {
            Some(v) if !v.is_null() => quantity(v)?,
            _ => U256::ZERO,
        };

        let (chain_id, rpc) = self.active_rpc()?;
        let from = checksum(&self.address);
        let call = json!({
            "from": from,
            "to": checksum(&to),
            "data": to_hex_data(&data),
            "value": format!("0x{value:x}"),
        });

        let nonce =
            quantity_u64(&rpc.request("eth_getTransactionCount", json!([from, "pending"])).await?)?;
        let gas_estimate = quantity_u64(&rpc.request("eth_estimateGas", json!([call])).await?)?;
        let gas_price = quantity_u128(&rpc.request("eth_gasPrice", json!([])).await?)?;
        let priority_fee = match rpc.request("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(v) => quantity_u128(&v)?,
            Err(_) => FALLBACK_PRIORITY_FEE.min(gas_price),
        };

        let tx = EthTransaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas: priority_fee,
            max_fee_per_gas: gas_price.saturating_mul(2).saturating_add(priority_fee),
            gas_limit: gas_estimate.saturating_add(gas_estimate / 5),
            to,
            value,
            data: Bytes::from(data),
        };
        let signed = sign_transaction(&tx, &self.key)
            .map_err(|e| ProviderError::new(INVALID_PARAMS, e.to_string()))?;
        debug!(chain_id, nonce, tx = %signed.tx_hash, "signed transaction");

        rpc.request("eth_sendRawTransaction", json!([to_hex_data(&signed.raw_tx)])).await
    }

    fn check_account(&self, account: &str) -> Result<(), ProviderError> {
        match parse_address(account) {
            Ok(addr) if addr == self.address => Ok(()),
            _ => Err(ProviderError::new(
                UNAUTHORIZED,
                format!("account {account} is not authorized by this wallet"),
            )),
        }
    }
}

#[async_trait]
impl WalletProvider for KeyWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!([checksum(&self.address)])),
            "eth_chainId" => Ok(json!(format!("{:#x}", self.active_chain()))),
            "personal_sign" => self.personal_sign(&params),
            "eth_sendTransaction" => self.send_transaction(&params).await,
            "wallet_switchEthereumChain" => {
                let chain = params.get(0).ok_or_else(|| missing("chainId"))?;
                self.switch_to(chain_id_param(chain)?)?;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                self.add_chain(&params)?;
                Ok(Value::Null)
            }
            _ => {
                let (_, rpc) = self.active_rpc()?;
                rpc.request(method, params).await
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

fn chain_id_param(chain: &Value) -> Result<u64, ProviderError> {
    let raw = chain.get("chainId").and_then(Value::as_str).ok_or_else(|| missing("chainId"))?;
    parse_chain_id(raw).map_err(|e| ProviderError::new(INVALID_PARAMS, e.to_string()))
}

fn missing(field: &str) -> ProviderError {
    ProviderError::new(INVALID_PARAMS, format!("missing parameter: {field}"))
}
