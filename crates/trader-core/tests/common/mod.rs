//! Shared fixtures: a scripted in-memory wallet that simulates the USDC
//! token and the settlement contract, plus session builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chain_eth::abi::selector;
use chain_eth::address::{address_from_signing_key, checksum, parse_address};
use chain_eth::chains::{parse_chain_id, LOCALHOST};
use chain_eth::transaction::{sign_message, signing_key_from_hex};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use trader_core::deposit::{DepositFlow, RetryPolicy};
use trader_core::notify::ToastBoard;
use trader_core::provider::{ProviderError, ProviderEvent, WalletProvider, UNRECOGNIZED_CHAIN, USER_REJECTED};
use trader_core::session::{SessionSignal, WalletSession};
use trader_core::store::MemoryStore;

pub const ANVIL_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const SECOND_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const USDC: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const SETTLEMENT: &str = "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9";

pub fn usdc(units: u64) -> U256 {
    U256::from(units) * U256::from(1_000_000u64)
}

pub fn usdc_address() -> Address {
    parse_address(USDC).unwrap()
}

pub fn settlement_address() -> Address {
    parse_address(SETTLEMENT).unwrap()
}

#[derive(Debug, Default)]
struct Ledger {
    chain_id: u64,
    known_chains: HashSet<u64>,
    accounts: Vec<Address>,
    balance: U256,
    allowance: U256,
    deposited: U256,
    tx_count: u64,
}

/// A wallet backed by an in-memory ledger. Queued responses for a method
/// take precedence over the simulation.
pub struct MockWallet {
    key: SigningKey,
    address: Address,
    ledger: Mutex<Ledger>,
    calls: Mutex<Vec<(String, Value)>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, ProviderError>>>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Arc<Self> {
        let key = signing_key_from_hex(ANVIL_KEY).unwrap();
        let address = address_from_signing_key(&key);
        let (events, _) = broadcast::channel(16);
        let ledger = Ledger {
            chain_id,
            known_chains: HashSet::from([chain_id]),
            accounts: vec![address],
            ..Ledger::default()
        };
        Arc::new(Self {
            key,
            address,
            ledger: Mutex::new(ledger),
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn fund(&self, balance: U256, allowance: U256, deposited: U256) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.balance = balance;
        ledger.allowance = allowance;
        ledger.deposited = deposited;
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.ledger.lock().unwrap().accounts = accounts;
    }

    pub fn active_chain(&self) -> u64 {
        self.ledger.lock().unwrap().chain_id
    }

    pub fn balances(&self) -> (U256, U256, U256) {
        let ledger = self.ledger.lock().unwrap();
        (ledger.balance, ledger.allowance, ledger.deposited)
    }

    /// Queues a one-shot response for `method`.
    pub fn script(&self, method: &str, response: Result<Value, ProviderError>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn reject(&self, method: &str) {
        self.script(method, Err(ProviderError::new(USER_REJECTED, "User rejected the request.")));
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Function signatures of every submitted transaction, in order.
    pub fn sent(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == "eth_sendTransaction")
            .filter_map(|(_, params)| {
                let data = calldata(&params[0]);
                known_function(&data[..4])
            })
            .collect()
    }

    fn simulate(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let mut ledger = self.ledger.lock().unwrap();
        match method {
            "eth_requestAccounts" | "eth_accounts" => {
                Ok(json!(ledger.accounts.iter().map(checksum).collect::<Vec<_>>()))
            }
            "eth_chainId" => Ok(json!(format!("{:#x}", ledger.chain_id))),
            "wallet_switchEthereumChain" => {
                let chain_id = parse_chain_id(params[0]["chainId"].as_str().unwrap()).unwrap();
                if !ledger.known_chains.contains(&chain_id) {
                    return Err(ProviderError::new(UNRECOGNIZED_CHAIN, "Unrecognized chain ID"));
                }
                ledger.chain_id = chain_id;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain_id = parse_chain_id(params[0]["chainId"].as_str().unwrap()).unwrap();
                ledger.known_chains.insert(chain_id);
                ledger.chain_id = chain_id;
                Ok(Value::Null)
            }
            "personal_sign" => {
                let raw = params[0].as_str().unwrap();
                let message = hex::decode(raw.trim_start_matches("0x")).unwrap();
                let signature = sign_message(&message, &self.key).unwrap();
                Ok(json!(format!("0x{}", hex::encode(signature))))
            }
            "eth_call" => {
                let data = calldata(&params[0]);
                let value = match known_function(&data[..4]) {
                    Some("balanceOf(address)") => ledger.balance,
                    Some("allowance(address,address)") => ledger.allowance,
                    Some("getDeposit(address)") => ledger.deposited,
                    other => panic!("unexpected eth_call {other:?}"),
                };
                Ok(json!(format!("0x{}", hex::encode(value.to_be_bytes::<32>()))))
            }
            "eth_sendTransaction" => {
                let data = calldata(&params[0]);
                match known_function(&data[..4]) {
                    Some("approve(address,uint256)") => {
                        ledger.allowance = U256::from_be_slice(&data[36..68]);
                    }
                    Some("deposit(uint256)") => {
                        let amount = U256::from_be_slice(&data[4..36]);
                        ledger.balance -= amount;
                        ledger.allowance -= amount;
                        ledger.deposited += amount;
                    }
                    other => panic!("unexpected transaction {other:?}"),
                }
                ledger.tx_count += 1;
                Ok(json!(tx_hash(ledger.tx_count)))
            }
            "eth_getTransactionReceipt" => Ok(json!({
                "transactionHash": params[0],
                "blockNumber": "0x1",
                "status": "0x1",
            })),
            other => panic!("unexpected request {other}"),
        }
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push((method.to_string(), params.clone()));
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None => self.simulate(method, &params),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

fn calldata(tx: &Value) -> Vec<u8> {
    hex::decode(tx["data"].as_str().unwrap().trim_start_matches("0x")).unwrap()
}

fn known_function(sel: &[u8]) -> Option<&'static str> {
    [
        "balanceOf(address)",
        "allowance(address,address)",
        "approve(address,uint256)",
        "getDeposit(address)",
        "deposit(uint256)",
    ]
    .into_iter()
    .find(|sig| selector(sig) == sel)
}

fn tx_hash(n: u64) -> B256 {
    keccak256(n.to_be_bytes())
}

/// Everything a test needs to drive the flows.
pub struct Harness {
    pub wallet: Arc<MockWallet>,
    pub store: Arc<MemoryStore>,
    pub toasts: Arc<ToastBoard>,
    pub session: Arc<WalletSession>,
    pub signals: mpsc::UnboundedReceiver<SessionSignal>,
}

impl Harness {
    pub fn new(wallet_chain: u64, remembered: bool) -> Self {
        let wallet = MockWallet::new(wallet_chain);
        let store = Arc::new(MemoryStore::new(remembered));
        let toasts = Arc::new(ToastBoard::new());
        let (session, signals) = WalletSession::new(
            Some(wallet.clone() as Arc<dyn WalletProvider>),
            store.clone(),
            toasts.clone(),
            LOCALHOST,
        );
        let session = Arc::new(session.with_receipt_poll(Duration::from_millis(10)));
        Self { wallet, store, toasts, session, signals }
    }

    /// A wallet already on the local chain.
    pub fn local() -> Self {
        Self::new(LOCALHOST.chain_id, false)
    }

    pub fn deposit_flow(&self) -> DepositFlow {
        DepositFlow::new(self.session.clone(), usdc_address(), settlement_address())
            .with_retry(RetryPolicy::default())
    }
}

pub fn second_address() -> Address {
    address_from_signing_key(&signing_key_from_hex(SECOND_KEY).unwrap())
}
