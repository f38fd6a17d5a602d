//! The local-key wallet against an in-process JSON-RPC node.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, U256};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chain_eth::chains::LOCALHOST;
use chain_eth::transaction::signing_key_from_hex;
use common::{settlement_address, usdc_address, ANVIL_KEY};
use serde_json::{json, Value};
use trader_core::deposit::{DepositFlow, RetryPolicy};
use trader_core::key_wallet::KeyWallet;
use trader_core::notify::ToastBoard;
use trader_core::provider::{WalletProvider, LIMIT_EXCEEDED};
use trader_core::rpc::RpcClient;
use trader_core::session::{ConnectionState, WalletSession};
use trader_core::store::MemoryStore;

#[derive(Default)]
struct Node {
    methods: Vec<String>,
    raw_txs: Vec<Vec<u8>>,
    throttle: u32,
}

type SharedNode = Arc<Mutex<Node>>;

async fn rpc(State(node): State<SharedNode>, Json(body): Json<Value>) -> Response {
    let id = body["id"].clone();
    let method = body["method"].as_str().unwrap_or_default().to_string();
    let mut node = node.lock().unwrap();
    node.methods.push(method.clone());

    let result = match method.as_str() {
        "eth_chainId" => json!("0x7a69"),
        "eth_getTransactionCount" => json!("0x5"),
        "eth_estimateGas" => json!("0xc350"),
        "eth_gasPrice" => json!("0x3b9aca00"),
        "eth_maxPriorityFeePerGas" => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" },
            }))
            .into_response();
        }
        "eth_call" if node.throttle > 0 => {
            node.throttle -= 1;
            return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
        }
        "eth_call" => json!(format!("0x{}", hex::encode(U256::from(1_000_000u64).to_be_bytes::<32>()))),
        "eth_sendRawTransaction" => {
            let raw = body["params"][0].as_str().unwrap_or_default();
            let raw = hex::decode(raw.trim_start_matches("0x")).unwrap_or_default();
            let hash = keccak256(&raw);
            node.raw_txs.push(raw);
            json!(hash)
        }
        "eth_getTransactionReceipt" => json!({
            "transactionHash": body["params"][0],
            "blockNumber": "0x2",
            "status": "0x1",
        }),
        _ => Value::Null,
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

async fn spawn_node(throttle: u32) -> (String, SharedNode) {
    let node: SharedNode = Arc::new(Mutex::new(Node { throttle, ..Node::default() }));
    let app = Router::new().route("/", post(rpc)).with_state(node.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), node)
}

fn anvil_key() -> k256::ecdsa::SigningKey {
    signing_key_from_hex(ANVIL_KEY).unwrap()
}

#[tokio::test]
async fn connect_reads_node_chain() {
    let (url, _) = spawn_node(0).await;
    let wallet = KeyWallet::connect(anvil_key(), &url, reqwest::Client::new()).await.unwrap();
    assert_eq!(wallet.active_chain(), 31337);
}

#[tokio::test]
async fn send_transaction_signs_locally_and_broadcasts() {
    let (url, node) = spawn_node(0).await;
    let wallet = KeyWallet::new(anvil_key(), 31337, &url, reqwest::Client::new());

    let params = json!([{
        "from": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        "to": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        "data": "0x",
    }]);
    let hash = wallet.request("eth_sendTransaction", params).await.unwrap();

    let node = node.lock().unwrap();
    assert_eq!(
        node.methods,
        vec![
            "eth_getTransactionCount",
            "eth_estimateGas",
            "eth_gasPrice",
            "eth_maxPriorityFeePerGas",
            "eth_sendRawTransaction",
        ]
    );
    let raw = &node.raw_txs[0];
    assert_eq!(raw[0], 0x02);
    assert_eq!(hash, json!(keccak256(raw)));
}

#[tokio::test]
async fn foreign_sender_is_refused_before_touching_node() {
    let (url, node) = spawn_node(0).await;
    let wallet = KeyWallet::new(anvil_key(), 31337, &url, reqwest::Client::new());

    let params = json!([{
        "from": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "to": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        "data": "0x",
    }]);
    assert!(wallet.request("eth_sendTransaction", params).await.is_err());
    assert!(node.lock().unwrap().methods.is_empty());
}

#[tokio::test]
async fn http_429_is_a_rate_limit() {
    let (url, _) = spawn_node(1).await;
    let client = RpcClient::new(reqwest::Client::new(), url);

    let err = client.request("eth_call", json!([])).await.unwrap_err();
    assert_eq!(err.code, LIMIT_EXCEEDED);
    assert!(err.is_rate_limit());
}

#[tokio::test]
async fn deposit_end_to_end_through_key_wallet() {
    let (url, node) = spawn_node(2).await;
    let wallet = Arc::new(KeyWallet::new(anvil_key(), 31337, &url, reqwest::Client::new()));
    let (session, _signals) = WalletSession::new(
        Some(wallet as Arc<dyn WalletProvider>),
        Arc::new(MemoryStore::default()),
        Arc::new(ToastBoard::new()),
        LOCALHOST,
    );
    let session = Arc::new(session.with_receipt_poll(Duration::from_millis(10)));
    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);

    let flow = DepositFlow::new(session.clone(), usdc_address(), settlement_address())
        .with_retry(RetryPolicy { max_retries: 2, delay: Duration::from_millis(10) });

    let balances = flow.load_balances().await.unwrap();
    assert_eq!(balances.wallet, U256::from(1_000_000u64));

    flow.set_amount("0.5");
    flow.approve().await.unwrap();
    flow.deposit().await.unwrap();

    let node = node.lock().unwrap();
    assert_eq!(node.raw_txs.len(), 2);
    assert_eq!(node.methods.iter().filter(|m| *m == "eth_call").count(), 5 + 3 + 3);
}
