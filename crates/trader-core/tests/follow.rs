//! Follow authorization against an in-process backend.

mod common;

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chain_eth::address::parse_address;
use chain_eth::transaction::recover_message_signer;
use common::Harness;
use serde_json::{json, Value};
use trader_core::api::{ApiClient, Command, CommandPayload};
use trader_core::follow::{FollowFlow, AUTHORIZATION_MESSAGE, OP_FOLLOW};
use trader_core::notify::NoticeKind;
use trader_core::TraderError;

#[derive(Clone)]
struct Backend {
    status: StatusCode,
    reply: String,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn command(State(backend): State<Backend>, Json(body): Json<Value>) -> (StatusCode, String) {
    backend.received.lock().unwrap().push(body);
    (backend.status, backend.reply.clone())
}

/// Serves `/api/command` with a fixed reply; returns the base URL and the
/// bodies it received.
async fn spawn_backend(status: StatusCode, reply: &str) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let backend = Backend { status, reply: reply.to_string(), received: received.clone() };
    let app = Router::new().route("/api/command", post(command)).with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), received)
}

#[tokio::test]
async fn authorize_posts_signed_follow_command() {
    let (url, received) = spawn_backend(StatusCode::OK, r#"{"status":"ok"}"#).await;
    let h = Harness::local();
    h.session.connect().await.unwrap();
    let flow = FollowFlow::new(h.session.clone(), ApiClient::new(url));

    let response = flow.authorize().await.unwrap();
    assert_eq!(response.status(), Some("ok"));

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["command"], "follow");
    assert_eq!(body["address"], "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    let signature = body["signature"].as_str().unwrap();
    let signature = hex::decode(signature.trim_start_matches("0x")).unwrap();
    let signer = recover_message_signer(AUTHORIZATION_MESSAGE.as_bytes(), &signature).unwrap();
    assert_eq!(signer, h.wallet.address());

    assert_eq!(
        h.toasts.titles_for(OP_FOLLOW),
        vec!["Waiting for signature...", "Sending authorization to backend...", "Authorization Successful!"]
    );
    assert_eq!(h.wallet.count("eth_sendTransaction"), 0);
}

#[tokio::test]
async fn authorize_requires_connection() {
    let (url, received) = spawn_backend(StatusCode::OK, r#"{"status":"ok"}"#).await;
    let h = Harness::local();
    let flow = FollowFlow::new(h.session.clone(), ApiClient::new(url));

    assert!(matches!(flow.authorize().await, Err(TraderError::NotConnected)));
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(h.toasts.last().unwrap().title, "Please connect your wallet first.");
}

#[tokio::test]
async fn rejected_signature_never_reaches_backend() {
    let (url, received) = spawn_backend(StatusCode::OK, r#"{"status":"ok"}"#).await;
    let h = Harness::local();
    h.session.connect().await.unwrap();
    h.wallet.reject("personal_sign");
    let flow = FollowFlow::new(h.session.clone(), ApiClient::new(url));

    assert!(matches!(flow.authorize().await, Err(TraderError::UserRejected)));
    assert!(received.lock().unwrap().is_empty());

    let notice = h.toasts.get(OP_FOLLOW).unwrap();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.title, "Authorization Failed");
    assert_eq!(notice.description.as_deref(), Some("User rejected the signature request."));
}

#[tokio::test]
async fn backend_message_is_surfaced() {
    let (url, _) = spawn_backend(StatusCode::BAD_REQUEST, r#"{"message":"Signature invalid"}"#).await;
    let h = Harness::local();
    h.session.connect().await.unwrap();
    let flow = FollowFlow::new(h.session.clone(), ApiClient::new(url));

    let err = flow.authorize().await.unwrap_err();
    assert!(matches!(&err, TraderError::Backend(m) if m == "Signature invalid"));
    assert_eq!(
        h.toasts.get(OP_FOLLOW).unwrap().description.as_deref(),
        Some("Signature invalid")
    );
}

#[tokio::test]
async fn unreadable_error_body_uses_generic_message() {
    let (url, _) = spawn_backend(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").await;
    let api = ApiClient::new(url);
    let payload = CommandPayload {
        command: Command::Withdraw,
        signature: "0x00".into(),
        address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
    };

    let err = api.post_command(&payload).await.unwrap_err();
    assert_eq!(err.to_string(), "Backend API request failed");
}

#[tokio::test]
async fn success_response_is_returned_parsed() {
    let (url, received) =
        spawn_backend(StatusCode::OK, r#"{"status":"queued","position":3}"#).await;
    let api = ApiClient::new(url);
    let address = parse_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
    let payload = CommandPayload {
        command: Command::Withdraw,
        signature: "0xdead".into(),
        address: address.to_checksum(None),
    };

    let response = api.post_command(&payload).await.unwrap();
    assert_eq!(response.status(), Some("queued"));
    assert_eq!(response.get("position"), Some(&json!(3)));
    assert_eq!(received.lock().unwrap()[0]["command"], "withdraw");
}

#[tokio::test]
async fn success_body_without_status_is_accepted() {
    let (url, _) = spawn_backend(StatusCode::OK, r#"{"status":true}"#).await;
    let h = Harness::local();
    h.session.connect().await.unwrap();
    let flow = FollowFlow::new(h.session.clone(), ApiClient::new(url));

    let response = flow.authorize().await.unwrap();
    assert_eq!(response.status(), None);
    assert_eq!(response.body, json!({ "status": true }));
    assert_eq!(h.toasts.get(OP_FOLLOW).unwrap().title, "Authorization Successful!");
}
