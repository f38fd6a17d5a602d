//! JSON-RPC 2.0 over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::U256;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{ProviderError, DISCONNECTED, INTERNAL_ERROR, INVALID_PARAMS, LIMIT_EXCEEDED};

/// A JSON-RPC endpoint on one chain.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into(), next_id: AtomicU64::new(1) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request. JSON-RPC errors keep their code, message and data;
    /// HTTP 429 becomes a [`LIMIT_EXCEEDED`] error.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, url = %self.url, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(DISCONNECTED, format!("rpc transport error: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::new(LIMIT_EXCEEDED, "Too Many Requests"));
        }
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(DISCONNECTED, format!("rpc transport error: {e}")))?;
        if !status.is_success() {
            return Err(ProviderError::new(INTERNAL_ERROR, format!("rpc http {status}: {text}")));
        }

        let envelope: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(INTERNAL_ERROR, format!("malformed rpc response: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(ProviderError { code: err.code, message: err.message, data: err.data });
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

/// Reads a `0x`-prefixed hex quantity.
pub fn quantity(value: &Value) -> Result<U256, ProviderError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::new(INVALID_PARAMS, format!("expected hex quantity, got {value}")))?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::new(INVALID_PARAMS, format!("quantity must start with 0x: {raw}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::new(INVALID_PARAMS, format!("invalid quantity {raw}: {e}")))
}

pub fn quantity_u64(value: &Value) -> Result<u64, ProviderError> {
    let q = quantity(value)?;
    u64::try_from(q).map_err(|_| ProviderError::new(INVALID_PARAMS, format!("quantity too large: {q}")))
}

pub fn quantity_u128(value: &Value) -> Result<u128, ProviderError> {
    let q = quantity(value)?;
    u128::try_from(q).map_err(|_| ProviderError::new(INVALID_PARAMS, format!("quantity too large: {q}")))
}

/// Reads `0x`-prefixed hex data.
pub fn hex_data(value: &Value) -> Result<Vec<u8>, ProviderError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::new(INVALID_PARAMS, format!("expected hex data, got {value}")))?;
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| ProviderError::new(INVALID_PARAMS, format!("invalid hex data: {e}")))
}

/// Renders bytes as `0x`-prefixed hex.
pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
