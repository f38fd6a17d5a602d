//! Client for the relayer backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TraderError;

const COMMAND_PATH: &str = "/api/command";
const GENERIC_FAILURE: &str = "Backend API request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Follow,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command: Command,
    pub signature: String,
    pub address: String,
}

/// The parsed body of a successful command, whatever its shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CommandResponse {
    pub body: Value,
}

impl CommandResponse {
    /// The `status` field when the backend sent one as a string.
    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}/api/command`. A non-2xx answer fails with the body's
    /// `message`, or a generic message when there is none.
    pub async fn post_command(&self, payload: &CommandPayload) -> Result<CommandResponse, TraderError> {
        let url = format!("{}{COMMAND_PATH}", self.base_url);
        debug!(url = %url, command = ?payload.command, "posting command");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TraderError::Backend(format!("{GENERIC_FAILURE}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            warn!(%status, message = %message, "backend rejected command");
            return Err(TraderError::Backend(message));
        }

        response
            .json::<CommandResponse>()
            .await
            .map_err(|e| TraderError::Backend(format!("malformed backend response: {e}")))
    }
}
