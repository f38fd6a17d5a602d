//! Gasless copy-trading authorization.

use std::sync::Arc;

use chain_eth::address::checksum;
use tracing::{info, warn};

use crate::api::{ApiClient, Command, CommandPayload, CommandResponse};
use crate::error::TraderError;
use crate::notify::Notice;
use crate::session::WalletSession;

pub const OP_FOLLOW: &str = "follow";

/// The exact text the user signs to authorize the relayer.
pub const AUTHORIZATION_MESSAGE: &str =
    "I authorize Arc-Yellow Trader to execute copy trades on my behalf.";

pub struct FollowFlow {
    session: Arc<WalletSession>,
    api: ApiClient,
}

impl FollowFlow {
    pub fn new(session: Arc<WalletSession>, api: ApiClient) -> Self {
        Self { session, api }
    }

    /// Signs [`AUTHORIZATION_MESSAGE`] and hands the signature to the backend.
    pub async fn authorize(&self) -> Result<CommandResponse, TraderError> {
        let notifier = self.session.notifier();
        let Some(connection) = self.session.connection() else {
            notifier.notify(Notice::error(TraderError::NotConnected.to_string()));
            return Err(TraderError::NotConnected);
        };

        notifier.notify(Notice::loading("Waiting for signature...").id(OP_FOLLOW));
        let result = async {
            let signature = connection.signer.sign_message(AUTHORIZATION_MESSAGE).await?;
            notifier.notify(Notice::loading("Sending authorization to backend...").id(OP_FOLLOW));
            let payload = CommandPayload {
                command: Command::Follow,
                signature,
                address: checksum(&connection.address),
            };
            self.api.post_command(&payload).await
        }
        .await;

        match result {
            Ok(response) => {
                info!(
                    address = %connection.address,
                    status = response.status().unwrap_or("-"),
                    "relayer authorized"
                );
                notifier.notify(
                    Notice::success("Authorization Successful!")
                        .id(OP_FOLLOW)
                        .description("The relayer is now authorized to copy trades for you."),
                );
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "authorization failed");
                let description = match &e {
                    TraderError::UserRejected => "User rejected the signature request.".to_string(),
                    other => other.user_message(),
                };
                notifier.notify(
                    Notice::error("Authorization Failed").id(OP_FOLLOW).description(description),
                );
                Err(e)
            }
        }
    }
}
