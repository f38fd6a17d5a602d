//! Wires config into a ready-to-use session and its flows.

use std::sync::Arc;

use chain_eth::transaction::signing_key_from_hex;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::TraderConfig;
use crate::deposit::DepositFlow;
use crate::error::TraderError;
use crate::follow::FollowFlow;
use crate::key_wallet::KeyWallet;
use crate::notify::Notifier;
use crate::provider::WalletProvider;
use crate::session::{SessionSignal, WalletSession};
use crate::store::FileStore;

pub struct TraderApp {
    pub session: Arc<WalletSession>,
    pub deposit: DepositFlow,
    pub follow: FollowFlow,
}

impl TraderApp {
    /// Builds everything from `config`. With no private key configured the
    /// session has no wallet and every action reports that.
    pub async fn build(
        config: &TraderConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionSignal>), TraderError> {
        let http = config.http_client()?;
        let target = config.target_chain()?;

        let provider: Option<Arc<dyn WalletProvider>> = match &config.private_key {
            Some(secret) => {
                let key = signing_key_from_hex(secret.expose_secret())?;
                let wallet = match KeyWallet::connect(key.clone(), &config.rpc_url, http.clone()).await {
                    Ok(wallet) => wallet,
                    Err(e) => {
                        warn!(error = %e, rpc_url = %config.rpc_url, "node unreachable; assuming target chain");
                        KeyWallet::new(key, config.chain_id, &config.rpc_url, http.clone())
                    }
                };
                Some(Arc::new(wallet) as Arc<dyn WalletProvider>)
            }
            None => None,
        };

        let store = Arc::new(FileStore::new(&config.state_dir));
        let (session, signals) = WalletSession::new(provider, store, notifier, target);
        let session = Arc::new(session.with_receipt_poll(config.receipt_poll));

        let deposit = DepositFlow::new(Arc::clone(&session), config.usdc_address, config.settlement_address);
        let api = ApiClient::with_client(http, config.backend_api_url.clone());
        let follow = FollowFlow::new(Arc::clone(&session), api);

        info!(
            chain_id = config.chain_id,
            usdc = %config.usdc_address,
            settlement = %config.settlement_address,
            "trader client ready"
        );
        Ok((Self { session, deposit, follow }, signals))
    }
}
