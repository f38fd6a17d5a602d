//! The wallet connection holder.
//!
//! One [`WalletSession`] is shared (via `Arc`) by every flow. It owns the
//! current [`Connection`], keeps the persisted "was connected" flag in step,
//! and reacts to wallet account/chain notifications.

use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use alloy_primitives::Address;
use chain_eth::address::{parse_address, short_address};
use chain_eth::chains::{parse_chain_id, EvmChain};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TraderError;
use crate::notify::{Notice, Notifier};
use crate::provider::{ProviderError, ProviderEvent, WalletProvider, INTERNAL_ERROR, UNAUTHORIZED, UNRECOGNIZED_CHAIN};
use crate::signer::{Signer, DEFAULT_RECEIPT_POLL};
use crate::store::SessionStore;

pub const OP_SWITCH_NETWORK: &str = "switch-network";

/// A live wallet connection. The signer always belongs to `address`.
#[derive(Debug, Clone)]
pub struct Connection {
    pub address: Address,
    pub signer: Signer,
    pub chain_id: u64,
    pub network_ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    WrongNetwork,
    Connected,
}

/// Requests the session makes of whoever owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The wallet changed chains; tear everything down and rebuild.
    Reload,
}

/// What [`WalletSession::handle_event`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Disconnected,
    Reconnected,
    ReloadRequested,
    Ignored,
}

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    target: EvmChain,
    receipt_poll: Duration,
    connection: RwLock<Option<Connection>>,
    signals: mpsc::UnboundedSender<SessionSignal>,
}

impl WalletSession {
    /// `provider` is `None` when no wallet is available at all.
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        target: EvmChain,
    ) -> (Self, mpsc::UnboundedReceiver<SessionSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let session = Self {
            provider,
            store,
            notifier,
            target,
            receipt_poll: DEFAULT_RECEIPT_POLL,
            connection: RwLock::new(None),
            signals,
        };
        (session, rx)
    }

    pub fn with_receipt_poll(mut self, interval: Duration) -> Self {
        self.receipt_poll = interval;
        self
    }

    pub fn target_chain(&self) -> &EvmChain {
        &self.target
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn connection(&self) -> Option<Connection> {
        self.connection.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.connection().map(|c| c.address)
    }

    pub fn signer(&self) -> Option<Signer> {
        self.connection().map(|c| c.signer)
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.connection().map(|c| c.chain_id)
    }

    pub fn is_correct_network(&self) -> bool {
        self.connection().is_some_and(|c| c.network_ok)
    }

    pub fn state(&self) -> ConnectionState {
        match self.connection() {
            None => ConnectionState::Disconnected,
            Some(c) if c.network_ok => ConnectionState::Connected,
            Some(_) => ConnectionState::WrongNetwork,
        }
    }

    /// User-initiated connect: request accounts, derive a signer, force the
    /// target chain, persist the flag.
    pub async fn connect(&self) -> Result<Address, TraderError> {
        let Some(provider) = self.provider.clone() else {
            self.notifier.notify(Notice::error(TraderError::MissingProvider.to_string()));
            return Err(TraderError::MissingProvider);
        };

        let opened = async {
            let accounts = provider.request("eth_requestAccounts", json!([])).await?;
            let address = first_account(&accounts)?;
            let chain_id = read_chain_id(provider.as_ref()).await?;
            Ok::<_, TraderError>((address, chain_id))
        }
        .await;

        let (address, chain_id) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "failed to connect wallet");
                let description = match &e {
                    TraderError::UserRejected => "The request was rejected by the user.".to_string(),
                    other => other.user_message(),
                };
                self.notifier
                    .notify(Notice::error("Failed to connect wallet").description(description));
                return Err(e);
            }
        };

        self.install(provider, address, chain_id);
        if let Err(e) = self.store.set_connected(true) {
            warn!(error = %e, "could not persist wallet flag");
        }
        info!(address = %address, chain_id, "wallet connected");
        self.notifier
            .notify(Notice::success("Wallet Connected!").description(short_address(&address)));

        if chain_id != self.target.chain_id {
            // A failed switch leaves the session in WrongNetwork.
            let _ = self.switch_network().await;
        }
        Ok(address)
    }

    /// Clears the session and the persisted flag.
    pub fn disconnect(&self) {
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.store.set_connected(false) {
            warn!(error = %e, "could not clear wallet flag");
        }
        info!("wallet disconnected");
        self.notifier.notify(Notice::info("Wallet Disconnected"));
    }

    /// Asks the wallet to switch to the target chain, registering the chain
    /// first if the wallet does not know it.
    pub async fn switch_network(&self) -> Result<(), TraderError> {
        let Some(provider) = self.provider.clone() else {
            self.notifier.notify(Notice::error(TraderError::MissingProvider.to_string()));
            return Err(TraderError::MissingProvider);
        };

        let switch_params = json!([{ "chainId": self.target.chain_id_hex() }]);
        let switched = match provider.request("wallet_switchEthereumChain", switch_params).await {
            Ok(_) => Ok(()),
            Err(e) if e.code == UNRECOGNIZED_CHAIN => {
                info!(chain_id = self.target.chain_id, "target chain unknown to wallet; adding it");
                provider
                    .request("wallet_addEthereumChain", json!([self.target.add_chain_params()]))
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        };

        match switched {
            Ok(()) => {
                self.mark_network(self.target.chain_id);
                self.notifier.notify(
                    Notice::success(format!("Switched to {}", self.target.name)).id(OP_SWITCH_NETWORK),
                );
                Ok(())
            }
            Err(e) => {
                let e = TraderError::from(e);
                warn!(error = %e, "network switch failed");
                self.notifier.notify(
                    Notice::error("Failed to switch network")
                        .id(OP_SWITCH_NETWORK)
                        .description(e.user_message()),
                );
                Err(e)
            }
        }
    }

    /// Silent reconnect at startup, gated on the persisted flag. Never
    /// prompts and never forces a chain switch.
    pub async fn auto_connect(&self) -> Option<Address> {
        let provider = self.provider.clone()?;
        if !self.store.was_connected() {
            return None;
        }

        let restored = async {
            let accounts = provider.request("eth_accounts", json!([])).await?;
            if accounts.as_array().is_none_or(Vec::is_empty) {
                return Ok::<_, TraderError>(None);
            }
            let address = first_account(&accounts)?;
            let chain_id = read_chain_id(provider.as_ref()).await?;
            Ok(Some((address, chain_id)))
        }
        .await;

        match restored {
            Ok(Some((address, chain_id))) => {
                self.install(provider, address, chain_id);
                info!(address = %address, chain_id, "auto-connected to wallet");
                Some(address)
            }
            Ok(None) => {
                debug!("wallet has no authorized accounts; clearing flag");
                self.clear_flag();
                None
            }
            Err(e) => {
                warn!(error = %e, "auto-connect failed");
                self.clear_flag();
                None
            }
        }
    }

    /// Reacts to one wallet notification.
    pub async fn handle_event(&self, event: ProviderEvent) -> EventOutcome {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    self.disconnect();
                    EventOutcome::Disconnected
                }
                Some(first) if Some(*first) != self.address() => {
                    info!(address = %first, "wallet account changed");
                    match self.connect().await {
                        Ok(_) => EventOutcome::Reconnected,
                        Err(_) => EventOutcome::Ignored,
                    }
                }
                Some(_) => EventOutcome::Ignored,
            },
            ProviderEvent::ChainChanged(chain_id) => {
                info!(chain_id, "wallet chain changed; requesting reload");
                // The receiver may already be gone during shutdown.
                let _ = self.signals.send(SessionSignal::Reload);
                EventOutcome::ReloadRequested
            }
        }
    }

    /// Subscribes to wallet notifications until the returned guard drops.
    pub fn watch(self: &Arc<Self>) -> Option<SessionWatcher> {
        let rx = self.provider.as_ref()?.subscribe();
        let session = Arc::downgrade(self);
        Some(SessionWatcher { task: tokio::spawn(watch_events(session, rx)) })
    }

    fn install(&self, provider: Arc<dyn WalletProvider>, address: Address, chain_id: u64) {
        let signer = Signer::new(provider, address).with_receipt_poll(self.receipt_poll);
        let connection = Connection {
            address,
            signer,
            chain_id,
            network_ok: chain_id == self.target.chain_id,
        };
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    fn mark_network(&self, chain_id: u64) {
        let mut guard = self.connection.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = guard.as_mut() {
            connection.chain_id = chain_id;
            connection.network_ok = chain_id == self.target.chain_id;
        }
    }

    fn clear_flag(&self) {
        if let Err(e) = self.store.set_connected(false) {
            warn!(error = %e, "could not clear wallet flag");
        }
    }
}

/// Owns the event subscription task; dropping it unsubscribes.
pub struct SessionWatcher {
    task: JoinHandle<()>,
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_events(session: Weak<WalletSession>, mut rx: broadcast::Receiver<ProviderEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(session) = session.upgrade() else { break };
                session.handle_event(event).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "dropped wallet notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("wallet event watcher stopped");
}

fn first_account(accounts: &Value) -> Result<Address, TraderError> {
    let raw = accounts
        .as_array()
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::new(UNAUTHORIZED, "wallet returned no accounts"))?;
    Ok(parse_address(raw)?)
}

async fn read_chain_id(provider: &dyn WalletProvider) -> Result<u64, TraderError> {
    let raw = provider.request("eth_chainId", json!([])).await?;
    let raw = raw
        .as_str()
        .ok_or_else(|| ProviderError::new(INTERNAL_ERROR, format!("unexpected eth_chainId result: {raw}")))?;
    Ok(parse_chain_id(raw)?)
}
