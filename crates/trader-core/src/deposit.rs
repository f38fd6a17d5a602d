//! USDC deposit into the settlement contract.
//!
//! The flow caches the wallet balance, the allowance granted to the
//! settlement contract, and the amount already deposited. Entered amounts are
//! validated against that snapshot before any transaction is submitted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use chain_eth::units::{format_units, parse_units, USDC_DECIMALS};
use tracing::{debug, info, warn};

use crate::contracts::{Erc20Token, SettlementContract};
use crate::error::TraderError;
use crate::notify::Notice;
use crate::session::WalletSession;
use crate::signer::{Signer, TransactionReceipt};

pub const OP_LOAD_BALANCES: &str = "load-balances";
pub const OP_APPROVE: &str = "approve";
pub const OP_DEPOSIT: &str = "deposit";

/// Retry budget for balance reads that hit a provider rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, delay: Duration::from_secs(2) }
    }
}

/// On-chain snapshot in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balances {
    pub wallet: U256,
    pub allowance: U256,
    pub deposited: U256,
}

impl Balances {
    pub fn wallet_display(&self) -> String {
        format_units(self.wallet, USDC_DECIMALS)
    }

    pub fn allowance_display(&self) -> String {
        format_units(self.allowance, USDC_DECIMALS)
    }

    pub fn deposited_display(&self) -> String {
        format_units(self.deposited, USDC_DECIMALS)
    }
}

/// What a deposit form would render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepositForm {
    pub amount: String,
    pub balances: Option<Balances>,
    pub loading: bool,
    pub approving: bool,
    pub depositing: bool,
}

/// Receipts of the single-button deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOutcome {
    pub approval: Option<TransactionReceipt>,
    pub deposit: TransactionReceipt,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Load,
    Approve,
    Deposit,
}

impl Op {
    fn id(self) -> &'static str {
        match self {
            Op::Load => OP_LOAD_BALANCES,
            Op::Approve => OP_APPROVE,
            Op::Deposit => OP_DEPOSIT,
        }
    }

    fn flag(self, form: &mut DepositForm) -> &mut bool {
        match self {
            Op::Load => &mut form.loading,
            Op::Approve => &mut form.approving,
            Op::Deposit => &mut form.depositing,
        }
    }
}

pub struct DepositFlow {
    session: Arc<WalletSession>,
    token: Address,
    settlement: Address,
    retry: RetryPolicy,
    form: Mutex<DepositForm>,
}

/// A failed single-button deposit, with the notice it should raise.
struct Failure {
    error: TraderError,
    title: &'static str,
    hint: Option<&'static str>,
}

impl Failure {
    fn read(title: &'static str, hint: &'static str) -> impl FnOnce(TraderError) -> Self {
        move |error| Self { error, title, hint: Some(hint) }
    }
}

impl From<TraderError> for Failure {
    fn from(error: TraderError) -> Self {
        Self { error, title: "Deposit Failed", hint: None }
    }
}

/// Clears an in-flight flag when the operation ends, however it ends.
struct InFlight<'a> {
    flow: &'a DepositFlow,
    op: Op,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.op.flag(&mut self.flow.lock()) = false;
    }
}

impl DepositFlow {
    pub fn new(session: Arc<WalletSession>, token: Address, settlement: Address) -> Self {
        Self {
            session,
            token,
            settlement,
            retry: RetryPolicy::default(),
            form: Mutex::new(DepositForm::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_amount(&self, amount: impl Into<String>) {
        self.lock().amount = amount.into();
    }

    pub fn form(&self) -> DepositForm {
        self.lock().clone()
    }

    pub fn balances(&self) -> Option<Balances> {
        self.lock().balances
    }

    /// Reads balance, allowance and deposit, retrying on rate limits.
    pub async fn load_balances(&self) -> Result<Balances, TraderError> {
        let _guard = self.begin(Op::Load)?;
        self.notify(Notice::loading("Loading balances...").id(OP_LOAD_BALANCES));
        let result = self.refresh(Some(Op::Load)).await;
        match &result {
            Ok(balances) => {
                debug!(
                    wallet = %balances.wallet_display(),
                    allowance = %balances.allowance_display(),
                    deposited = %balances.deposited_display(),
                    "balances loaded"
                );
                self.notify(
                    Notice::success("Balances updated")
                        .id(OP_LOAD_BALANCES)
                        .description(format!("{} USDC available", balances.wallet_display())),
                );
            }
            Err(e) => self.report(Op::Load, "Failed to load balances", None, e),
        }
        result
    }

    /// Approves the settlement contract for the entered amount.
    pub async fn approve(&self) -> Result<TransactionReceipt, TraderError> {
        let _guard = self.begin(Op::Approve)?;
        let result = self.run_approve().await;
        if let Err(e) = &result {
            self.report(Op::Approve, "Approval Failed", None, e);
        }
        result
    }

    /// Deposits the entered amount. Requires a sufficient allowance.
    pub async fn deposit(&self) -> Result<TransactionReceipt, TraderError> {
        let _guard = self.begin(Op::Deposit)?;
        let result = self.run_deposit().await;
        if let Err(e) = &result {
            self.report(Op::Deposit, "Deposit Failed", None, e);
        }
        result
    }

    /// Checks balance and allowance on-chain, approves only when the
    /// allowance is short, then deposits.
    pub async fn deposit_with_approval(&self) -> Result<DepositOutcome, TraderError> {
        let _deposit = self.begin(Op::Deposit)?;
        let _approve = self.begin(Op::Approve)?;
        self.run_deposit_with_approval().await.map_err(|failure| {
            self.report(Op::Deposit, failure.title, failure.hint, &failure.error);
            failure.error
        })
    }

    async fn run_approve(&self) -> Result<TransactionReceipt, TraderError> {
        let (signer, user) = self.connected()?;
        let amount = self.validated_amount(false).await?;

        let token = Erc20Token::new(self.token, signer);
        self.notify(Notice::info("Please approve USDC spending in your wallet.").id(OP_APPROVE));
        let pending = token.approve(self.settlement, amount).await?;
        self.notify(Notice::loading("Waiting for approval confirmation...").id(OP_APPROVE));
        let receipt = pending.wait().await?;

        let shown = format_units(amount, USDC_DECIMALS);
        info!(user = %user, amount = %shown, tx = %receipt.transaction_hash, "allowance approved");
        self.notify(
            Notice::success("Approval Successful!")
                .id(OP_APPROVE)
                .description(format!("Approved {shown} USDC for deposit.")),
        );
        self.reload_quietly().await;
        Ok(receipt)
    }

    async fn run_deposit(&self) -> Result<TransactionReceipt, TraderError> {
        let (signer, user) = self.connected()?;
        let amount = self.validated_amount(true).await?;
        let entered = self.lock().amount.trim().to_string();

        let settlement = SettlementContract::new(self.settlement, signer);
        let receipt = self.submit_deposit(&settlement, amount).await?;

        info!(user = %user, amount = %entered, tx = %receipt.transaction_hash, "deposit confirmed");
        self.finish_deposit(&entered).await;
        Ok(receipt)
    }

    async fn run_deposit_with_approval(&self) -> Result<DepositOutcome, Failure> {
        let (signer, user) = self.connected()?;
        let entered = self.lock().amount.trim().to_string();
        let amount = parse_amount(&entered)?;

        let token = Erc20Token::new(self.token, signer.clone());
        let settlement = SettlementContract::new(self.settlement, signer);
        self.notify(Notice::loading("Preparing USDC deposit...").id(OP_DEPOSIT));

        self.notify(Notice::info("Checking USDC balance...").id(OP_DEPOSIT));
        let balance = token.balance_of(user).await.map_err(Failure::read(
            "Failed to check USDC balance",
            "Make sure the USDC contract address is correct",
        ))?;
        if balance < amount {
            return Err(TraderError::InsufficientBalance {
                balance: format_units(balance, USDC_DECIMALS),
            }
            .into());
        }

        self.notify(Notice::info("Checking USDC allowance...").id(OP_DEPOSIT));
        let allowance = token.allowance(user, self.settlement).await.map_err(Failure::read(
            "Failed to check allowance",
            "The USDC contract may not be deployed correctly",
        ))?;
        let approval = if allowance < amount {
            self.notify(Notice::info("Please approve USDC spending in your wallet.").id(OP_DEPOSIT));
            let pending = token.approve(self.settlement, amount).await?;
            self.notify(Notice::loading("Waiting for approval confirmation...").id(OP_DEPOSIT));
            let receipt = pending.wait().await?;
            self.notify(
                Notice::success("Approval successful! Now confirming deposit...").id(OP_DEPOSIT),
            );
            Some(receipt)
        } else {
            debug!(allowance = %format_units(allowance, USDC_DECIMALS), "allowance already sufficient");
            None
        };

        let deposit = self.submit_deposit(&settlement, amount).await?;
        info!(user = %user, amount = %entered, tx = %deposit.transaction_hash, "deposit confirmed");
        self.finish_deposit(&entered).await;
        Ok(DepositOutcome { approval, deposit })
    }

    async fn submit_deposit(
        &self,
        settlement: &SettlementContract,
        amount: U256,
    ) -> Result<TransactionReceipt, TraderError> {
        self.notify(Notice::loading("Sending deposit transaction...").id(OP_DEPOSIT));
        let pending = settlement.deposit(amount).await?;
        self.notify(Notice::loading("Waiting for deposit confirmation...").id(OP_DEPOSIT));
        pending.wait().await
    }

    async fn finish_deposit(&self, entered: &str) {
        self.notify(
            Notice::success("Deposit Successful!")
                .id(OP_DEPOSIT)
                .description(format!("Successfully deposited {entered} USDC.")),
        );
        self.lock().amount.clear();
        self.reload_quietly().await;
    }

    /// Parses the entered amount and checks it against the cached snapshot,
    /// loading the snapshot first if there is none.
    async fn validated_amount(&self, require_allowance: bool) -> Result<U256, TraderError> {
        let entered = self.lock().amount.clone();
        let amount = parse_amount(&entered)?;

        let balances = match self.balances() {
            Some(balances) => balances,
            None => self.refresh(None).await?,
        };
        if amount > balances.wallet {
            return Err(TraderError::InsufficientBalance { balance: balances.wallet_display() });
        }
        if require_allowance && amount > balances.allowance {
            return Err(TraderError::InsufficientAllowance {
                allowance: balances.allowance_display(),
            });
        }
        Ok(amount)
    }

    /// Reads the snapshot, retrying on rate limits. Retries are shown under
    /// `progress` when given.
    async fn refresh(&self, progress: Option<Op>) -> Result<Balances, TraderError> {
        let (signer, user) = self.connected()?;
        let mut retries = 0;
        let balances = loop {
            match self.read_balances(&signer, user).await {
                Ok(balances) => break balances,
                Err(e) if e.is_rate_limit() && retries < self.retry.max_retries => {
                    retries += 1;
                    warn!(retries, error = %e, "rate limited while loading balances; retrying");
                    if let Some(op) = progress {
                        self.notify(
                            Notice::loading(format!(
                                "Rate limited, retrying ({retries}/{})...",
                                self.retry.max_retries
                            ))
                            .id(op.id()),
                        );
                    }
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        };
        self.lock().balances = Some(balances);
        Ok(balances)
    }

    async fn reload_quietly(&self) {
        if let Err(e) = self.refresh(None).await {
            warn!(error = %e, "could not reload balances");
        }
    }

    async fn read_balances(&self, signer: &Signer, user: Address) -> Result<Balances, TraderError> {
        let token = Erc20Token::new(self.token, signer.clone());
        let settlement = SettlementContract::new(self.settlement, signer.clone());
        Ok(Balances {
            wallet: token.balance_of(user).await?,
            allowance: token.allowance(user, self.settlement).await?,
            deposited: settlement.get_deposit(user).await?,
        })
    }

    fn connected(&self) -> Result<(Signer, Address), TraderError> {
        let connection = self.session.connection().ok_or(TraderError::NotConnected)?;
        Ok((connection.signer, connection.address))
    }

    fn begin(&self, op: Op) -> Result<InFlight<'_>, TraderError> {
        let mut form = self.lock();
        let flag = op.flag(&mut form);
        if *flag {
            return Err(TraderError::Busy(op.id()));
        }
        *flag = true;
        Ok(InFlight { flow: self, op })
    }

    fn report(&self, op: Op, failed: &str, hint: Option<&str>, err: &TraderError) {
        warn!(op = op.id(), error = %err, "{failed}");
        let notice = match err {
            TraderError::InvalidAmount(_) => Notice::error("Please enter a valid amount."),
            TraderError::NotConnected => Notice::error(err.to_string()),
            TraderError::InsufficientBalance { balance } => Notice::error("Insufficient USDC balance")
                .description(format!("You only have {balance} USDC")),
            TraderError::InsufficientAllowance { allowance } => Notice::error("Insufficient allowance")
                .description(format!("Only {allowance} USDC is approved. Approve the amount first.")),
            other => Notice::error(failed)
                .description(hint.map_or_else(|| other.user_message(), str::to_string)),
        };
        self.notify(notice.id(op.id()));
    }

    fn notify(&self, notice: Notice) {
        self.session.notifier().notify(notice);
    }

    fn lock(&self) -> MutexGuard<'_, DepositForm> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A positive USDC amount in base units.
pub fn parse_amount(input: &str) -> Result<U256, TraderError> {
    let amount = parse_units(input, USDC_DECIMALS).map_err(|e| TraderError::InvalidAmount(e.to_string()))?;
    if amount.is_zero() {
        return Err(TraderError::InvalidAmount("amount must be greater than zero".into()));
    }
    Ok(amount)
}
