use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chain_eth::address::checksum;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trader_core::config::TraderConfig;
use trader_core::notify::{Notice, NoticeKind, Notifier, TracingNotifier};
use trader_core::{connect_button_label, SessionSignal, TraderApp, TraderError};

#[derive(Parser, Debug)]
#[command(name = "trader", about = "Arc-Yellow Trader client: deposit USDC and authorize copy trading")]
struct Cli {
    #[arg(long, env = "TRADER_BACKEND_API_URL")]
    backend_api_url: Option<String>,

    #[arg(long, env = "TRADER_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "TRADER_CHAIN_ID")]
    chain_id: Option<u64>,

    #[arg(long, env = "TRADER_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[arg(long, env = "TRADER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the connection and cached balances.
    Status,
    /// Connect the wallet and remember it.
    Connect,
    /// Forget the wallet.
    Disconnect,
    /// Move the wallet onto the configured chain.
    SwitchNetwork,
    /// Read USDC balance, allowance and deposit.
    Balances,
    /// Approve the settlement contract to spend USDC.
    Approve { amount: String },
    /// Deposit USDC into the settlement contract.
    Deposit {
        amount: String,
        /// Approve first when the allowance is short.
        #[arg(long)]
        auto_approve: bool,
    },
    /// Sign the copy-trading authorization and send it to the backend.
    Follow,
    /// Follow wallet events until interrupted.
    Watch,
}

impl Cli {
    /// Flags win over the environment; anything unset falls through to it.
    fn config(&self) -> Result<TraderConfig, TraderError> {
        TraderConfig::from_lookup(|key| match key {
            "TRADER_BACKEND_API_URL" => self.backend_api_url.clone(),
            "TRADER_RPC_URL" => self.rpc_url.clone(),
            "TRADER_CHAIN_ID" => self.chain_id.map(|id| id.to_string()),
            "TRADER_PRIVATE_KEY" => self.private_key.clone(),
            "TRADER_STATE_DIR" => self.state_dir.as_ref().map(|dir| dir.display().to_string()),
            other => std::env::var(other).ok(),
        })
    }
}

/// Prints notices as terminal lines.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        let marker = match notice.kind {
            NoticeKind::Loading => "..",
            NoticeKind::Info => "--",
            NoticeKind::Success => "ok",
            NoticeKind::Error => "!!",
        };
        match notice.description {
            Some(description) => eprintln!("[{marker}] {}: {description}", notice.title),
            None => eprintln!("[{marker}] {}", notice.title),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), TraderError> {
    let config = cli.config()?;
    if matches!(cli.command, Command::Watch) {
        return watch(&config).await;
    }

    let (app, _signals) = TraderApp::build(&config, Arc::new(TerminalNotifier)).await?;
    if !matches!(cli.command, Command::Connect) {
        app.session.auto_connect().await;
    }

    match cli.command {
        Command::Status => {
            println!("{}", connect_button_label(app.session.address().as_ref()));
            println!("state: {:?}", app.session.state());
            if let Some(chain_id) = app.session.chain_id() {
                println!("chain: {chain_id} (target {})", app.session.target_chain().chain_id);
            }
        }
        Command::Connect => {
            let address = app.session.connect().await?;
            println!("{}", checksum(&address));
        }
        Command::Disconnect => app.session.disconnect(),
        Command::SwitchNetwork => app.session.switch_network().await?,
        Command::Balances => {
            let balances = app.deposit.load_balances().await?;
            println!("wallet:    {} USDC", balances.wallet_display());
            println!("approved:  {} USDC", balances.allowance_display());
            println!("deposited: {} USDC", balances.deposited_display());
        }
        Command::Approve { amount } => {
            app.deposit.set_amount(amount);
            let receipt = app.deposit.approve().await?;
            println!("{}", receipt.transaction_hash);
        }
        Command::Deposit { amount, auto_approve } => {
            app.deposit.set_amount(amount);
            let receipt = if auto_approve {
                app.deposit.deposit_with_approval().await?.deposit
            } else {
                app.deposit.deposit().await?
            };
            println!("{}", receipt.transaction_hash);
        }
        Command::Follow => {
            let response = app.follow.authorize().await?;
            println!("{}", response.status().map_or_else(|| response.body.to_string(), str::to_string));
        }
        Command::Watch => {}
    }
    Ok(())
}

/// Rebuilds the whole client whenever the wallet changes chains. Notices go
/// to the log since this runs unattended.
async fn watch(config: &TraderConfig) -> Result<(), TraderError> {
    loop {
        let (app, mut signals) = TraderApp::build(config, Arc::new(TracingNotifier)).await?;
        app.session.auto_connect().await;
        let _watcher = app.session.watch();
        println!("{}", connect_button_label(app.session.address().as_ref()));

        tokio::select! {
            signal = signals.recv() => match signal {
                Some(SessionSignal::Reload) => info!("reloading after chain change"),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
