//! cVND settlement CLI
//!
//! Registers users, links bank accounts and drives deposits, transfers and
//! burns against the configured ledger and bank.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

// Use the library crate
use cvnd_settlement::cli::commands;
use cvnd_settlement::config::Config;

/// cVND settlement orchestrator
#[derive(Parser)]
#[command(name = "cvnd-settle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "settlement.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, env = "CVND_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user and create a PENDING wallet
    Register {
        /// Existing user id (default: generate one)
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Verify a bank account and activate the user's wallet
    LinkBank {
        user_id: String,

        /// Bank account reference
        account: String,
    },

    /// Activate a user's wallet
    Activate { user_id: String },

    /// Settle with the bank and mint cVND
    Deposit {
        /// Wallet address
        address: String,

        /// Amount, up to 6 decimal places
        amount: String,
    },

    /// Transfer cVND between wallets
    Transfer {
        from: String,
        to: String,
        amount: String,
    },

    /// Burn cVND
    Burn {
        address: String,
        amount: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show a wallet (or list all wallets)
    Wallet { address: Option<String> },

    /// Query the ledger balance of a wallet
    Balance { address: String },

    /// List transaction records
    Records {
        /// Filter by status (SUCCESS, PENDING_LEDGER, FAILED)
        #[arg(long)]
        status: Option<String>,

        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration (endpoints masked)
    Config,

    /// Check ledger, bank and store health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive("cvnd_settlement=info".parse()?);
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using data directory {}", config.store.data_dir);

    // Execute command
    let result = match cli.command {
        Commands::Register { user_id } => commands::register(&config, user_id).await,
        Commands::LinkBank { user_id, account } => commands::link_bank(&config, &user_id, &account).await,
        Commands::Activate { user_id } => commands::activate(&config, &user_id).await,
        Commands::Deposit { address, amount } => commands::deposit(&config, &address, &amount).await,
        Commands::Transfer { from, to, amount } => commands::transfer(&config, &from, &to, &amount).await,
        Commands::Burn { address, amount, force } => commands::burn(&config, &address, &amount, force).await,
        Commands::Wallet { address } => commands::wallet(&config, address).await,
        Commands::Balance { address } => commands::balance(&config, &address).await,
        Commands::Records { status, limit } => commands::records(&config, status, limit).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
