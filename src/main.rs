//! Marketplace reconciler CLI.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketplace_reconciler::config::AppConfig;
use marketplace_reconciler::marketplaces::types::{DateRange, MarketplaceKind};
use marketplace_reconciler::marketplaces::SellerAccountCredential;
use marketplace_reconciler::scheduler::DailyRunScheduler;
use marketplace_reconciler::services::orchestrator;
use marketplace_reconciler::state::AppState;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "reconciler")]
#[command(about = "Marketplace price reconciliation and sales aggregation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, env = "RECONCILER_CONFIG")]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check prices and submit corrections
    Reconcile {
        #[command(flatten)]
        target: AccountFilter,

        /// Build and log batches without submitting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Aggregate the financial feed into daily sales
    Aggregate {
        #[command(flatten)]
        target: AccountFilter,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,

        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
    },

    /// List products priced below minimum or recommended price
    Alerts {
        #[command(flatten)]
        target: AccountFilter,
    },

    /// Run all accounts daily at the configured Moscow time
    Watch,
}

#[derive(clap::Args)]
struct AccountFilter {
    /// Only this account
    #[arg(long)]
    account: Option<String>,

    /// Only this marketplace (wildberries, wb, ozon)
    #[arg(long)]
    marketplace: Option<MarketplaceKind>,
}

impl AccountFilter {
    fn select(&self, state: &AppState) -> anyhow::Result<Vec<SellerAccountCredential>> {
        let accounts: Vec<_> = state
            .credentials
            .active_accounts()?
            .into_iter()
            .filter(|c| self.marketplace.map_or(true, |m| c.marketplace == m))
            .filter(|c| self.account.as_deref().map_or(true, |a| c.account_name == a))
            .collect();

        if accounts.is_empty() {
            bail!("No active seller account matches the selection");
        }
        Ok(accounts)
    }
}

#[derive(Serialize)]
struct AccountOutput<T: Serialize> {
    marketplace: MarketplaceKind,
    account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> AccountOutput<T> {
    fn new(credential: &SellerAccountCredential, result: marketplace_reconciler::error::Result<T>) -> Self {
        let (data, error) = match result {
            Ok(data) => (Some(data), None),
            Err(e) => {
                tracing::error!(account = %credential.account_name, error = %e, "Account failed");
                (None, Some(e.to_string()))
            }
        };
        Self {
            marketplace: credential.marketplace,
            account_name: credential.account_name.clone(),
            data,
            error,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Commands::Reconcile { dry_run: true, .. } = cli.command {
        config.reconciliation.dry_run = true;
    }

    marketplace_reconciler::init_tracing(cli.json_logs, config.log.as_deref());
    tracing::info!("Starting marketplace reconciler");

    let state = Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    match cli.command {
        Commands::Reconcile { target, .. } => {
            let mut reports = Vec::new();
            for credential in target.select(&state)? {
                let result =
                    orchestrator::run_reconciliation(&state, credential.marketplace, &credential.account_name).await;
                reports.push(AccountOutput::new(&credential, result));
            }
            print_json(&reports)?;
        }
        Commands::Aggregate { target, from, to } => {
            let range = DateRange::new(from, to)?;
            let mut outputs = Vec::new();
            for credential in target.select(&state)? {
                let result = orchestrator::run_aggregation(
                    &state,
                    credential.marketplace,
                    &credential.account_name,
                    range,
                )
                .await;
                outputs.push(AccountOutput::new(&credential, result));
            }
            print_json(&outputs)?;
        }
        Commands::Alerts { target } => {
            let mut outputs = Vec::new();
            for credential in target.select(&state)? {
                let result = orchestrator::get_low_price_alerts(
                    &state,
                    credential.marketplace,
                    &credential.account_name,
                )
                .await;
                outputs.push(AccountOutput::new(&credential, result));
            }
            print_json(&outputs)?;
        }
        Commands::Watch => {
            let cancel = CancellationToken::new();
            let scheduler = tokio::spawn(DailyRunScheduler::new(state.clone()).run(cancel.clone()));

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested");
            cancel.cancel();
            scheduler.await.context("Scheduler task panicked")?;
        }
    }

    Ok(())
}
