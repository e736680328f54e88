//! Reconciliation Orchestrator
//!
//! Runs the price check, aggregation and dispatch steps per seller account.
//! Accounts are processed one after another. Both feeds are read before any
//! batch is submitted. A failing account is reported and skipped; only a run
//! with no accounts at all fails as a whole.

use crate::db::DailySalesAggregate;
use crate::error::{AppError, Result};
use crate::marketplaces::types::{DateRange, MarketplaceKind, PriceFetch};
use crate::marketplaces::{Capability, Marketplace, SellerAccountCredential};
use crate::notify::PriceAlert;
use crate::services::aggregation_service::AggregationService;
use crate::services::dispatch_service::DispatchService;
use crate::services::reconciliation_service::{
    CheckOutcome, PriceCheckResult, PriceStatus, ReconciliationService,
};
use crate::state::AppState;
use chrono::{NaiveDate, Utc};
use chrono_tz::Europe::Moscow;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Upper bound on a single alert delivery
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one account run
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub checked: usize,
    pub needing_update: usize,
    pub updated: usize,
    pub results: Vec<PriceCheckResult>,
    pub errors: Vec<String>,
    pub task_id: Option<String>,
    pub dry_run: bool,
    /// Days written by the aggregation step, when it ran
    pub aggregated_days: Option<usize>,
}

impl ReconciliationReport {
    fn new(marketplace: MarketplaceKind, account_name: &str, dry_run: bool) -> Self {
        Self {
            marketplace,
            account_name: account_name.to_string(),
            checked: 0,
            needing_update: 0,
            updated: 0,
            results: Vec::new(),
            errors: Vec::new(),
            task_id: None,
            dry_run,
            aggregated_days: None,
        }
    }

    fn record_check(&mut self, outcome: CheckOutcome) {
        self.errors.extend(outcome.errors);
        self.checked = outcome.results.len();
        self.needing_update = outcome.results.iter().filter(|r| r.needs_update).count();
        self.results = outcome.results;
    }

    fn account_error(&mut self, error: &AppError) {
        self.errors.push(format!(
            "{}/{}: {}",
            self.marketplace, self.account_name, error
        ));
    }
}

/// Today's date on the marketplaces' calendar
pub fn moscow_today() -> NaiveDate {
    Utc::now().with_timezone(&Moscow).date_naive()
}

/// Active credential of an account, or `NotConfigured`
pub fn resolve_credential(
    state: &AppState,
    marketplace: MarketplaceKind,
    account: &str,
) -> Result<SellerAccountCredential> {
    match state.credentials.credential(marketplace, account)? {
        Some(credential) if credential.active => Ok(credential),
        Some(_) => Err(AppError::NotConfigured(format!(
            "{}/{}: account is inactive",
            marketplace, account
        ))),
        None => Err(AppError::NotConfigured(format!(
            "{}/{}: no credential stored",
            marketplace, account
        ))),
    }
}

/// Fetch prices for every rule of the account and classify them.
///
/// Failed chunks are reported as errors; their products come out `not_found`.
async fn check_account(
    state: &AppState,
    marketplace: &dyn Marketplace,
    credential: &SellerAccountCredential,
) -> Result<CheckOutcome> {
    let rules = state
        .rules
        .rules_for_account(credential.marketplace, &credential.account_name)?;

    let ids: Vec<u64> = rules.iter().filter_map(|r| r.external_id).collect();
    let fetch = if ids.is_empty() {
        PriceFetch::default()
    } else {
        marketplace.fetch_prices(credential, &ids).await?
    };

    let mut outcome = ReconciliationService::check_all(
        &rules,
        &fetch,
        state.config.reconciliation.default_max_change_percent,
    );
    for failure in &fetch.failures {
        outcome.errors.push(format!(
            "price lookup for {} products failed: {}",
            failure.external_ids.len(),
            failure.error
        ));
    }

    Ok(outcome)
}

/// Alert on every product below its minimum.
///
/// A slow or failing sink is logged and never holds up the account.
async fn send_alerts(state: &AppState, credential: &SellerAccountCredential, results: &[PriceCheckResult]) {
    for result in results.iter().filter(|r| r.status == PriceStatus::BelowMin) {
        let alert = PriceAlert::from_result(credential.marketplace, &credential.account_name, result);
        match tokio::time::timeout(NOTIFY_TIMEOUT, state.notifier.notify(&alert)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(product = %result.product_id, error = %e, "Failed to send price alert"),
            Err(_) => warn!(
                product = %result.product_id,
                timeout_secs = NOTIFY_TIMEOUT.as_secs(),
                "Price alert timed out"
            ),
        }
    }
}

/// Last step of an account: alerts, then the corrective batch
async fn dispatch_checked(
    state: &AppState,
    marketplace: &dyn Marketplace,
    credential: &SellerAccountCredential,
    report: &mut ReconciliationReport,
) {
    send_alerts(state, credential, &report.results).await;

    let dispatched =
        DispatchService::dispatch(state, marketplace, credential, &report.results, report.dry_run).await;
    match dispatched {
        Ok(Some(dispatched)) => {
            report.updated = dispatched.accepted;
            report.task_id = dispatched.task_id;
            report.errors.extend(dispatched.errors);
        }
        Ok(None) => {}
        Err(e) => report.account_error(&e),
    }

    info!(
        account = %credential.account_name,
        checked = report.checked,
        needing_update = report.needing_update,
        updated = report.updated,
        aggregated_days = ?report.aggregated_days,
        errors = report.errors.len(),
        "Account reconciled"
    );
}

/// Reconcile one account. Never fails; problems end up in the report.
pub async fn reconcile_account(
    state: &AppState,
    marketplace: &dyn Marketplace,
    credential: &SellerAccountCredential,
) -> ReconciliationReport {
    let dry_run = state.is_dry_run();
    let mut report =
        ReconciliationReport::new(credential.marketplace, &credential.account_name, dry_run);

    info!(
        marketplace = %credential.marketplace,
        account = %credential.account_name,
        dry_run,
        "Reconciling account"
    );

    match check_account(state, marketplace, credential).await {
        Ok(outcome) => report.record_check(outcome),
        Err(e) => {
            warn!(account = %credential.account_name, error = %e, "Account skipped");
            report.account_error(&e);
            return report;
        }
    }

    dispatch_checked(state, marketplace, credential, &mut report).await;
    report
}

/// Full daily run of one account.
///
/// Prices are checked and the financial feed aggregated before anything is
/// submitted. An account-fatal error from either feed ends the account with
/// no alerts and no batch.
async fn run_account(
    state: &AppState,
    marketplace: &dyn Marketplace,
    credential: &SellerAccountCredential,
    range: DateRange,
) -> ReconciliationReport {
    let dry_run = state.is_dry_run();
    let mut report =
        ReconciliationReport::new(credential.marketplace, &credential.account_name, dry_run);

    info!(
        marketplace = %credential.marketplace,
        account = %credential.account_name,
        dry_run,
        from = %range.from,
        to = %range.to,
        "Running account"
    );

    let keys = credential
        .key(Capability::Prices)
        .and_then(|_| credential.key(Capability::Transactions));
    if let Err(e) = keys {
        warn!(account = %credential.account_name, error = %e, "Account skipped");
        report.account_error(&e);
        return report;
    }

    match check_account(state, marketplace, credential).await {
        Ok(outcome) => report.record_check(outcome),
        Err(e) => {
            report.account_error(&e);
            if e.is_account_fatal() {
                warn!(account = %credential.account_name, error = %e, "Account skipped");
                return report;
            }
            warn!(account = %credential.account_name, error = %e, "Price check failed");
        }
    }

    match aggregate_account(state, marketplace, credential, range).await {
        Ok(aggregates) => report.aggregated_days = Some(aggregates.len()),
        Err(e) => {
            report.account_error(&e);
            if e.is_account_fatal() {
                warn!(account = %credential.account_name, error = %e, "Account skipped");
                return report;
            }
            warn!(account = %credential.account_name, error = %e, "Aggregation failed");
        }
    }

    dispatch_checked(state, marketplace, credential, &mut report).await;
    report
}

/// Reconcile one named account
pub async fn run_reconciliation(
    state: &AppState,
    marketplace: MarketplaceKind,
    account: &str,
) -> Result<ReconciliationReport> {
    let credential = resolve_credential(state, marketplace, account)?;
    let adapter = state.marketplaces.get(marketplace)?;
    Ok(reconcile_account(state, adapter.as_ref(), &credential).await)
}

async fn aggregate_account(
    state: &AppState,
    marketplace: &dyn Marketplace,
    credential: &SellerAccountCredential,
    range: DateRange,
) -> Result<Vec<DailySalesAggregate>> {
    credential.key(Capability::Transactions)?;

    let transactions = marketplace.fetch_transactions(credential, range).await?;

    let delivered = match marketplace.fetch_delivered_units(credential, range).await {
        Ok(units) => units,
        Err(e) => {
            warn!(account = %credential.account_name, error = %e, "Delivered units unavailable");
            Default::default()
        }
    };

    let aggregates = AggregationService::aggregate(
        credential.marketplace,
        &credential.account_name,
        &transactions,
        range,
        &delivered,
    );
    let written = state.aggregates.upsert_daily_sales(&aggregates)?;

    info!(
        account = %credential.account_name,
        from = %range.from,
        to = %range.to,
        transactions = transactions.len(),
        days = written,
        "Sales aggregated"
    );

    Ok(aggregates)
}

/// Aggregate and store the daily sales of one account
pub async fn run_aggregation(
    state: &AppState,
    marketplace: MarketplaceKind,
    account: &str,
    range: DateRange,
) -> Result<Vec<DailySalesAggregate>> {
    let credential = resolve_credential(state, marketplace, account)?;
    let adapter = state.marketplaces.get(marketplace)?;
    aggregate_account(state, adapter.as_ref(), &credential, range).await
}

/// Products priced below their minimum or recommended price. Nothing is submitted.
pub async fn get_low_price_alerts(
    state: &AppState,
    marketplace: MarketplaceKind,
    account: &str,
) -> Result<Vec<PriceCheckResult>> {
    let credential = resolve_credential(state, marketplace, account)?;
    let adapter = state.marketplaces.get(marketplace)?;
    let outcome = check_account(state, adapter.as_ref(), &credential).await?;

    for error in &outcome.errors {
        warn!(account, error = %error, "Price check problem");
    }

    Ok(outcome
        .results
        .into_iter()
        .filter(|r| matches!(r.status, PriceStatus::BelowMin | PriceStatus::BelowRecommended))
        .collect())
}

/// Check, aggregate and dispatch every active account.
///
/// Cancellation stops before the next account; the account in progress
/// finishes.
pub async fn run_all(
    state: &AppState,
    cancel: &CancellationToken,
) -> Result<Vec<ReconciliationReport>> {
    let accounts = state.credentials.active_accounts()?;
    if accounts.is_empty() {
        return Err(AppError::NotConfigured(
            "No active seller accounts".to_string(),
        ));
    }

    let range = DateRange::last_days(moscow_today(), state.config.aggregation.lookback_days);
    let mut reports = Vec::with_capacity(accounts.len());

    for credential in &accounts {
        if cancel.is_cancelled() {
            info!(remaining = accounts.len() - reports.len(), "Run cancelled");
            break;
        }

        let adapter = match state.marketplaces.get(credential.marketplace) {
            Ok(adapter) => adapter,
            Err(e) => {
                let mut report = ReconciliationReport::new(
                    credential.marketplace,
                    &credential.account_name,
                    state.is_dry_run(),
                );
                report.account_error(&e);
                reports.push(report);
                continue;
            }
        };

        reports.push(run_account(state, adapter.as_ref(), credential, range).await);
    }

    Ok(reports)
}
