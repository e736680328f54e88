//! Update Dispatch Service
//!
//! Submits corrected prices for every result that needs an update, as one
//! batch per account. Submissions are never retried. Only identifiers the
//! provider accepted get their last known price written back.

use crate::db::NewPriceUpdateLog;
use crate::error::Result;
use crate::marketplaces::types::PriceUpdate;
use crate::marketplaces::{Marketplace, SellerAccountCredential};
use crate::services::reconciliation_service::PriceCheckResult;
use crate::state::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Result of dispatching one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub task_id: Option<String>,
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub dry_run: bool,
    /// Per-item problems (rejections, failed write-backs)
    pub errors: Vec<String>,
}

/// Update dispatch service for business logic
pub struct DispatchService;

impl DispatchService {
    /// Price updates for results flagged `needs_update`
    pub fn build_batch(results: &[PriceCheckResult]) -> Vec<PriceUpdate> {
        results
            .iter()
            .filter(|r| r.needs_update)
            .filter_map(|r| {
                r.external_id.map(|external_id| PriceUpdate {
                    external_id,
                    price: r.suggested_price,
                    min_price: r.min_price,
                    max_price: r.max_price,
                })
            })
            .collect()
    }

    /// Submit the batch built from `results`.
    ///
    /// Returns `None` when nothing needs an update. A failed submission is
    /// recorded in the audit log and returned as the error.
    pub async fn dispatch(
        state: &AppState,
        marketplace: &dyn Marketplace,
        credential: &SellerAccountCredential,
        results: &[PriceCheckResult],
        dry_run: bool,
    ) -> Result<Option<DispatchOutcome>> {
        let batch = Self::build_batch(results);
        if batch.is_empty() {
            return Ok(None);
        }

        let account = credential.account_name.as_str();

        if dry_run {
            for update in &batch {
                info!(
                    marketplace = %credential.marketplace,
                    account,
                    external_id = update.external_id,
                    price = update.price,
                    "Dry run: price update not submitted"
                );
            }
            Self::audit(state, credential, &NewPriceUpdateLog {
                marketplace: credential.marketplace,
                account_name: account.to_string(),
                task_id: None,
                item_count: batch.len(),
                accepted_count: 0,
                rejected_count: 0,
                status: "dry_run".to_string(),
                message: None,
                dry_run: true,
            });

            return Ok(Some(DispatchOutcome {
                task_id: None,
                submitted: batch.len(),
                accepted: 0,
                rejected: 0,
                dry_run: true,
                errors: Vec::new(),
            }));
        }

        info!(
            marketplace = %credential.marketplace,
            account,
            items = batch.len(),
            "Submitting price update batch"
        );

        let handle = match marketplace.submit_price_update(credential, &batch).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(account, error = %e, "Price update batch failed");
                Self::audit(state, credential, &NewPriceUpdateLog {
                    marketplace: credential.marketplace,
                    account_name: account.to_string(),
                    task_id: None,
                    item_count: batch.len(),
                    accepted_count: 0,
                    rejected_count: 0,
                    status: "failed".to_string(),
                    message: Some(e.to_string()),
                    dry_run: false,
                });
                return Err(e);
            }
        };

        let product_by_id: HashMap<u64, &str> = results
            .iter()
            .filter_map(|r| r.external_id.map(|id| (id, r.product_id.as_str())))
            .collect();
        let price_by_id: HashMap<u64, f64> = batch.iter().map(|u| (u.external_id, u.price)).collect();

        let mut errors = Vec::new();
        let now = Utc::now();

        for external_id in &handle.accepted {
            // Write back what the provider received, not what was suggested
            let sent = handle
                .submitted_price(*external_id)
                .or_else(|| price_by_id.get(external_id).copied());
            let (Some(product_id), Some(price)) = (product_by_id.get(external_id), sent) else {
                warn!(account, external_id, "Provider accepted an identifier outside the batch");
                continue;
            };

            if let Err(e) = state.rules.record_price_update(
                credential.marketplace,
                account,
                product_id,
                price,
                now,
            ) {
                warn!(account, product = product_id, error = %e, "Failed to record price update");
                errors.push(format!("product {}: {}", product_id, e));
            }
        }

        for (external_id, reason) in &handle.rejected {
            let product = product_by_id
                .get(external_id)
                .map(|p| p.to_string())
                .unwrap_or_else(|| external_id.to_string());
            warn!(account, product = %product, reason = %reason, "Price update rejected");
            errors.push(format!("product {}: update rejected: {}", product, reason));
        }

        Self::audit(state, credential, &NewPriceUpdateLog {
            marketplace: credential.marketplace,
            account_name: account.to_string(),
            task_id: Some(handle.task_id.clone()),
            item_count: batch.len(),
            accepted_count: handle.accepted.len(),
            rejected_count: handle.rejected.len(),
            status: handle.status.clone(),
            message: (!errors.is_empty()).then(|| errors.join("; ")),
            dry_run: false,
        });

        info!(
            account,
            task_id = %handle.task_id,
            accepted = handle.accepted.len(),
            rejected = handle.rejected.len(),
            "Price update batch submitted"
        );

        Ok(Some(DispatchOutcome {
            task_id: Some(handle.task_id),
            submitted: batch.len(),
            accepted: handle.accepted.len(),
            rejected: handle.rejected.len(),
            dry_run: false,
            errors,
        }))
    }

    fn audit(state: &AppState, credential: &SellerAccountCredential, entry: &NewPriceUpdateLog) {
        if let Err(e) = state.update_log.log_price_update(entry) {
            warn!(account = %credential.account_name, error = %e, "Failed to write price update log");
        }
    }
}
