//! Low-price notifications
//!
//! Alerts are fire-and-forget: callers log a failed notification and move on.

use crate::error::Result;
use crate::marketplaces::types::MarketplaceKind;
use crate::services::reconciliation_service::{PriceCheckResult, PriceStatus};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// A product whose observed price fell below its minimum
#[derive(Debug, Clone, Serialize)]
pub struct PriceAlert {
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub product_id: String,
    pub product_name: Option<String>,
    pub observed_price: Option<f64>,
    pub min_price: f64,
    pub suggested_price: f64,
    pub status: PriceStatus,
}

impl PriceAlert {
    pub fn from_result(marketplace: MarketplaceKind, account_name: &str, result: &PriceCheckResult) -> Self {
        Self {
            marketplace,
            account_name: account_name.to_string(),
            product_id: result.product_id.clone(),
            product_name: result.product_name.clone(),
            observed_price: result.observed_price,
            min_price: result.min_price,
            suggested_price: result.suggested_price,
            status: result.status,
        }
    }
}

/// Destination for price alerts
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &PriceAlert) -> Result<()>;
}

/// Sink that writes alerts to the log
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, alert: &PriceAlert) -> Result<()> {
        warn!(
            marketplace = %alert.marketplace,
            account = %alert.account_name,
            product = %alert.product_id,
            observed = ?alert.observed_price,
            min = alert.min_price,
            suggested = alert.suggested_price,
            "Price below minimum"
        );
        Ok(())
    }
}
