//! Persistence layer
//!
//! The engines only see the store traits below; [`sqlite::SqliteDb`] is the
//! implementation the binary uses.

pub mod sqlite;

use crate::error::Result;
use crate::marketplaces::types::MarketplaceKind;
use crate::marketplaces::SellerAccountCredential;
use chrono::{DateTime, Utc};
pub use sqlite::models::{DailySalesAggregate, NewPriceUpdateLog, PriceUpdateLog, ProductPriceRule};

/// Source of per-product pricing rules
pub trait RuleStore: Send + Sync {
    fn rules_for_account(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
    ) -> Result<Vec<ProductPriceRule>>;

    /// Write back the price a product was just set to
    fn record_price_update(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
        product_id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Source of seller account credentials
pub trait CredentialStore: Send + Sync {
    fn credential(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
    ) -> Result<Option<SellerAccountCredential>>;

    fn active_accounts(&self) -> Result<Vec<SellerAccountCredential>>;
}

/// Sink for daily sales aggregates
pub trait AggregateStore: Send + Sync {
    /// Insert or overwrite by (marketplace, account, date); returns rows written
    fn upsert_daily_sales(&self, aggregates: &[DailySalesAggregate]) -> Result<usize>;
}

/// Audit trail of price dispatches
pub trait UpdateLogStore: Send + Sync {
    fn log_price_update(&self, entry: &NewPriceUpdateLog) -> Result<i64>;
}
