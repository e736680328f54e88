//! SQLite database models

use crate::marketplaces::types::MarketplaceKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Pricing rule for one product listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPriceRule {
    pub product_id: String,
    pub product_name: Option<String>,
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    /// Marketplace-assigned numeric id (nmId / product_id)
    pub external_id: Option<u64>,
    pub cost_price: f64,
    pub min_price: f64,
    pub max_price: Option<f64>,
    pub recommended_price: Option<f64>,
    pub target_margin_percent: Option<f64>,
    pub last_known_price: Option<f64>,
    pub last_update_at: Option<DateTime<Utc>>,
    /// Largest single automated change, in percent
    pub max_change_percent: Option<f64>,
    pub auto_price_enabled: bool,
}

impl ProductPriceRule {
    /// Rule with only the required fields set
    pub fn new(
        marketplace: MarketplaceKind,
        account_name: &str,
        product_id: &str,
        external_id: Option<u64>,
        min_price: f64,
    ) -> Self {
        Self {
            product_id: product_id.to_string(),
            product_name: None,
            marketplace,
            account_name: account_name.to_string(),
            external_id,
            cost_price: 0.0,
            min_price,
            max_price: None,
            recommended_price: None,
            target_margin_percent: None,
            last_known_price: None,
            last_update_at: None,
            max_change_percent: None,
            auto_price_enabled: false,
        }
    }
}

/// Profit and loss of one account for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySalesAggregate {
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub date: NaiveDate,
    pub orders_count: i64,
    pub items_sold: i64,
    pub revenue: f64,
    pub commission: f64,
    pub logistics: f64,
    pub storage: f64,
    pub penalties: f64,
    pub returns: f64,
    pub surcharges: f64,
    pub total_expenses: f64,
    pub profit: f64,
    pub average_order_value: f64,
}

/// Price update log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdateLog {
    pub id: i64,
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub task_id: Option<String>,
    pub item_count: i64,
    pub accepted_count: i64,
    pub rejected_count: i64,
    pub status: String,
    pub message: Option<String>,
    pub dry_run: bool,
    pub created_at: String,
}

/// Price update log entry to be written
#[derive(Debug, Clone)]
pub struct NewPriceUpdateLog {
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub task_id: Option<String>,
    pub item_count: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub status: String,
    pub message: Option<String>,
    pub dry_run: bool,
}
