//! Common marketplace types

use crate::error::{AppError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported marketplaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketplaceKind {
    Wildberries,
    Ozon,
}

impl MarketplaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketplaceKind::Wildberries => "wildberries",
            MarketplaceKind::Ozon => "ozon",
        }
    }
}

impl fmt::Display for MarketplaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketplaceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wildberries" | "wb" => Ok(MarketplaceKind::Wildberries),
            "ozon" => Ok(MarketplaceKind::Ozon),
            other => Err(AppError::Validation(format!("Unknown marketplace '{}'", other))),
        }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(AppError::Validation(format!(
                "Date range start {} is after end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// The `days` calendar days ending with `today`
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            from: today - Duration::days(span),
            to: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// Current price of one listing, normalized from the provider payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub external_id: u64,
    /// Listed price before discount
    pub price: f64,
    /// Price the customer actually pays
    pub discounted_price: f64,
    pub discount_percent: f64,
    pub currency: String,
}

impl PriceObservation {
    /// Price used for classification: the discounted one when known.
    pub fn effective_price(&self) -> f64 {
        if self.discounted_price > 0.0 {
            self.discounted_price
        } else {
            self.price
        }
    }
}

/// A price chunk the provider did not answer
#[derive(Debug)]
pub struct ChunkFailure {
    pub external_ids: Vec<u64>,
    pub error: AppError,
}

/// Observations gathered across chunks, plus the chunks that failed
#[derive(Debug, Default)]
pub struct PriceFetch {
    pub observations: Vec<PriceObservation>,
    pub failures: Vec<ChunkFailure>,
}

impl PriceFetch {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Normalized operation category of a financial record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    #[default]
    Sale,
    Logistics,
    Service,
    Deduction,
    Return,
    Other,
}

/// One record of a marketplace financial feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesTransaction {
    pub kind: OperationKind,
    /// Provider operation / document names, used for exclusion matching
    pub operation_name: String,
    pub quantity: i64,
    pub revenue: f64,
    /// Commission as percent of revenue, when the provider reports it that way
    pub commission_percent: Option<f64>,
    /// Commission as an absolute amount
    pub commission_amount: f64,
    pub logistics: f64,
    pub storage: f64,
    pub penalty: f64,
    pub return_amount: f64,
    /// Provider-specific extra deductions
    pub surcharge: f64,
    pub order_date: Option<NaiveDate>,
    pub realization_date: Option<NaiveDate>,
}

/// Corrected price for one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub external_id: u64,
    pub price: f64,
    /// Bounds an adapter must stay within when it adjusts the price
    pub min_price: f64,
    pub max_price: f64,
}

impl PriceUpdate {
    /// Update whose price may not move at all
    pub fn exact(external_id: u64, price: f64) -> Self {
        Self {
            external_id,
            price,
            min_price: price,
            max_price: price,
        }
    }
}

/// Asynchronous price task created by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskHandle {
    pub task_id: String,
    pub status: String,
    /// Identifiers the provider accepted
    pub accepted: Vec<u64>,
    /// Identifiers the provider refused, with its reason
    pub rejected: Vec<(u64, String)>,
    /// Prices as they were sent, after any provider-specific rounding
    pub submitted: Vec<PriceUpdate>,
}

impl UpdateTaskHandle {
    /// Price sent for `external_id`
    pub fn submitted_price(&self, external_id: u64) -> Option<f64> {
        self.submitted
            .iter()
            .find(|u| u.external_id == external_id)
            .map(|u| u.price)
    }
}

/// Parse the calendar day from `2024-01-15`, `2024-01-15T10:00:00Z` and similar
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_day("2024-01-15"), Some(expected));
        assert_eq!(parse_day("2024-01-15T23:59:59Z"), Some(expected));
        assert_eq!(parse_day("2024-01-15T10:00:00.123+03:00"), Some(expected));
        assert_eq!(parse_day(""), None);
        assert_eq!(parse_day("15.01.2024"), None);
    }

    #[test]
    fn test_date_range() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = DateRange::last_days(today, 7);
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert!(range.contains(today));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()));

        assert!(DateRange::new(today, range.from).is_err());
    }

    #[test]
    fn test_marketplace_kind_parsing() {
        assert_eq!("WB".parse::<MarketplaceKind>().unwrap(), MarketplaceKind::Wildberries);
        assert_eq!("ozon".parse::<MarketplaceKind>().unwrap(), MarketplaceKind::Ozon);
        assert!("yandex".parse::<MarketplaceKind>().is_err());
    }

    #[test]
    fn test_effective_price_prefers_discounted() {
        let mut obs = PriceObservation {
            external_id: 1,
            price: 1000.0,
            discounted_price: 850.0,
            discount_percent: 15.0,
            currency: "RUB".into(),
        };
        assert_eq!(obs.effective_price(), 850.0);
        obs.discounted_price = 0.0;
        assert_eq!(obs.effective_price(), 1000.0);
    }
}
