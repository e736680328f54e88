//! Price Reconciliation Service
//!
//! Classifies each product's observed marketplace price against its pricing
//! rule and computes the corrective target price.
//!
//! Classification order for an observed (discounted) price:
//!
//! 1. below minimum: `below_min`, always corrected to the recommended price
//! 2. below recommended: `below_recommended`, corrected only with auto-pricing
//! 3. above maximum: `above_max`, reported but never pushed down automatically
//! 4. otherwise `ok`
//!
//! Every suggested price passes the volatility guard and ends inside
//! `[min, max]`.

use crate::db::ProductPriceRule;
use crate::error::{AppError, Result};
use crate::marketplaces::types::{PriceFetch, PriceObservation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Max change percent used when neither the rule nor the config sets one
pub const DEFAULT_MAX_CHANGE_PERCENT: f64 = 25.0;

/// Max price multiplier applied to the recommended price when no max is set
const DEFAULT_MAX_MULTIPLIER: f64 = 1.5;

const PRICE_EPSILON: f64 = 0.005;

/// Pricing state of one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Ok,
    BelowMin,
    BelowRecommended,
    AboveMax,
    NotFound,
}

impl PriceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStatus::Ok => "ok",
            PriceStatus::BelowMin => "below_min",
            PriceStatus::BelowRecommended => "below_recommended",
            PriceStatus::AboveMax => "above_max",
            PriceStatus::NotFound => "not_found",
        }
    }
}

impl fmt::Display for PriceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule bounds after defaults have been applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceThresholds {
    pub min: f64,
    pub max: f64,
    pub recommended: f64,
    pub max_change_percent: f64,
}

impl PriceThresholds {
    /// Normalize a rule: recommended falls back to min, max to recommended × 1.5
    pub fn from_rule(rule: &ProductPriceRule, default_max_change: f64) -> Result<Self> {
        let min = rule.min_price;
        if !min.is_finite() || min < 0.0 {
            return Err(AppError::DataAnomaly(format!(
                "product {}: invalid minimum price {}",
                rule.product_id, min
            )));
        }

        let recommended = rule
            .recommended_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(min);
        let max = rule
            .max_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(recommended * DEFAULT_MAX_MULTIPLIER);
        let max_change_percent = rule
            .max_change_percent
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(default_max_change);

        if max <= 0.0 {
            return Err(AppError::DataAnomaly(format!(
                "product {}: no usable price bounds",
                rule.product_id
            )));
        }
        if min > max {
            return Err(AppError::DataAnomaly(format!(
                "product {}: minimum price {} exceeds maximum price {}",
                rule.product_id, min, max
            )));
        }

        Ok(Self {
            min,
            max,
            recommended,
            max_change_percent,
        })
    }

    pub fn clamp(&self, price: f64) -> f64 {
        price.max(self.min).min(self.max)
    }
}

/// Outcome of checking one product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceCheckResult {
    pub product_id: String,
    pub product_name: Option<String>,
    pub external_id: Option<u64>,
    /// Discounted price the customer sees
    pub observed_price: Option<f64>,
    pub list_price: Option<f64>,
    pub discount_percent: Option<f64>,
    pub min_price: f64,
    pub max_price: f64,
    pub recommended_price: f64,
    pub status: PriceStatus,
    pub suggested_price: f64,
    pub margin_percent: f64,
    pub profit: f64,
    pub needs_update: bool,
    pub price_change_too_large: bool,
    pub last_price: Option<f64>,
    pub max_change_percent: f64,
}

/// Results of one account plus the per-product errors
#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub results: Vec<PriceCheckResult>,
    pub errors: Vec<String>,
}

/// Price reconciliation service for business logic
pub struct ReconciliationService;

impl ReconciliationService {
    /// Margin in percent of the observed price; zero without cost or price
    pub fn margin(observed: f64, cost: f64) -> f64 {
        if observed <= 0.0 || cost <= 0.0 {
            return 0.0;
        }
        (observed - cost) / observed * 100.0
    }

    /// Limit the move from the reference price to `max_change_percent`.
    ///
    /// The reference is the last known price, else the observed one. Returns
    /// the clamped price and whether the guard cut the change.
    pub fn apply_volatility_guard(
        target: f64,
        observed: f64,
        last_price: Option<f64>,
        thresholds: &PriceThresholds,
    ) -> (f64, bool) {
        let reference = last_price.filter(|p| *p > 0.0).unwrap_or(observed);

        if (target - observed).abs() < PRICE_EPSILON || reference <= 0.0 {
            return (thresholds.clamp(target), false);
        }

        let change_percent = (target - reference).abs() / reference * 100.0;
        if change_percent <= thresholds.max_change_percent {
            return (thresholds.clamp(target), false);
        }

        let step = thresholds.max_change_percent / 100.0;
        let guarded = if target > reference {
            reference * (1.0 + step)
        } else {
            reference * (1.0 - step)
        };

        (thresholds.clamp(guarded), true)
    }

    /// Classify one product against its rule
    pub fn check_product(
        rule: &ProductPriceRule,
        observation: Option<&PriceObservation>,
        default_max_change: f64,
    ) -> Result<PriceCheckResult> {
        let thresholds = PriceThresholds::from_rule(rule, default_max_change)?;

        let mut result = PriceCheckResult {
            product_id: rule.product_id.clone(),
            product_name: rule.product_name.clone(),
            external_id: rule.external_id,
            observed_price: None,
            list_price: None,
            discount_percent: None,
            min_price: thresholds.min,
            max_price: thresholds.max,
            recommended_price: thresholds.recommended,
            status: PriceStatus::NotFound,
            suggested_price: round_price(thresholds.clamp(thresholds.recommended)),
            margin_percent: 0.0,
            profit: 0.0,
            needs_update: false,
            price_change_too_large: false,
            last_price: rule.last_known_price,
            max_change_percent: thresholds.max_change_percent,
        };

        let Some(observation) = observation else {
            return Ok(result);
        };

        let observed = observation.effective_price();
        if !observed.is_finite() || observed < 0.0 {
            return Err(AppError::DataAnomaly(format!(
                "product {}: implausible observed price {}",
                rule.product_id, observed
            )));
        }

        let (status, target, needs_update) = if observed < thresholds.min {
            (PriceStatus::BelowMin, thresholds.recommended, true)
        } else if observed < thresholds.recommended {
            (
                PriceStatus::BelowRecommended,
                thresholds.recommended,
                rule.auto_price_enabled,
            )
        } else if observed > thresholds.max {
            (PriceStatus::AboveMax, thresholds.recommended, false)
        } else {
            (PriceStatus::Ok, observed, false)
        };

        let (guarded, too_large) =
            Self::apply_volatility_guard(target, observed, rule.last_known_price, &thresholds);

        result.observed_price = Some(observed);
        result.list_price = Some(observation.price);
        result.discount_percent = Some(observation.discount_percent);
        result.status = status;
        result.suggested_price = thresholds.clamp(round_price(guarded));
        result.margin_percent = Self::margin(observed, rule.cost_price);
        result.profit = if observed > 0.0 {
            observed - rule.cost_price
        } else {
            0.0
        };
        result.needs_update = needs_update;
        result.price_change_too_large = too_large;

        Ok(result)
    }

    /// Check every rule of an account against one price fetch.
    ///
    /// Rules without an external identifier and rules with inconsistent
    /// bounds become error strings; everything else yields a result.
    pub fn check_all(
        rules: &[ProductPriceRule],
        fetch: &PriceFetch,
        default_max_change: f64,
    ) -> CheckOutcome {
        let by_id: HashMap<u64, &PriceObservation> = fetch
            .observations
            .iter()
            .map(|obs| (obs.external_id, obs))
            .collect();

        let mut outcome = CheckOutcome::default();

        for rule in rules {
            let Some(external_id) = rule.external_id else {
                outcome.errors.push(format!(
                    "product {}: no marketplace identifier",
                    rule.product_id
                ));
                continue;
            };

            match Self::check_product(rule, by_id.get(&external_id).copied(), default_max_change) {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    tracing::warn!(product = %rule.product_id, error = %e, "Skipping product");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        outcome
    }
}

fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
