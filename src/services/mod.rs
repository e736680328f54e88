//! Services Layer
//!
//! Business logic shared by the CLI commands and the daily scheduler.
//!
//! # Architecture
//!
//! ```text
//! CLI command ──────┐
//!                   ├──> Orchestrator --> Services --> Marketplace/DB
//! Daily scheduler ──┘
//! ```
//!
//! # Services
//!
//! - `ReconciliationService` - Classify observed prices against pricing rules
//! - `AggregationService` - Daily profit and loss from the financial feed
//! - `DispatchService` - Submit corrected prices and record the outcome
//! - `orchestrator` - Per-account runs over all of the above

pub mod aggregation_service;
pub mod dispatch_service;
pub mod orchestrator;
pub mod reconciliation_service;

#[cfg(test)]
pub(crate) mod fakes;

// Re-export commonly used types and services
pub use aggregation_service::AggregationService;
pub use dispatch_service::{DispatchOutcome, DispatchService};
pub use orchestrator::{
    get_low_price_alerts, run_aggregation, run_all, run_reconciliation, ReconciliationReport,
};
pub use reconciliation_service::{PriceCheckResult, PriceStatus, ReconciliationService};
