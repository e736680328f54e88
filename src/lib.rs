//! Marketplace Reconciler
//!
//! Price reconciliation and daily sales aggregation for seller accounts on
//! Wildberries and Ozon.

pub mod config;
pub mod db;
pub mod error;
pub mod marketplaces;
pub mod notify;
pub mod scheduler;
pub mod services;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
///
/// `filter` wins over `RUST_LOG`; without either the crate logs at info.
pub fn init_tracing(json: bool, filter: Option<&str>) {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "marketplace_reconciler=info".into()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
