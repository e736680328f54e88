//! Application state management

use crate::config::AppConfig;
use crate::db::sqlite::SqliteDb;
use crate::db::{AggregateStore, CredentialStore, RuleStore, UpdateLogStore};
use crate::error::Result;
use crate::marketplaces::MarketplaceRegistry;
use crate::notify::{NotificationSink, TracingNotifier};
use std::sync::Arc;

/// Application state shared by every run
pub struct AppState {
    pub config: AppConfig,

    /// Per-product pricing rules
    pub rules: Arc<dyn RuleStore>,

    /// Seller account credentials
    pub credentials: Arc<dyn CredentialStore>,

    /// Daily sales aggregates
    pub aggregates: Arc<dyn AggregateStore>,

    /// Dispatch audit trail
    pub update_log: Arc<dyn UpdateLogStore>,

    /// Marketplace adapters
    pub marketplaces: Arc<MarketplaceRegistry>,

    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Open the database and build every adapter from `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        let sqlite = Arc::new(SqliteDb::new(&config.database.path)?);
        let marketplaces = Arc::new(MarketplaceRegistry::new(&config.http_settings())?);

        tracing::info!(
            db = %config.database.path.display(),
            dry_run = config.reconciliation.dry_run,
            "Application state initialized"
        );

        Ok(Self::with_sqlite(config, sqlite, marketplaces))
    }

    /// State backed by one SQLite database for every store
    pub fn with_sqlite(
        config: AppConfig,
        sqlite: Arc<SqliteDb>,
        marketplaces: Arc<MarketplaceRegistry>,
    ) -> Self {
        Self {
            config,
            rules: sqlite.clone(),
            credentials: sqlite.clone(),
            aggregates: sqlite.clone(),
            update_log: sqlite,
            marketplaces,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.reconciliation.dry_run
    }
}
