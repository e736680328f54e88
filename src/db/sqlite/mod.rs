//! SQLite database module

pub mod models;
mod credentials;
mod daily_sales;
mod migrations;
mod price_rules;
mod update_log;

use crate::db::{AggregateStore, CredentialStore, RuleStore, UpdateLogStore};
use crate::error::{AppError, Result};
use crate::marketplaces::types::{DateRange, MarketplaceKind};
use crate::marketplaces::SellerAccountCredential;
use chrono::{DateTime, Utc};
use models::*;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// Marketplace column decoding shared by the table modules
fn parse_marketplace(idx: usize, raw: String) -> rusqlite::Result<MarketplaceKind> {
    raw.parse().map_err(|e: AppError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open (or create) the database file and run migrations
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// In-memory database, used by tests and dry experiments
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Credential Methods ==========

    /// Insert or replace a seller account credential
    pub fn save_credential(&self, credential: &SellerAccountCredential) -> Result<()> {
        let conn = self.conn.lock();
        credentials::save_credential(&conn, credential)
    }

    // ========== Price Rule Methods ==========

    /// Insert or replace a price rule
    pub fn save_price_rule(&self, rule: &ProductPriceRule) -> Result<()> {
        let conn = self.conn.lock();
        price_rules::save_rule(&conn, rule)
    }

    // ========== Daily Sales Methods ==========

    /// Stored aggregates of one account
    pub fn get_daily_sales(
        &self,
        marketplace: MarketplaceKind,
        account_name: &str,
        range: DateRange,
    ) -> Result<Vec<DailySalesAggregate>> {
        let conn = self.conn.lock();
        daily_sales::get_daily_sales(&conn, marketplace, account_name, range)
    }

    // ========== Price Update Log Methods ==========

    pub fn get_recent_update_logs(&self, limit: usize) -> Result<Vec<PriceUpdateLog>> {
        let conn = self.conn.lock();
        update_log::get_recent_logs(&conn, limit)
    }
}

impl RuleStore for SqliteDb {
    fn rules_for_account(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
    ) -> Result<Vec<ProductPriceRule>> {
        let conn = self.conn.lock();
        price_rules::get_rules(&conn, marketplace, account)
    }

    fn record_price_update(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
        product_id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        price_rules::update_last_known_price(&conn, marketplace, account, product_id, price, at)
    }
}

impl CredentialStore for SqliteDb {
    fn credential(
        &self,
        marketplace: MarketplaceKind,
        account: &str,
    ) -> Result<Option<SellerAccountCredential>> {
        let conn = self.conn.lock();
        credentials::get_credential(&conn, marketplace, account)
    }

    fn active_accounts(&self) -> Result<Vec<SellerAccountCredential>> {
        let conn = self.conn.lock();
        credentials::get_active_credentials(&conn)
    }
}

impl AggregateStore for SqliteDb {
    fn upsert_daily_sales(&self, aggregates: &[DailySalesAggregate]) -> Result<usize> {
        let mut conn = self.conn.lock();
        daily_sales::upsert_daily_sales(&mut conn, aggregates)
    }
}

impl UpdateLogStore for SqliteDb {
    fn log_price_update(&self, entry: &NewPriceUpdateLog) -> Result<i64> {
        let conn = self.conn.lock();
        update_log::create_log(&conn, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("reconciler.db");

        {
            let db = SqliteDb::new(&path).unwrap();
            db.save_credential(&SellerAccountCredential {
                marketplace: MarketplaceKind::Wildberries,
                account_name: "main".into(),
                catalog_key: None,
                price_key: Some("k".into()),
                transaction_key: None,
                client_id: None,
                active: true,
            })
            .unwrap();
        }

        let db = SqliteDb::new(&path).unwrap();
        let accounts = db.active_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].marketplace, MarketplaceKind::Wildberries);
    }

    #[test]
    fn test_store_traits_on_memory_db() {
        let db = SqliteDb::open_in_memory().unwrap();
        let rule = ProductPriceRule::new(MarketplaceKind::Ozon, "shop", "p-1", Some(77), 100.0);
        db.save_price_rule(&rule).unwrap();

        let rules = db.rules_for_account(MarketplaceKind::Ozon, "shop").unwrap();
        assert_eq!(rules.len(), 1);

        db.record_price_update(MarketplaceKind::Ozon, "shop", "p-1", 150.0, Utc::now())
            .unwrap();
        let rules = db.rules_for_account(MarketplaceKind::Ozon, "shop").unwrap();
        assert_eq!(rules[0].last_known_price, Some(150.0));

        assert!(db.credential(MarketplaceKind::Ozon, "shop").unwrap().is_none());
    }
}
