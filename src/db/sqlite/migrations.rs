//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_seller_accounts", CREATE_SELLER_ACCOUNTS_TABLE)?;
    run_migration(conn, "002_price_rules", CREATE_PRICE_RULES_TABLE)?;
    run_migration(conn, "003_daily_sales", CREATE_DAILY_SALES_TABLE)?;
    run_migration(conn, "004_price_update_log", CREATE_PRICE_UPDATE_LOG_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_SELLER_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE seller_accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    marketplace TEXT NOT NULL,
    account_name TEXT NOT NULL,
    catalog_key TEXT,
    price_key TEXT,
    transaction_key TEXT,
    client_id TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(marketplace, account_name)
);
"#;

const CREATE_PRICE_RULES_TABLE: &str = r#"
CREATE TABLE price_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    marketplace TEXT NOT NULL,
    account_name TEXT NOT NULL,
    product_id TEXT NOT NULL,
    product_name TEXT,
    external_id INTEGER,
    cost_price REAL NOT NULL DEFAULT 0,
    min_price REAL NOT NULL,
    max_price REAL,
    recommended_price REAL,
    target_margin_percent REAL,
    last_known_price REAL,
    last_update_at TEXT,
    max_change_percent REAL,
    auto_price_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(marketplace, account_name, product_id)
);

CREATE INDEX idx_price_rules_account ON price_rules(marketplace, account_name);
"#;

const CREATE_DAILY_SALES_TABLE: &str = r#"
CREATE TABLE daily_sales (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    marketplace TEXT NOT NULL,
    account_name TEXT NOT NULL,
    sale_date TEXT NOT NULL,
    orders_count INTEGER NOT NULL DEFAULT 0,
    items_sold INTEGER NOT NULL DEFAULT 0,
    revenue REAL NOT NULL DEFAULT 0,
    commission REAL NOT NULL DEFAULT 0,
    logistics REAL NOT NULL DEFAULT 0,
    storage REAL NOT NULL DEFAULT 0,
    penalties REAL NOT NULL DEFAULT 0,
    returns REAL NOT NULL DEFAULT 0,
    surcharges REAL NOT NULL DEFAULT 0,
    total_expenses REAL NOT NULL DEFAULT 0,
    profit REAL NOT NULL DEFAULT 0,
    average_order_value REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(marketplace, account_name, sale_date)
);

CREATE INDEX idx_daily_sales_date ON daily_sales(sale_date);
"#;

const CREATE_PRICE_UPDATE_LOG_TABLE: &str = r#"
CREATE TABLE price_update_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    marketplace TEXT NOT NULL,
    account_name TEXT NOT NULL,
    task_id TEXT,
    item_count INTEGER NOT NULL DEFAULT 0,
    accepted_count INTEGER NOT NULL DEFAULT 0,
    rejected_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    message TEXT,
    dry_run INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_price_update_log_created ON price_update_log(created_at);
"#;
