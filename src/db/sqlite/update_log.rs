//! Price update audit log
//!
//! Every dispatch, including dry runs and failed submissions, leaves one row.

use super::parse_marketplace;
use crate::db::sqlite::models::{NewPriceUpdateLog, PriceUpdateLog};
use crate::error::Result;
use rusqlite::{params, Connection};

/// Create a new log entry
pub fn create_log(conn: &Connection, entry: &NewPriceUpdateLog) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO price_update_log (marketplace, account_name, task_id, item_count, accepted_count, rejected_count, status, message, dry_run)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            entry.marketplace.as_str(),
            entry.account_name,
            entry.task_id,
            entry.item_count as i64,
            entry.accepted_count as i64,
            entry.rejected_count as i64,
            entry.status,
            entry.message,
            entry.dry_run,
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::debug!(
        "Created price update log entry: id={}, task_id={:?}, status={}",
        id,
        entry.task_id,
        entry.status
    );

    Ok(id)
}

/// Most recent entries first
pub fn get_recent_logs(conn: &Connection, limit: usize) -> Result<Vec<PriceUpdateLog>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, marketplace, account_name, task_id, item_count, accepted_count,
               rejected_count, status, message, dry_run, created_at
        FROM price_update_log
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let logs = stmt
        .query_map([limit as i64], |row| {
            Ok(PriceUpdateLog {
                id: row.get(0)?,
                marketplace: parse_marketplace(1, row.get(1)?)?,
                account_name: row.get(2)?,
                task_id: row.get(3)?,
                item_count: row.get(4)?,
                accepted_count: row.get(5)?,
                rejected_count: row.get(6)?,
                status: row.get(7)?,
                message: row.get(8)?,
                dry_run: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(logs)
}
