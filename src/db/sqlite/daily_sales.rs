//! Daily sales aggregates

use super::parse_marketplace;
use crate::db::sqlite::models::DailySalesAggregate;
use crate::error::Result;
use crate::marketplaces::types::{DateRange, MarketplaceKind};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DailySalesAggregate> {
    let raw_date: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DailySalesAggregate {
        marketplace: parse_marketplace(0, row.get(0)?)?,
        account_name: row.get(1)?,
        date,
        orders_count: row.get(3)?,
        items_sold: row.get(4)?,
        revenue: row.get(5)?,
        commission: row.get(6)?,
        logistics: row.get(7)?,
        storage: row.get(8)?,
        penalties: row.get(9)?,
        returns: row.get(10)?,
        surcharges: row.get(11)?,
        total_expenses: row.get(12)?,
        profit: row.get(13)?,
        average_order_value: row.get(14)?,
    })
}

/// Insert or overwrite aggregates in one transaction
pub fn upsert_daily_sales(conn: &mut Connection, aggregates: &[DailySalesAggregate]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO daily_sales (
                marketplace, account_name, sale_date, orders_count, items_sold, revenue,
                commission, logistics, storage, penalties, returns, surcharges,
                total_expenses, profit, average_order_value
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(marketplace, account_name, sale_date) DO UPDATE SET
                orders_count = excluded.orders_count,
                items_sold = excluded.items_sold,
                revenue = excluded.revenue,
                commission = excluded.commission,
                logistics = excluded.logistics,
                storage = excluded.storage,
                penalties = excluded.penalties,
                returns = excluded.returns,
                surcharges = excluded.surcharges,
                total_expenses = excluded.total_expenses,
                profit = excluded.profit,
                average_order_value = excluded.average_order_value,
                updated_at = datetime('now')
            "#,
        )?;

        for agg in aggregates {
            written += stmt.execute(params![
                agg.marketplace.as_str(),
                agg.account_name,
                agg.date.format(DATE_FORMAT).to_string(),
                agg.orders_count,
                agg.items_sold,
                agg.revenue,
                agg.commission,
                agg.logistics,
                agg.storage,
                agg.penalties,
                agg.returns,
                agg.surcharges,
                agg.total_expenses,
                agg.profit,
                agg.average_order_value,
            ])?;
        }
    }

    tx.commit()?;
    tracing::debug!("Upserted {} daily sales rows", written);
    Ok(written)
}

/// Aggregates of one account within a date range, ordered by date
pub fn get_daily_sales(
    conn: &Connection,
    marketplace: MarketplaceKind,
    account_name: &str,
    range: DateRange,
) -> Result<Vec<DailySalesAggregate>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT marketplace, account_name, sale_date, orders_count, items_sold, revenue,
               commission, logistics, storage, penalties, returns, surcharges,
               total_expenses, profit, average_order_value
        FROM daily_sales
        WHERE marketplace = ?1 AND account_name = ?2 AND sale_date BETWEEN ?3 AND ?4
        ORDER BY sale_date
        "#,
    )?;

    let rows = stmt
        .query_map(
            params![
                marketplace.as_str(),
                account_name,
                range.from.format(DATE_FORMAT).to_string(),
                range.to.format(DATE_FORMAT).to_string(),
            ],
            from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
