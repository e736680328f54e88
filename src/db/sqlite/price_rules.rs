//! Product price rules

use super::parse_marketplace;
use crate::db::sqlite::models::ProductPriceRule;
use crate::error::{AppError, Result};
use crate::marketplaces::types::MarketplaceKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str = r#"
    product_id, product_name, marketplace, account_name, external_id, cost_price,
    min_price, max_price, recommended_price, target_margin_percent, last_known_price,
    last_update_at, max_change_percent, auto_price_enabled
"#;

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProductPriceRule> {
    let external_id: Option<i64> = row.get(4)?;
    let last_update_at: Option<String> = row.get(11)?;

    Ok(ProductPriceRule {
        product_id: row.get(0)?,
        product_name: row.get(1)?,
        marketplace: parse_marketplace(2, row.get(2)?)?,
        account_name: row.get(3)?,
        external_id: external_id.and_then(|id| u64::try_from(id).ok()),
        cost_price: row.get(5)?,
        min_price: row.get(6)?,
        max_price: row.get(7)?,
        recommended_price: row.get(8)?,
        target_margin_percent: row.get(9)?,
        last_known_price: row.get(10)?,
        last_update_at: last_update_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        max_change_percent: row.get(12)?,
        auto_price_enabled: row.get(13)?,
    })
}

/// Insert or replace a rule
pub fn save_rule(conn: &Connection, rule: &ProductPriceRule) -> Result<()> {
    let external_id = rule
        .external_id
        .map(i64::try_from)
        .transpose()
        .map_err(|_| AppError::Validation(format!("External id of {} is out of range", rule.product_id)))?;

    conn.execute(
        r#"
        INSERT INTO price_rules (
            product_id, product_name, marketplace, account_name, external_id, cost_price,
            min_price, max_price, recommended_price, target_margin_percent, last_known_price,
            last_update_at, max_change_percent, auto_price_enabled
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(marketplace, account_name, product_id) DO UPDATE SET
            product_name = excluded.product_name,
            external_id = excluded.external_id,
            cost_price = excluded.cost_price,
            min_price = excluded.min_price,
            max_price = excluded.max_price,
            recommended_price = excluded.recommended_price,
            target_margin_percent = excluded.target_margin_percent,
            last_known_price = excluded.last_known_price,
            last_update_at = excluded.last_update_at,
            max_change_percent = excluded.max_change_percent,
            auto_price_enabled = excluded.auto_price_enabled,
            updated_at = datetime('now')
        "#,
        params![
            rule.product_id,
            rule.product_name,
            rule.marketplace.as_str(),
            rule.account_name,
            external_id,
            rule.cost_price,
            rule.min_price,
            rule.max_price,
            rule.recommended_price,
            rule.target_margin_percent,
            rule.last_known_price,
            rule.last_update_at.map(|dt| dt.to_rfc3339()),
            rule.max_change_percent,
            rule.auto_price_enabled,
        ],
    )?;

    Ok(())
}

/// Rules of one account, ordered by product id
pub fn get_rules(
    conn: &Connection,
    marketplace: MarketplaceKind,
    account_name: &str,
) -> Result<Vec<ProductPriceRule>> {
    let sql = format!(
        "SELECT {} FROM price_rules WHERE marketplace = ?1 AND account_name = ?2 ORDER BY product_id",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rules = stmt
        .query_map(params![marketplace.as_str(), account_name], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rules)
}

/// Write back last known price and update time
pub fn update_last_known_price(
    conn: &Connection,
    marketplace: MarketplaceKind,
    account_name: &str,
    product_id: &str,
    price: f64,
    at: DateTime<Utc>,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE price_rules
        SET last_known_price = ?1, last_update_at = ?2, updated_at = datetime('now')
        WHERE marketplace = ?3 AND account_name = ?4 AND product_id = ?5
        "#,
        params![price, at.to_rfc3339(), marketplace.as_str(), account_name, product_id],
    )?;

    if updated == 0 {
        return Err(AppError::NotFound(format!(
            "No price rule for product {} on {} account '{}'",
            product_id, marketplace, account_name
        )));
    }

    Ok(())
}
