//! Seller account credentials

use super::parse_marketplace;
use crate::error::Result;
use crate::marketplaces::types::MarketplaceKind;
use crate::marketplaces::SellerAccountCredential;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "marketplace, account_name, catalog_key, price_key, transaction_key, client_id, is_active";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SellerAccountCredential> {
    Ok(SellerAccountCredential {
        marketplace: parse_marketplace(0, row.get(0)?)?,
        account_name: row.get(1)?,
        catalog_key: row.get(2)?,
        price_key: row.get(3)?,
        transaction_key: row.get(4)?,
        client_id: row.get(5)?,
        active: row.get(6)?,
    })
}

/// Insert or replace a credential
pub fn save_credential(conn: &Connection, credential: &SellerAccountCredential) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO seller_accounts (marketplace, account_name, catalog_key, price_key, transaction_key, client_id, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(marketplace, account_name) DO UPDATE SET
            catalog_key = excluded.catalog_key,
            price_key = excluded.price_key,
            transaction_key = excluded.transaction_key,
            client_id = excluded.client_id,
            is_active = excluded.is_active,
            updated_at = datetime('now')
        "#,
        params![
            credential.marketplace.as_str(),
            credential.account_name,
            credential.catalog_key,
            credential.price_key,
            credential.transaction_key,
            credential.client_id,
            credential.active,
        ],
    )?;

    tracing::debug!(
        "Saved credential for {} account '{}'",
        credential.marketplace,
        credential.account_name
    );
    Ok(())
}

/// Get the credential of one account, active or not
pub fn get_credential(
    conn: &Connection,
    marketplace: MarketplaceKind,
    account_name: &str,
) -> Result<Option<SellerAccountCredential>> {
    let sql = format!(
        "SELECT {} FROM seller_accounts WHERE marketplace = ?1 AND account_name = ?2",
        SELECT_COLUMNS
    );
    let credential = conn
        .query_row(&sql, params![marketplace.as_str(), account_name], from_row)
        .optional()?;

    Ok(credential)
}

/// All active accounts, ordered by marketplace then name
pub fn get_active_credentials(conn: &Connection) -> Result<Vec<SellerAccountCredential>> {
    let sql = format!(
        "SELECT {} FROM seller_accounts WHERE is_active = 1 ORDER BY marketplace, account_name",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let credentials = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::migrations::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn credential(name: &str, active: bool) -> SellerAccountCredential {
        SellerAccountCredential {
            marketplace: MarketplaceKind::Ozon,
            account_name: name.to_string(),
            catalog_key: None,
            price_key: Some("key".into()),
            transaction_key: Some("key".into()),
            client_id: Some("42".into()),
            active,
        }
    }

    #[test]
    fn test_save_and_get_credential() {
        let conn = setup_db();
        save_credential(&conn, &credential("shop", true)).unwrap();

        let found = get_credential(&conn, MarketplaceKind::Ozon, "shop").unwrap().unwrap();
        assert_eq!(found.client_id.as_deref(), Some("42"));
        assert!(found.active);

        assert!(get_credential(&conn, MarketplaceKind::Wildberries, "shop").unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_and_active_filter() {
        let conn = setup_db();
        save_credential(&conn, &credential("a", true)).unwrap();
        save_credential(&conn, &credential("b", true)).unwrap();
        save_credential(&conn, &credential("b", false)).unwrap();

        let active = get_active_credentials(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].account_name, "a");
    }
}
