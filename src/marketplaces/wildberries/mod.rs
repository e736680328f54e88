//! Wildberries marketplace adapter

use crate::error::{AppError, Result};
use crate::marketplaces::flexible::{opt_f64, opt_i64};
use crate::marketplaces::http::{HttpSettings, MarketplaceHttp};
use crate::marketplaces::retry::RetryPolicy;
use crate::marketplaces::types::*;
use crate::marketplaces::{Capability, Marketplace, SellerAccountCredential};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{info, warn};

const PRICES_BASE_URL: &str = "https://discounts-prices-api.wildberries.ru";
const STATISTICS_BASE_URL: &str = "https://statistics-api.wildberries.ru";

/// Rows per report request; the report is requested in one call
const REPORT_LIMIT: u32 = 100_000;

// ============================================================================
// Wildberries API Response Types
// ============================================================================

/// One entry of `listGoods`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WbGoods {
    #[serde(rename = "nmID", alias = "nmId", alias = "nm_id", default, deserialize_with = "opt_i64")]
    nm_id: Option<i64>,
    #[serde(default, deserialize_with = "opt_f64")]
    price: Option<f64>,
    #[serde(default, alias = "discountedPrice", deserialize_with = "opt_f64")]
    price_with_discount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    base_price: Option<f64>,
    #[serde(default, alias = "discountPercent", deserialize_with = "opt_f64")]
    discount: Option<f64>,
    #[serde(default)]
    sizes: Vec<WbSize>,
    #[serde(default)]
    editable_size_price: Option<Value>,
    #[serde(
        default,
        rename = "currencyIsoCode4217",
        alias = "currencyCode",
        alias = "currency_code"
    )]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WbSize {
    #[serde(default, deserialize_with = "opt_f64")]
    price: Option<f64>,
    #[serde(default, alias = "discountedPrice", deserialize_with = "opt_f64")]
    price_with_discount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    base_price: Option<f64>,
}

/// One row of `reportDetailByPeriod`
#[derive(Debug, Default, Deserialize)]
struct WbReportRow {
    #[serde(default)]
    doc_type_name: Option<String>,
    #[serde(default)]
    supplier_oper_name: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    quantity: Option<i64>,
    #[serde(default, deserialize_with = "opt_f64")]
    retail_amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    retail_price_withdisc_rub: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    commission_percent: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    delivery_rub: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    dlv_prc: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    return_amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    storage_fee: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    penalty: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    ppvz_spp_prc: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    ppvz_kvw_prc_base: Option<f64>,
    #[serde(default)]
    order_dt: Option<String>,
    #[serde(default)]
    rr_dt: Option<String>,
}

// ============================================================================
// Normalization
// ============================================================================

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// First value that is present and non-zero
fn first_nonzero(values: &[Option<f64>]) -> f64 {
    values
        .iter()
        .flatten()
        .copied()
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

/// Locate the goods array in any of the three response layouts
fn goods_list(body: Value) -> Result<Vec<Value>> {
    if body.get("error").and_then(Value::as_bool) == Some(true) {
        let text = body
            .get("errorText")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AppError::Marketplace(format!("Wildberries price list: {}", text)));
    }

    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(Value::Object(mut data)) = map.remove("data") {
                if let Some(Value::Array(items)) = data.remove("listGoods") {
                    return Ok(items);
                }
            }
            if let Some(Value::Array(items)) = map.remove("listGoods") {
                return Ok(items);
            }
            Err(AppError::MalformedResponse(
                "Wildberries price list has no listGoods array".to_string(),
            ))
        }
        other => Err(AppError::MalformedResponse(format!(
            "Wildberries price list is not an object: {}",
            other
        ))),
    }
}

/// Build an observation; `None` when no positive price could be found
fn observation_from(goods: WbGoods) -> Option<PriceObservation> {
    let external_id = u64::try_from(goods.nm_id?).ok()?;
    let discount = goods.discount.unwrap_or(0.0).max(0.0);

    let mut discounted = None;
    let mut price = positive(goods.price);
    if price.is_none() {
        if let Some(p) = positive(goods.price_with_discount) {
            price = Some(p);
            discounted = Some(p);
        }
    }
    if price.is_none() {
        price = positive(goods.base_price);
    }
    if price.is_none() {
        if let Some(size) = goods.sizes.first() {
            price = positive(size.price);
            if price.is_none() {
                if let Some(p) = positive(size.price_with_discount) {
                    price = Some(p);
                    discounted = Some(p);
                }
            }
            if price.is_none() {
                price = positive(size.base_price);
            }
        }
    }
    if price.is_none() {
        price = match &goods.editable_size_price {
            Some(Value::Number(n)) => n.as_f64().filter(|v| *v > 0.0),
            Some(Value::Object(obj)) => obj.get("price").and_then(Value::as_f64).filter(|v| *v > 0.0),
            _ => None,
        };
    }

    let price = price?;
    let discounted_price = discounted.unwrap_or(if discount > 0.0 {
        price * (1.0 - discount / 100.0)
    } else {
        price
    });

    Some(PriceObservation {
        external_id,
        price,
        discounted_price,
        discount_percent: discount,
        currency: goods
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "RUB".to_string()),
    })
}

fn normalize_report_row(row: WbReportRow) -> SalesTransaction {
    let quantity = row.quantity.unwrap_or(0);
    let revenue = first_nonzero(&[row.retail_amount, row.retail_price_withdisc_rub]);
    let logistics = first_nonzero(&[row.delivery_rub, row.dlv_prc]);

    let kind = if quantity != 0 || revenue != 0.0 {
        OperationKind::Sale
    } else if logistics != 0.0 {
        OperationKind::Logistics
    } else {
        OperationKind::Deduction
    };

    let operation_name = [row.doc_type_name.as_deref(), row.supplier_oper_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" / ");

    SalesTransaction {
        kind,
        operation_name,
        quantity,
        revenue,
        commission_percent: positive(row.commission_percent),
        commission_amount: 0.0,
        logistics,
        storage: row.storage_fee.unwrap_or(0.0),
        penalty: row.penalty.unwrap_or(0.0),
        return_amount: row.return_amount.unwrap_or(0.0),
        surcharge: row.ppvz_spp_prc.unwrap_or(0.0) + row.ppvz_kvw_prc_base.unwrap_or(0.0),
        order_date: row.order_dt.as_deref().and_then(parse_day),
        realization_date: row.rr_dt.as_deref().and_then(parse_day),
    }
}

/// Task id from `{data:{id}}`, `{taskId}` or `{id}`
fn task_id(body: &Value) -> Option<String> {
    let candidates = [
        body.get("data").and_then(|d| d.get("id")),
        body.get("taskId"),
        body.get("id"),
    ];
    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Nearest whole-rouble price inside `[ceil(min), floor(max)]`
fn whole_rouble_price(update: &PriceUpdate) -> Option<i64> {
    let low = update.min_price.min(update.price).ceil();
    let high = update.max_price.max(update.price).floor();
    if !update.price.is_finite() || low > high {
        return None;
    }
    Some(update.price.round().clamp(low, high) as i64)
}

// ============================================================================
// Client
// ============================================================================

/// Wildberries adapter
pub struct WildberriesClient {
    http: MarketplaceHttp,
    prices_base_url: String,
    statistics_base_url: String,
}

impl WildberriesClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        Self::with_base_urls(settings, PRICES_BASE_URL, STATISTICS_BASE_URL)
    }

    /// Point the adapter at other hosts (used by tests)
    pub fn with_base_urls(
        settings: &HttpSettings,
        prices_base_url: &str,
        statistics_base_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            http: MarketplaceHttp::new(settings)?,
            prices_base_url: prices_base_url.trim_end_matches('/').to_string(),
            statistics_base_url: statistics_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Marketplace for WildberriesClient {
    fn kind(&self) -> MarketplaceKind {
        MarketplaceKind::Wildberries
    }

    fn name(&self) -> &'static str {
        "Wildberries"
    }

    fn http(&self) -> &MarketplaceHttp {
        &self.http
    }

    async fn fetch_price_chunk(
        &self,
        credential: &SellerAccountCredential,
        external_ids: &[u64],
    ) -> Result<Vec<PriceObservation>> {
        let key = credential.key(Capability::Prices)?;
        let url = format!("{}/api/v2/list/goods/filter", self.prices_base_url);
        let body = json!({ "nmList": external_ids });

        let response = self
            .http
            .send_json(
                &credential.account_name,
                "Wildberries price list",
                self.http.retry(),
                |client| client.post(&url).header(AUTHORIZATION, key).json(&body),
            )
            .await?;

        let requested: HashSet<u64> = external_ids.iter().copied().collect();
        let mut observations = Vec::new();

        for item in goods_list(response)? {
            let goods: WbGoods = match serde_json::from_value(item) {
                Ok(goods) => goods,
                Err(e) => {
                    warn!(account = %credential.account_name, error = %e, "Skipping unparseable Wildberries goods entry");
                    continue;
                }
            };
            match observation_from(goods) {
                Some(obs) if requested.contains(&obs.external_id) => observations.push(obs),
                Some(_) => {}
                None => warn!(account = %credential.account_name, "Wildberries goods entry without a positive price"),
            }
        }

        Ok(observations)
    }

    async fn fetch_transactions(
        &self,
        credential: &SellerAccountCredential,
        range: DateRange,
    ) -> Result<Vec<SalesTransaction>> {
        let key = credential.key(Capability::Transactions)?;
        let url = format!(
            "{}/api/v5/supplier/reportDetailByPeriod",
            self.statistics_base_url
        );
        let date_from = range.from.format("%Y-%m-%d").to_string();
        let date_to = range.to.format("%Y-%m-%d").to_string();
        let limit = REPORT_LIMIT.to_string();

        let response = self
            .http
            .send_json(
                &credential.account_name,
                "Wildberries sales report",
                self.http.retry(),
                |client| {
                    client.get(&url).header(AUTHORIZATION, key).query(&[
                        ("dateFrom", date_from.as_str()),
                        ("dateTo", date_to.as_str()),
                        ("limit", limit.as_str()),
                        ("rrdid", "0"),
                    ])
                },
            )
            .await?;

        let rows: Vec<WbReportRow> = match response {
            Value::Null => Vec::new(),
            Value::Array(_) => serde_json::from_value(response).map_err(|e| {
                AppError::MalformedResponse(format!("Wildberries sales report: {}", e))
            })?,
            other => {
                return Err(AppError::MalformedResponse(format!(
                    "Wildberries sales report is not an array: {}",
                    other
                )))
            }
        };

        info!(
            account = %credential.account_name,
            rows = rows.len(),
            from = %range.from,
            to = %range.to,
            "Wildberries sales report fetched"
        );

        Ok(rows.into_iter().map(normalize_report_row).collect())
    }

    async fn submit_price_update(
        &self,
        credential: &SellerAccountCredential,
        batch: &[PriceUpdate],
    ) -> Result<UpdateTaskHandle> {
        if batch.is_empty() {
            return Err(AppError::Validation("Price update batch is empty".to_string()));
        }
        let key = credential.key(Capability::Prices)?;
        let url = format!("{}/api/v2/upload/task", self.prices_base_url);

        // Wildberries accepts whole roubles only
        let mut submitted = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        for update in batch {
            match whole_rouble_price(update) {
                Some(price) => submitted.push(PriceUpdate {
                    price: price as f64,
                    ..update.clone()
                }),
                None => {
                    warn!(
                        account = %credential.account_name,
                        nm_id = update.external_id,
                        min = update.min_price,
                        max = update.max_price,
                        "No whole-rouble price within bounds"
                    );
                    rejected.push((
                        update.external_id,
                        format!(
                            "no whole-rouble price between {} and {}",
                            update.min_price, update.max_price
                        ),
                    ));
                }
            }
        }

        if submitted.is_empty() {
            return Ok(UpdateTaskHandle {
                task_id: String::new(),
                status: "rejected".to_string(),
                accepted: Vec::new(),
                rejected,
                submitted,
            });
        }

        let data: Vec<Value> = submitted
            .iter()
            .map(|u| json!({ "nmID": u.external_id, "price": u.price as i64, "discount": 0 }))
            .collect();
        let body = json!({ "data": data });

        let response = self
            .http
            .send_json(
                &credential.account_name,
                "Wildberries price upload",
                &RetryPolicy::no_retry(),
                |client| client.post(&url).header(AUTHORIZATION, key).json(&body),
            )
            .await?;

        if response.get("error").and_then(Value::as_bool) == Some(true) {
            let text = response
                .get("errorText")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(AppError::Marketplace(format!(
                "Wildberries price upload rejected: {}",
                text
            )));
        }

        let task_id = task_id(&response).unwrap_or_default();
        if task_id.is_empty() {
            warn!(account = %credential.account_name, "Wildberries price upload returned no task id");
        }

        Ok(UpdateTaskHandle {
            task_id,
            status: response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("processing")
                .to_string(),
            accepted: submitted.iter().map(|u| u.external_id).collect(),
            rejected,
            submitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use std::time::Duration;

    fn settings() -> HttpSettings {
        HttpSettings {
            batch_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn credential() -> SellerAccountCredential {
        SellerAccountCredential {
            marketplace: MarketplaceKind::Wildberries,
            account_name: "main".into(),
            catalog_key: None,
            price_key: Some("price-token".into()),
            transaction_key: Some("stats-token".into()),
            client_id: None,
            active: true,
        }
    }

    #[test]
    fn test_price_fallback_chain() {
        let goods: WbGoods = serde_json::from_value(json!({
            "nmID": 11, "discount": 20, "sizes": [{"price": 1000}]
        }))
        .unwrap();
        let obs = observation_from(goods).unwrap();
        assert_eq!(obs.price, 1000.0);
        assert_eq!(obs.discounted_price, 800.0);
        assert_eq!(obs.currency, "RUB");

        let goods: WbGoods = serde_json::from_value(json!({
            "nmId": "12", "editableSizePrice": {"price": 550}
        }))
        .unwrap();
        assert_eq!(observation_from(goods).unwrap().effective_price(), 550.0);

        let goods: WbGoods = serde_json::from_value(json!({
            "nm_id": 13, "priceWithDiscount": 700, "discount": 30
        }))
        .unwrap();
        let obs = observation_from(goods).unwrap();
        assert_eq!(obs.price, 700.0);
        assert_eq!(obs.discounted_price, 700.0);

        let goods: WbGoods = serde_json::from_value(json!({"nmID": 14, "price": 0})).unwrap();
        assert!(observation_from(goods).is_none());
    }

    #[test]
    fn test_goods_list_layouts() {
        let nested = json!({"data": {"listGoods": [{"nmID": 1}]}, "error": false});
        assert_eq!(goods_list(nested).unwrap().len(), 1);
        assert_eq!(goods_list(json!({"listGoods": [{}, {}]})).unwrap().len(), 2);
        assert_eq!(goods_list(json!([{}])).unwrap().len(), 1);
        assert!(matches!(
            goods_list(json!({"unexpected": true})),
            Err(AppError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_report_row_normalization() {
        let row: WbReportRow = serde_json::from_value(json!({
            "doc_type_name": "Продажа",
            "supplier_oper_name": "Продажа",
            "quantity": 2,
            "retail_amount": 0,
            "retail_price_withdisc_rub": 1000,
            "commission_percent": 15,
            "delivery_rub": 0,
            "dlv_prc": 50,
            "ppvz_spp_prc": 3,
            "ppvz_kvw_prc_base": 2,
            "order_dt": "2024-01-10T12:00:00",
            "rr_dt": "2024-01-15"
        }))
        .unwrap();
        let tx = normalize_report_row(row);
        assert_eq!(tx.kind, OperationKind::Sale);
        assert_eq!(tx.operation_name, "Продажа / Продажа");
        assert_eq!(tx.revenue, 1000.0);
        assert_eq!(tx.logistics, 50.0);
        assert_eq!(tx.surcharge, 5.0);
        assert_eq!(tx.commission_percent, Some(15.0));
        assert_eq!(tx.realization_date, NaiveDate::from_ymd_opt(2024, 1, 15));

        let logistics_only = normalize_report_row(WbReportRow {
            delivery_rub: Some(80.0),
            rr_dt: Some("2024-01-15".into()),
            ..Default::default()
        });
        assert_eq!(logistics_only.kind, OperationKind::Logistics);
    }

    #[tokio::test]
    async fn test_fetch_prices_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/list/goods/filter")
            .match_header("authorization", "price-token")
            .match_body(Matcher::PartialJson(json!({"nmList": [101, 102, 103]})))
            .with_status(200)
            .with_body(
                json!({
                    "data": {"listGoods": [
                        {"nmID": 101, "sizes": [{"price": 1200, "discountedPrice": 960}], "discount": 20},
                        {"nmID": 102, "price": 500, "discount": 0, "currencyIsoCode4217": "RUB"}
                    ]},
                    "error": false,
                    "errorText": ""
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = WildberriesClient::with_base_urls(&settings(), &server.url(), &server.url()).unwrap();
        let fetch = client.fetch_prices(&credential(), &[101, 102, 103]).await.unwrap();

        mock.assert_async().await;
        assert!(!fetch.is_partial());
        assert_eq!(fetch.observations.len(), 2);
        let first = fetch.observations.iter().find(|o| o.external_id == 101).unwrap();
        assert_eq!(first.effective_price(), 960.0);
        // 103 is simply absent
        assert!(fetch.observations.iter().all(|o| o.external_id != 103));
    }

    #[tokio::test]
    async fn test_scope_error_is_permission_scope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/list/goods/filter")
            .with_status(401)
            .with_body(r#"{"title":"unauthorized","detail":"token scope not allowed"}"#)
            .create_async()
            .await;

        let client = WildberriesClient::with_base_urls(&settings(), &server.url(), &server.url()).unwrap();
        let result = client.fetch_prices(&credential(), &[1]).await;

        match result {
            Err(AppError::PermissionScope { account, message }) => {
                assert_eq!(account, "main");
                assert!(message.contains("token scope not allowed"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_transactions_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5/supplier/reportDetailByPeriod")
            .match_header("authorization", "stats-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("dateFrom".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("dateTo".into(), "2024-01-31".into()),
                Matcher::UrlEncoded("limit".into(), "100000".into()),
                Matcher::UrlEncoded("rrdid".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([
                    {"doc_type_name": "Продажа", "quantity": 1, "retail_amount": 700, "rr_dt": "2024-01-15"},
                    {"doc_type_name": "Возврат", "quantity": 1, "retail_amount": 700, "rr_dt": "2024-01-15"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = WildberriesClient::with_base_urls(&settings(), &server.url(), &server.url()).unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let rows = client.fetch_transactions(&credential(), range).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].operation_name, "Возврат");
    }

    #[tokio::test]
    async fn test_submit_rounds_prices_and_reads_task_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/upload/task")
            .match_body(Matcher::Json(json!({
                "data": [{"nmID": 101, "price": 800, "discount": 0}]
            })))
            .with_status(200)
            .with_body(r#"{"data":{"id":4242,"alreadyExists":false},"error":false,"errorText":""}"#)
            .expect(1)
            .create_async()
            .await;

        let client = WildberriesClient::with_base_urls(&settings(), &server.url(), &server.url()).unwrap();
        let handle = client
            .submit_price_update(
                &credential(),
                &[PriceUpdate {
                    external_id: 101,
                    price: 799.6,
                    min_price: 500.0,
                    max_price: 1000.0,
                }],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(handle.task_id, "4242");
        assert_eq!(handle.accepted, vec![101]);
        assert_eq!(handle.submitted_price(101), Some(800.0));
    }

    #[test]
    fn test_whole_rouble_price_stays_within_bounds() {
        let update = |price: f64, min: f64, max: f64| PriceUpdate {
            external_id: 1,
            price,
            min_price: min,
            max_price: max,
        };

        assert_eq!(whole_rouble_price(&update(500.4, 500.4, 1000.0)), Some(501));
        assert_eq!(whole_rouble_price(&update(999.6, 500.0, 999.6)), Some(999));
        assert_eq!(whole_rouble_price(&update(750.5, 500.0, 1000.0)), Some(751));
        assert_eq!(whole_rouble_price(&update(500.2, 500.1, 500.9)), None);
    }

    #[tokio::test]
    async fn test_submit_rounds_toward_the_minimum_bound() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/upload/task")
            .match_body(Matcher::Json(json!({
                "data": [{"nmID": 101, "price": 501, "discount": 0}]
            })))
            .with_status(200)
            .with_body(r#"{"data":{"id":77},"error":false}"#)
            .expect(1)
            .create_async()
            .await;

        let client = WildberriesClient::with_base_urls(&settings(), &server.url(), &server.url()).unwrap();
        let handle = client
            .submit_price_update(
                &credential(),
                &[
                    PriceUpdate {
                        external_id: 101,
                        price: 500.4,
                        min_price: 500.4,
                        max_price: 1000.0,
                    },
                    PriceUpdate {
                        external_id: 102,
                        price: 500.2,
                        min_price: 500.1,
                        max_price: 500.9,
                    },
                ],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(handle.accepted, vec![101]);
        assert_eq!(handle.submitted_price(101), Some(501.0));
        assert_eq!(handle.rejected.len(), 1);
        assert_eq!(handle.rejected[0].0, 102);
    }

    #[tokio::test]
    async fn test_missing_transaction_key_fails_before_network() {
        let client = WildberriesClient::with_base_urls(&settings(), "http://127.0.0.1:9", "http://127.0.0.1:9").unwrap();
        let mut cred = credential();
        cred.transaction_key = None;
        let range = DateRange::last_days(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), 7);

        let result = client.fetch_transactions(&cred, range).await;
        assert!(matches!(result, Err(AppError::NotConfigured(_))));
    }
}
