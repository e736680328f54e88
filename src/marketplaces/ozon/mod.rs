//! Ozon marketplace adapter

use crate::error::{AppError, Result};
use crate::marketplaces::flexible::{opt_f64, opt_i64};
use crate::marketplaces::http::{HttpSettings, MarketplaceHttp};
use crate::marketplaces::retry::RetryPolicy;
use crate::marketplaces::types::*;
use crate::marketplaces::{Capability, Marketplace, SellerAccountCredential};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://api-seller.ozon.ru";

const TRANSACTION_PAGE_SIZE: usize = 1000;

/// Safety stop for the transaction pager
const MAX_TRANSACTION_PAGES: u32 = 500;

// ============================================================================
// Ozon API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OzonPriceItem {
    #[serde(default, deserialize_with = "opt_i64")]
    product_id: Option<i64>,
    #[serde(default)]
    price: Option<OzonPrice>,
}

#[derive(Debug, Deserialize)]
struct OzonPrice {
    #[serde(default, deserialize_with = "opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    old_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    marketing_price: Option<f64>,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OzonImportResult {
    #[serde(default, deserialize_with = "opt_i64")]
    product_id: Option<i64>,
    #[serde(default)]
    updated: bool,
    #[serde(default)]
    errors: Vec<OzonImportError>,
}

#[derive(Debug, Deserialize)]
struct OzonImportError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// One operation of `/v3/finance/transaction/list`
#[derive(Debug, Default, Deserialize)]
struct OzonOperation {
    #[serde(default)]
    operation_type: Option<String>,
    #[serde(default)]
    operation_type_name: Option<String>,
    #[serde(default)]
    operation_date: Option<String>,
    #[serde(default, rename = "type")]
    transaction_type: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    accruals_for_sale: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    sale_commission: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    delivery_charge: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    accruals_for_sale_delivery: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    sale_commission_delivery: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    return_delivery_charge: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    accruals_for_sale_return: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    sale_commission_return: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    storage_fee: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    penalty: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    other_deductions: Option<f64>,
    #[serde(default)]
    posting: Option<OzonPosting>,
    #[serde(default)]
    items: Vec<OzonOperationItem>,
    #[serde(default)]
    services: Option<Vec<OzonService>>,
}

#[derive(Debug, Default, Deserialize)]
struct OzonPosting {
    #[serde(default)]
    order_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OzonOperationItem {
    #[serde(default, deserialize_with = "opt_i64")]
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OzonService {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    price: Option<f64>,
}

// ============================================================================
// Normalization
// ============================================================================

fn abs(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0).abs()
}

/// Absolute value of the first present, non-zero amount
fn first_abs(values: &[Option<f64>]) -> f64 {
    values
        .iter()
        .flatten()
        .copied()
        .find(|v| *v != 0.0)
        .map(f64::abs)
        .unwrap_or(0.0)
}

fn classify(op: &OzonOperation) -> OperationKind {
    let operation_type = op.operation_type.as_deref().unwrap_or("").to_lowercase();
    let transaction_type = op.transaction_type.as_deref().unwrap_or("").to_lowercase();

    match operation_type.as_str() {
        "operation" => return OperationKind::Sale,
        "delivery" => return OperationKind::Logistics,
        "services" => return OperationKind::Service,
        "other_deductions" => return OperationKind::Deduction,
        _ => {}
    }

    match transaction_type.as_str() {
        "orders" => OperationKind::Sale,
        "returns" => OperationKind::Return,
        "services" => OperationKind::Service,
        "transferdelivery" => OperationKind::Logistics,
        "compensation" | "other" => OperationKind::Deduction,
        _ => OperationKind::Other,
    }
}

enum ExpenseBucket {
    Storage,
    Penalty,
    Logistics,
}

fn bucket_for(name: &str) -> ExpenseBucket {
    let name = name.to_lowercase();
    if name.contains("хранен") || name.contains("storage") {
        ExpenseBucket::Storage
    } else if name.contains("штраф") || name.contains("penalty") {
        ExpenseBucket::Penalty
    } else {
        ExpenseBucket::Logistics
    }
}

fn add_to_bucket(tx: &mut SalesTransaction, bucket: ExpenseBucket, amount: f64) {
    match bucket {
        ExpenseBucket::Storage => tx.storage += amount,
        ExpenseBucket::Penalty => tx.penalty += amount,
        ExpenseBucket::Logistics => tx.logistics += amount,
    }
}

fn normalize_operation(op: OzonOperation) -> SalesTransaction {
    let kind = classify(&op);
    let order_date = op
        .posting
        .as_ref()
        .and_then(|p| p.order_date.as_deref())
        .and_then(parse_day);

    let operation_name = [op.operation_type_name.as_deref(), op.operation_type.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" / ");

    let mut tx = SalesTransaction {
        kind,
        operation_name,
        order_date,
        realization_date: op.operation_date.as_deref().and_then(parse_day),
        ..Default::default()
    };

    match kind {
        OperationKind::Sale => {
            tx.revenue = first_abs(&[op.accruals_for_sale, op.amount]);
            tx.commission_amount = abs(op.sale_commission);
            tx.quantity = op
                .items
                .iter()
                .map(|item| item.quantity.unwrap_or(0).max(0))
                .sum();
        }
        OperationKind::Logistics => {
            tx.logistics = first_abs(&[
                op.delivery_charge,
                op.accruals_for_sale_delivery,
                op.amount,
            ]) + abs(op.sale_commission_delivery);
        }
        OperationKind::Service => match &op.services {
            Some(services) => {
                for service in services {
                    let name = service.name.as_deref().unwrap_or("");
                    add_to_bucket(&mut tx, bucket_for(name), abs(service.price));
                }
            }
            None => tx.logistics += abs(op.amount),
        },
        OperationKind::Deduction => {
            let name = op.operation_type_name.as_deref().unwrap_or("");
            add_to_bucket(&mut tx, bucket_for(name), abs(op.amount));
        }
        OperationKind::Return | OperationKind::Other => {}
    }

    tx.return_amount += abs(op.return_delivery_charge)
        + abs(op.accruals_for_sale_return)
        + abs(op.sale_commission_return);
    tx.storage += abs(op.storage_fee);
    tx.penalty += abs(op.penalty) + abs(op.other_deductions);

    tx
}

fn observation_from(item: OzonPriceItem) -> Option<PriceObservation> {
    let external_id = u64::try_from(item.product_id?).ok()?;
    let price = item.price?;
    let list_price = price.price.filter(|p| *p > 0.0)?;
    let effective = price
        .marketing_price
        .filter(|p| *p > 0.0)
        .unwrap_or(list_price);

    let discount_percent = match price.old_price.filter(|p| *p > list_price) {
        Some(old) => (old - effective) / old * 100.0,
        None if effective < list_price => (list_price - effective) / list_price * 100.0,
        None => 0.0,
    };

    Some(PriceObservation {
        external_id,
        price: list_price,
        discounted_price: effective,
        discount_percent: (discount_percent * 100.0).round() / 100.0,
        currency: price
            .currency_code
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "RUB".to_string()),
    })
}

/// Items of a price response, either top-level or under `result`
fn price_items(body: Value) -> Result<Vec<Value>> {
    let items = body
        .get("items")
        .or_else(|| body.get("result").and_then(|r| r.get("items")))
        .cloned();

    match items {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None if body.is_null() => Ok(Vec::new()),
        _ => Err(AppError::MalformedResponse(
            "Ozon price list has no items array".to_string(),
        )),
    }
}

/// Day keys of `/v1/analytics/data`: `{dimensions:[{id}], metrics:[n]}`
fn delivered_units(body: &Value) -> BTreeMap<NaiveDate, i64> {
    let mut units = BTreeMap::new();
    let rows = body
        .get("result")
        .and_then(|r| r.get("data"))
        .and_then(Value::as_array);

    for row in rows.into_iter().flatten() {
        let day = row
            .get("dimensions")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .and_then(parse_day);
        let value = row
            .get("metrics")
            .and_then(|m| m.get(0))
            .and_then(Value::as_f64);

        if let (Some(day), Some(value)) = (day, value) {
            *units.entry(day).or_insert(0) += value.max(0.0).round() as i64;
        }
    }

    units
}

// ============================================================================
// Client
// ============================================================================

/// Ozon Seller API adapter
pub struct OzonClient {
    http: MarketplaceHttp,
    base_url: String,
}

impl OzonClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        Self::with_base_url(settings, BASE_URL)
    }

    /// Point the adapter at another host (used by tests)
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: MarketplaceHttp::new(settings)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(
        &self,
        credential: &SellerAccountCredential,
        capability: Capability,
        endpoint: &str,
        label: &str,
        policy: &RetryPolicy,
        body: &Value,
    ) -> Result<Value> {
        let api_key = credential.key(capability)?;
        let client_id = credential.require_client_id()?;
        let url = format!("{}{}", self.base_url, endpoint);

        self.http
            .send_json(&credential.account_name, label, policy, |client| {
                with_auth(client.post(&url), client_id, api_key).json(body)
            })
            .await
    }
}

fn with_auth(builder: RequestBuilder, client_id: &str, api_key: &str) -> RequestBuilder {
    builder.header("Client-Id", client_id).header("Api-Key", api_key)
}

#[async_trait]
impl Marketplace for OzonClient {
    fn kind(&self) -> MarketplaceKind {
        MarketplaceKind::Ozon
    }

    fn name(&self) -> &'static str {
        "Ozon"
    }

    fn http(&self) -> &MarketplaceHttp {
        &self.http
    }

    async fn fetch_price_chunk(
        &self,
        credential: &SellerAccountCredential,
        external_ids: &[u64],
    ) -> Result<Vec<PriceObservation>> {
        let ids: Vec<String> = external_ids.iter().map(u64::to_string).collect();
        let body = json!({
            "filter": { "product_id": ids, "visibility": "ALL" },
            "limit": external_ids.len().min(1000),
            "cursor": ""
        });

        let response = self
            .post(
                credential,
                Capability::Prices,
                "/v5/product/info/prices",
                "Ozon price list",
                self.http.retry(),
                &body,
            )
            .await?;

        let requested: HashSet<u64> = external_ids.iter().copied().collect();
        let mut observations = Vec::new();

        for item in price_items(response)? {
            match serde_json::from_value::<OzonPriceItem>(item) {
                Ok(item) => match observation_from(item) {
                    Some(obs) if requested.contains(&obs.external_id) => observations.push(obs),
                    Some(_) => {}
                    None => debug!(account = %credential.account_name, "Ozon item without a usable price"),
                },
                Err(e) => {
                    warn!(account = %credential.account_name, error = %e, "Skipping unparseable Ozon price item")
                }
            }
        }

        Ok(observations)
    }

    async fn fetch_transactions(
        &self,
        credential: &SellerAccountCredential,
        range: DateRange,
    ) -> Result<Vec<SalesTransaction>> {
        let from = format!("{}T00:00:00Z", range.from.format("%Y-%m-%d"));
        let to = format!("{}T23:59:59Z", range.to.format("%Y-%m-%d"));
        let mut transactions = Vec::new();

        for page in 1..=MAX_TRANSACTION_PAGES {
            if page > 1 {
                self.http.pacer().wait_turn().await;
            }

            let body = json!({
                "filter": {
                    "date": { "from": from, "to": to },
                    "operation_type": [],
                    "posting_number": "",
                    "transaction_type": "all"
                },
                "page": page,
                "page_size": TRANSACTION_PAGE_SIZE
            });

            let response = self
                .post(
                    credential,
                    Capability::Transactions,
                    "/v3/finance/transaction/list",
                    "Ozon transaction list",
                    self.http.retry(),
                    &body,
                )
                .await?;

            let operations = match response.get("result").and_then(|r| r.get("operations")) {
                Some(ops) if ops.is_array() => ops.clone(),
                None if response.is_null() => Value::Array(Vec::new()),
                _ => {
                    return Err(AppError::MalformedResponse(
                        "Ozon transaction list has no result.operations".to_string(),
                    ))
                }
            };
            let operations: Vec<OzonOperation> = serde_json::from_value(operations)
                .map_err(|e| AppError::MalformedResponse(format!("Ozon transaction list: {}", e)))?;

            let count = operations.len();
            transactions.extend(operations.into_iter().map(normalize_operation));

            if count < TRANSACTION_PAGE_SIZE {
                info!(
                    account = %credential.account_name,
                    pages = page,
                    operations = transactions.len(),
                    "Ozon transactions fetched"
                );
                return Ok(transactions);
            }
        }

        warn!(
            account = %credential.account_name,
            pages = MAX_TRANSACTION_PAGES,
            "Ozon transaction pager stopped at the page limit"
        );
        Ok(transactions)
    }

    async fn submit_price_update(
        &self,
        credential: &SellerAccountCredential,
        batch: &[PriceUpdate],
    ) -> Result<UpdateTaskHandle> {
        if batch.is_empty() {
            return Err(AppError::Validation("Price update batch is empty".to_string()));
        }

        let prices: Vec<Value> = batch
            .iter()
            .map(|u| {
                json!({
                    "product_id": u.external_id,
                    "price": format!("{:.2}", u.price),
                    "old_price": "0"
                })
            })
            .collect();
        let body = json!({ "prices": prices });

        let response = self
            .post(
                credential,
                Capability::Prices,
                "/v1/product/import/prices",
                "Ozon price import",
                &RetryPolicy::no_retry(),
                &body,
            )
            .await?;

        let results: Vec<OzonImportResult> = match response.get("result") {
            Some(result) => serde_json::from_value(result.clone())
                .map_err(|e| AppError::MalformedResponse(format!("Ozon price import: {}", e)))?,
            None => {
                return Err(AppError::MalformedResponse(
                    "Ozon price import response has no result".to_string(),
                ))
            }
        };

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for result in results {
            let Some(id) = result.product_id.and_then(|id| u64::try_from(id).ok()) else {
                continue;
            };
            if result.updated {
                accepted.push(id);
            } else {
                let reason = result
                    .errors
                    .iter()
                    .map(|e| {
                        e.message
                            .clone()
                            .or_else(|| e.code.clone())
                            .unwrap_or_else(|| "rejected".to_string())
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                rejected.push((id, if reason.is_empty() { "rejected".to_string() } else { reason }));
            }
        }

        let status = match (accepted.is_empty(), rejected.is_empty()) {
            (false, true) => "completed",
            (false, false) => "partial",
            (true, false) => "rejected",
            (true, true) => "empty",
        };

        Ok(UpdateTaskHandle {
            task_id: format!("ozon-{}", uuid::Uuid::new_v4()),
            status: status.to_string(),
            accepted,
            rejected,
            submitted: batch
                .iter()
                .map(|u| PriceUpdate {
                    price: (u.price * 100.0).round() / 100.0,
                    ..u.clone()
                })
                .collect(),
        })
    }

    async fn fetch_delivered_units(
        &self,
        credential: &SellerAccountCredential,
        range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, i64>> {
        let body = json!({
            "date_from": range.from.format("%Y-%m-%d").to_string(),
            "date_to": range.to.format("%Y-%m-%d").to_string(),
            "dimension": ["day"],
            "metrics": ["delivered_units"],
            "limit": 1000,
            "offset": 0
        });

        let response = self
            .post(
                credential,
                Capability::Transactions,
                "/v1/analytics/data",
                "Ozon analytics",
                self.http.retry(),
                &body,
            )
            .await?;

        Ok(delivered_units(&response))
    }
}
