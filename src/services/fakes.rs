//! In-memory marketplace and sink used by the service tests

use crate::config::AppConfig;
use crate::db::sqlite::SqliteDb;
use crate::error::{AppError, Result};
use crate::marketplaces::http::{HttpSettings, MarketplaceHttp};
use crate::marketplaces::types::{
    DateRange, MarketplaceKind, PriceObservation, PriceUpdate, SalesTransaction, UpdateTaskHandle,
};
use crate::marketplaces::{Marketplace, MarketplaceRegistry, SellerAccountCredential};
use crate::notify::{NotificationSink, PriceAlert};
use crate::state::AppState;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeMarketplace {
    pub kind: MarketplaceKind,
    http: MarketplaceHttp,
    pub prices: HashMap<u64, f64>,
    /// Accounts whose key has no price scope
    pub denied_accounts: HashSet<String>,
    /// Accounts whose key has no statistics scope
    pub denied_transactions: HashSet<String>,
    pub transactions: Vec<SalesTransaction>,
    pub delivered_units: BTreeMap<NaiveDate, i64>,
    pub rejected_ids: HashSet<u64>,
    /// Prices the provider stores instead of the requested ones
    pub adjusted_prices: HashMap<u64, f64>,
    pub fail_transactions: bool,
    pub fail_submit: bool,
    pub submitted: Mutex<Vec<Vec<PriceUpdate>>>,
    /// Adapter calls in the order they were made
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeMarketplace {
    pub fn new(kind: MarketplaceKind) -> Self {
        let settings = HttpSettings {
            batch_delay: Duration::ZERO,
            ..Default::default()
        };
        Self {
            kind,
            http: MarketplaceHttp::new(&settings).unwrap(),
            prices: HashMap::new(),
            denied_accounts: HashSet::new(),
            denied_transactions: HashSet::new(),
            transactions: Vec::new(),
            delivered_units: BTreeMap::new(),
            rejected_ids: HashSet::new(),
            adjusted_prices: HashMap::new(),
            fail_transactions: false,
            fail_submit: false,
            submitted: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_price(mut self, external_id: u64, price: f64) -> Self {
        self.prices.insert(external_id, price);
        self
    }

    pub fn submissions(&self) -> Vec<Vec<PriceUpdate>> {
        self.submitted.lock().clone()
    }

    pub fn call_order(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Marketplace for FakeMarketplace {
    fn kind(&self) -> MarketplaceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "Fake"
    }

    fn http(&self) -> &MarketplaceHttp {
        &self.http
    }

    async fn fetch_price_chunk(
        &self,
        credential: &SellerAccountCredential,
        external_ids: &[u64],
    ) -> Result<Vec<PriceObservation>> {
        self.calls.lock().push("prices");
        if self.denied_accounts.contains(&credential.account_name) {
            return Err(AppError::PermissionScope {
                account: credential.account_name.clone(),
                message: "token has no access to prices".to_string(),
            });
        }

        Ok(external_ids
            .iter()
            .filter_map(|id| {
                self.prices.get(id).map(|price| PriceObservation {
                    external_id: *id,
                    price: *price,
                    discounted_price: *price,
                    discount_percent: 0.0,
                    currency: "RUB".to_string(),
                })
            })
            .collect())
    }

    async fn fetch_transactions(
        &self,
        credential: &SellerAccountCredential,
        _range: DateRange,
    ) -> Result<Vec<SalesTransaction>> {
        self.calls.lock().push("transactions");
        if self.denied_transactions.contains(&credential.account_name) {
            return Err(AppError::PermissionScope {
                account: credential.account_name.clone(),
                message: "token has no statistics scope".to_string(),
            });
        }
        if self.fail_transactions {
            return Err(AppError::MalformedResponse("report body is not JSON".to_string()));
        }
        Ok(self.transactions.clone())
    }

    async fn submit_price_update(
        &self,
        _credential: &SellerAccountCredential,
        batch: &[PriceUpdate],
    ) -> Result<UpdateTaskHandle> {
        self.calls.lock().push("submit");
        if self.fail_submit {
            return Err(AppError::transient("upload endpoint unavailable"));
        }
        self.submitted.lock().push(batch.to_vec());

        let (rejected, accepted): (Vec<&PriceUpdate>, Vec<&PriceUpdate>) = batch
            .iter()
            .partition(|update| self.rejected_ids.contains(&update.external_id));

        Ok(UpdateTaskHandle {
            task_id: format!("task-{}", self.submitted.lock().len()),
            status: if rejected.is_empty() { "completed" } else { "partial" }.to_string(),
            accepted: accepted.iter().map(|u| u.external_id).collect(),
            rejected: rejected
                .iter()
                .map(|u| (u.external_id, "price out of allowed range".to_string()))
                .collect(),
            submitted: batch
                .iter()
                .map(|u| PriceUpdate {
                    price: self.adjusted_prices.get(&u.external_id).copied().unwrap_or(u.price),
                    ..u.clone()
                })
                .collect(),
        })
    }

    async fn fetch_delivered_units(
        &self,
        _credential: &SellerAccountCredential,
        _range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, i64>> {
        Ok(self.delivered_units.clone())
    }
}

/// Sink that keeps every alert
#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<PriceAlert>>,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, alert: &PriceAlert) -> Result<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

pub fn credential(kind: MarketplaceKind, account: &str) -> SellerAccountCredential {
    SellerAccountCredential {
        marketplace: kind,
        account_name: account.to_string(),
        catalog_key: Some("catalog".to_string()),
        price_key: Some("prices".to_string()),
        transaction_key: Some("stats".to_string()),
        client_id: Some("42".to_string()),
        active: true,
    }
}

/// State over an in-memory database with the given adapters
pub fn state_with(
    marketplaces: Vec<Arc<FakeMarketplace>>,
    config: AppConfig,
) -> (AppState, Arc<SqliteDb>, Arc<RecordingNotifier>) {
    let db = Arc::new(SqliteDb::open_in_memory().unwrap());

    let mut registry = MarketplaceRegistry::empty();
    for marketplace in marketplaces {
        registry.register(marketplace);
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = AppState::with_sqlite(config, db.clone(), Arc::new(registry));
    state.notifier = notifier.clone();

    (state, db, notifier)
}
