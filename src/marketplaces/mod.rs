//! Marketplace adapters module

pub mod flexible;
pub mod http;
pub mod ozon;
pub mod rate_limiter;
pub mod retry;
pub mod types;
pub mod wildberries;

use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use http::{HttpSettings, MarketplaceHttp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use types::*;

/// What a scoped API key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Catalog,
    Prices,
    Transactions,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Catalog => "catalog",
            Capability::Prices => "prices",
            Capability::Transactions => "transactions",
        }
    }
}

/// Seller account credential with capability-scoped keys
#[derive(Clone, Serialize, Deserialize)]
pub struct SellerAccountCredential {
    pub marketplace: MarketplaceKind,
    pub account_name: String,
    pub catalog_key: Option<String>,
    pub price_key: Option<String>,
    pub transaction_key: Option<String>,
    /// Ozon seller id, sent as `Client-Id`
    pub client_id: Option<String>,
    pub active: bool,
}

impl SellerAccountCredential {
    /// Key for `capability`, or `NotConfigured` when it is missing or blank
    pub fn key(&self, capability: Capability) -> Result<&str> {
        let key = match capability {
            Capability::Catalog => self.catalog_key.as_deref(),
            Capability::Prices => self.price_key.as_deref(),
            Capability::Transactions => self.transaction_key.as_deref(),
        };

        key.map(str::trim).filter(|k| !k.is_empty()).ok_or_else(|| {
            AppError::NotConfigured(format!(
                "{} account '{}' has no {} key",
                self.marketplace,
                self.account_name,
                capability.as_str()
            ))
        })
    }

    /// Ozon client id, or `NotConfigured`
    pub fn require_client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                AppError::NotConfigured(format!(
                    "{} account '{}' has no client id",
                    self.marketplace, self.account_name
                ))
            })
    }
}

fn mask(key: &Option<String>) -> &'static str {
    match key {
        Some(k) if !k.trim().is_empty() => "***",
        _ => "<none>",
    }
}

impl fmt::Debug for SellerAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SellerAccountCredential")
            .field("marketplace", &self.marketplace)
            .field("account_name", &self.account_name)
            .field("catalog_key", &mask(&self.catalog_key))
            .field("price_key", &mask(&self.price_key))
            .field("transaction_key", &mask(&self.transaction_key))
            .field("client_id", &self.client_id)
            .field("active", &self.active)
            .finish()
    }
}

/// Marketplace trait that every provider adapter implements
#[async_trait]
pub trait Marketplace: Send + Sync {
    fn kind(&self) -> MarketplaceKind;

    /// Display name
    fn name(&self) -> &'static str;

    /// Maximum identifiers per price-list call
    fn price_batch_limit(&self) -> usize {
        1000
    }

    fn http(&self) -> &MarketplaceHttp;

    /// Fetch one chunk of prices. Identifiers the provider does not know are
    /// simply absent from the result.
    async fn fetch_price_chunk(
        &self,
        credential: &SellerAccountCredential,
        external_ids: &[u64],
    ) -> Result<Vec<PriceObservation>>;

    /// Fetch prices for any number of identifiers.
    ///
    /// Chunks are requested sequentially with the pacer delay between them. A
    /// failed chunk is kept as a partial failure; permission and configuration
    /// errors abort.
    async fn fetch_prices(
        &self,
        credential: &SellerAccountCredential,
        external_ids: &[u64],
    ) -> Result<PriceFetch> {
        if external_ids.is_empty() {
            return Err(AppError::Validation(
                "Price lookup needs at least one identifier".to_string(),
            ));
        }
        if credential.marketplace != self.kind() {
            return Err(AppError::Validation(format!(
                "Credential for {} passed to {} adapter",
                credential.marketplace,
                self.kind()
            )));
        }
        credential.key(Capability::Prices)?;

        let mut seen = HashSet::new();
        let ids: Vec<u64> = external_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut fetch = PriceFetch::default();
        for chunk in ids.chunks(self.price_batch_limit().max(1)) {
            self.http().pacer().wait_turn().await;

            match self.fetch_price_chunk(credential, chunk).await {
                Ok(observations) => {
                    debug!(
                        marketplace = %self.kind(),
                        requested = chunk.len(),
                        received = observations.len(),
                        "Price chunk fetched"
                    );
                    fetch.observations.extend(observations);
                }
                Err(e) if e.is_account_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        marketplace = %self.kind(),
                        account = %credential.account_name,
                        error = %e,
                        ids = chunk.len(),
                        "Price chunk failed"
                    );
                    fetch.failures.push(ChunkFailure {
                        external_ids: chunk.to_vec(),
                        error: e,
                    });
                }
            }
        }

        Ok(fetch)
    }

    /// Fetch the financial feed for a date range
    async fn fetch_transactions(
        &self,
        credential: &SellerAccountCredential,
        range: DateRange,
    ) -> Result<Vec<SalesTransaction>>;

    /// Submit one batch of corrected prices
    async fn submit_price_update(
        &self,
        credential: &SellerAccountCredential,
        batch: &[PriceUpdate],
    ) -> Result<UpdateTaskHandle>;

    /// Units delivered per day, used only to fill days without transactions
    async fn fetch_delivered_units(
        &self,
        _credential: &SellerAccountCredential,
        _range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, i64>> {
        Ok(BTreeMap::new())
    }
}

/// Marketplace registry for looking up adapters by kind
pub struct MarketplaceRegistry {
    marketplaces: HashMap<MarketplaceKind, Arc<dyn Marketplace>>,
}

impl MarketplaceRegistry {
    /// Create a registry with all supported marketplaces
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let mut registry = Self::empty();

        registry.register(Arc::new(wildberries::WildberriesClient::new(settings)?));
        registry.register(Arc::new(ozon::OzonClient::new(settings)?));

        Ok(registry)
    }

    pub fn empty() -> Self {
        Self {
            marketplaces: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any previous one of the same kind
    pub fn register(&mut self, marketplace: Arc<dyn Marketplace>) {
        self.marketplaces.insert(marketplace.kind(), marketplace);
    }

    pub fn get(&self, kind: MarketplaceKind) -> Result<Arc<dyn Marketplace>> {
        self.marketplaces
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::NotConfigured(format!("No adapter registered for {}", kind)))
    }

    pub fn list(&self) -> Vec<Arc<dyn Marketplace>> {
        self.marketplaces.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn credential() -> SellerAccountCredential {
        SellerAccountCredential {
            marketplace: MarketplaceKind::Wildberries,
            account_name: "main".into(),
            catalog_key: None,
            price_key: Some("secret-price-key".into()),
            transaction_key: Some("  ".into()),
            client_id: None,
            active: true,
        }
    }

    /// Records chunk sizes; fails the chunk containing `fail_on`
    struct ChunkRecorder {
        http: MarketplaceHttp,
        chunks: Mutex<Vec<usize>>,
        fail_on: Option<u64>,
        forbidden: bool,
    }

    impl ChunkRecorder {
        fn new() -> Self {
            let settings = HttpSettings {
                batch_delay: Duration::ZERO,
                ..Default::default()
            };
            Self {
                http: MarketplaceHttp::new(&settings).unwrap(),
                chunks: Mutex::new(Vec::new()),
                fail_on: None,
                forbidden: false,
            }
        }
    }

    #[async_trait]
    impl Marketplace for ChunkRecorder {
        fn kind(&self) -> MarketplaceKind {
            MarketplaceKind::Wildberries
        }

        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn http(&self) -> &MarketplaceHttp {
            &self.http
        }

        async fn fetch_price_chunk(
            &self,
            credential: &SellerAccountCredential,
            external_ids: &[u64],
        ) -> Result<Vec<PriceObservation>> {
            self.chunks.lock().push(external_ids.len());
            if self.forbidden {
                return Err(AppError::PermissionScope {
                    account: credential.account_name.clone(),
                    message: "token scope not allowed".into(),
                });
            }
            if let Some(bad) = self.fail_on {
                if external_ids.contains(&bad) {
                    return Err(AppError::transient("503"));
                }
            }
            Ok(external_ids
                .iter()
                .filter(|id| *id % 2 == 0)
                .map(|id| PriceObservation {
                    external_id: *id,
                    price: 100.0,
                    discounted_price: 100.0,
                    discount_percent: 0.0,
                    currency: "RUB".into(),
                })
                .collect())
        }

        async fn fetch_transactions(
            &self,
            _credential: &SellerAccountCredential,
            _range: DateRange,
        ) -> Result<Vec<SalesTransaction>> {
            Ok(Vec::new())
        }

        async fn submit_price_update(
            &self,
            _credential: &SellerAccountCredential,
            _batch: &[PriceUpdate],
        ) -> Result<UpdateTaskHandle> {
            Err(AppError::Internal("not used".into()))
        }
    }

    #[test]
    fn test_key_lookup_and_masking() {
        let cred = credential();
        assert_eq!(cred.key(Capability::Prices).unwrap(), "secret-price-key");
        assert!(matches!(
            cred.key(Capability::Transactions),
            Err(AppError::NotConfigured(_))
        ));
        assert!(matches!(
            cred.key(Capability::Catalog),
            Err(AppError::NotConfigured(_))
        ));

        let debug = format!("{:?}", cred);
        assert!(!debug.contains("secret-price-key"));
        assert!(debug.contains("***"));
    }

    #[tokio::test]
    async fn test_fetch_prices_chunks_and_keeps_partial_results() {
        let mut recorder = ChunkRecorder::new();
        recorder.fail_on = Some(1500);
        let ids: Vec<u64> = (1..=2500).collect();

        let fetch = recorder.fetch_prices(&credential(), &ids).await.unwrap();

        assert_eq!(*recorder.chunks.lock(), vec![1000, 1000, 500]);
        assert!(fetch.is_partial());
        assert_eq!(fetch.failures.len(), 1);
        assert_eq!(fetch.failures[0].external_ids.len(), 1000);
        // even ids from the two successful chunks
        assert_eq!(fetch.observations.len(), 500 + 250);
    }

    #[tokio::test]
    async fn test_fetch_prices_rejects_empty_and_unconfigured() {
        let recorder = ChunkRecorder::new();
        let result = recorder.fetch_prices(&credential(), &[]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut cred = credential();
        cred.price_key = None;
        let result = recorder.fetch_prices(&cred, &[1, 2]).await;
        assert!(matches!(result, Err(AppError::NotConfigured(_))));
        assert!(recorder.chunks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_permission_error_aborts_fetch() {
        let mut recorder = ChunkRecorder::new();
        recorder.forbidden = true;
        let ids: Vec<u64> = (1..=2500).collect();

        let result = recorder.fetch_prices(&credential(), &ids).await;
        assert!(matches!(result, Err(AppError::PermissionScope { .. })));
        assert_eq!(recorder.chunks.lock().len(), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MarketplaceRegistry::new(&HttpSettings::default()).unwrap();
        assert_eq!(
            registry.get(MarketplaceKind::Ozon).unwrap().kind(),
            MarketplaceKind::Ozon
        );
        assert!(matches!(
            MarketplaceRegistry::empty().get(MarketplaceKind::Wildberries),
            Err(AppError::NotConfigured(_))
        ));
    }
}
