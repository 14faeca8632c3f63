//! Repositories - data-access abstraction for the invoicing engine
//!
//! Each external collaborator of the engine is a trait here:
//! - Daily snapshots (month listing and previous-day fallback)
//! - Product catalog
//! - Discount contracts
//! - Per-asset settings
//! - Manual invoice adjustments
//!
//! In-memory implementations back tests and local runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::catalog::CatalogEntry;
use crate::customer::{AssetSettings, DiscountTerms, InvoiceAdjustment};
use crate::error::{RepoResult, RepositoryError};
use crate::inventory::DailySnapshot;
use crate::period::InvoiceMonth;

/// Daily snapshot store
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshots of one customer within a month, ordered by day
    async fn list_days(&self, customer_id: &str, month: InvoiceMonth) -> RepoResult<Vec<DailySnapshot>>;

    /// Snapshot of `subscription_id` on the day before `date`, if one was taken
    async fn previous_day(&self, subscription_id: &str, date: NaiveDate) -> RepoResult<Option<DailySnapshot>>;
}

/// Product catalog store
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All entries, loaded once per invoicing run
    async fn load(&self) -> RepoResult<Vec<CatalogEntry>>;
}

/// Discount contract resolver
#[async_trait]
pub trait DiscountResolver: Send + Sync {
    async fn discount_for(&self, contract_ref: &str) -> RepoResult<DiscountTerms>;
}

/// Per-asset settings store
#[async_trait]
pub trait AssetSettingsStore: Send + Sync {
    /// `None` when the asset has no settings document
    async fn settings_for(&self, asset_id: &str) -> RepoResult<Option<AssetSettings>>;
}

/// Manual invoice adjustment store
#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    async fn adjustments_for(
        &self,
        customer_id: &str,
        product_type: &str,
        month: InvoiceMonth,
    ) -> RepoResult<Vec<InvoiceAdjustment>>;
}

/// In-memory snapshot store
pub struct InMemorySnapshotStore {
    snapshots: RwLock<Vec<DailySnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, snapshot: DailySnapshot) {
        self.snapshots.write().push(snapshot);
    }

    pub fn extend(&self, snapshots: impl IntoIterator<Item = DailySnapshot>) {
        self.snapshots.write().extend(snapshots);
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn list_days(&self, customer_id: &str, month: InvoiceMonth) -> RepoResult<Vec<DailySnapshot>> {
        let mut days: Vec<_> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.customer_id == customer_id && month.contains(s.date))
            .cloned()
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(days)
    }

    async fn previous_day(&self, subscription_id: &str, date: NaiveDate) -> RepoResult<Option<DailySnapshot>> {
        let Some(prev_date) = date.pred_opt() else {
            return Ok(None);
        };
        Ok(self
            .snapshots
            .read()
            .iter()
            .find(|s| s.subscription_id == subscription_id && s.date == prev_date)
            .cloned())
    }
}

/// In-memory catalog store
pub struct InMemoryCatalogStore {
    entries: RwLock<Vec<CatalogEntry>>,
}

impl InMemoryCatalogStore {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn load(&self) -> RepoResult<Vec<CatalogEntry>> {
        Ok(self.entries.read().clone())
    }
}

/// In-memory discount resolver
pub struct InMemoryDiscountResolver {
    contracts: RwLock<HashMap<String, DiscountTerms>>,
}

impl InMemoryDiscountResolver {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, contract_ref: &str, terms: DiscountTerms) {
        self.contracts.write().insert(contract_ref.to_string(), terms);
    }
}

impl Default for InMemoryDiscountResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscountResolver for InMemoryDiscountResolver {
    async fn discount_for(&self, contract_ref: &str) -> RepoResult<DiscountTerms> {
        self.contracts
            .read()
            .get(contract_ref)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("contract {}", contract_ref)))
    }
}

/// In-memory asset settings store
pub struct InMemoryAssetSettingsStore {
    settings: RwLock<HashMap<String, AssetSettings>>,
}

impl InMemoryAssetSettingsStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, asset_id: &str, settings: AssetSettings) {
        self.settings.write().insert(asset_id.to_string(), settings);
    }
}

impl Default for InMemoryAssetSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetSettingsStore for InMemoryAssetSettingsStore {
    async fn settings_for(&self, asset_id: &str) -> RepoResult<Option<AssetSettings>> {
        Ok(self.settings.read().get(asset_id).cloned())
    }
}

/// In-memory adjustment store
pub struct InMemoryAdjustmentStore {
    adjustments: RwLock<HashMap<(String, String, InvoiceMonth), Vec<InvoiceAdjustment>>>,
}

impl InMemoryAdjustmentStore {
    pub fn new() -> Self {
        Self {
            adjustments: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, customer_id: &str, product_type: &str, month: InvoiceMonth, adjustment: InvoiceAdjustment) {
        self.adjustments
            .write()
            .entry((customer_id.to_string(), product_type.to_string(), month))
            .or_default()
            .push(adjustment);
    }
}

impl Default for InMemoryAdjustmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdjustmentStore for InMemoryAdjustmentStore {
    async fn adjustments_for(
        &self,
        customer_id: &str,
        product_type: &str,
        month: InvoiceMonth,
    ) -> RepoResult<Vec<InvoiceAdjustment>> {
        Ok(self
            .adjustments
            .read()
            .get(&(customer_id.to_string(), product_type.to_string(), month))
            .cloned()
            .unwrap_or_default())
    }
}
