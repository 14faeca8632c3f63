//! Per-customer invoicing engine

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reseller_common::{
    AdjustmentStore, AssetSettings, AssetSettingsStore, DailySnapshot, DiscountResolver, Entity,
    InvoiceMonth, SnapshotStore,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::adjustments::adjustment_rows;
use crate::classify::{classify, ClassifiedDay};
use crate::config::InvoicingConfig;
use crate::credits::CommitmentTracker;
use crate::discounts::DiscountCache;
use crate::invoicing::{is_retained, LineItemAggregator};
use crate::pricing::Catalog;
use crate::rows::{InvoiceRow, RankTable};
use crate::{BillingError, BillingResult};

/// Which invoice the run computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeIndex {
    /// Estimate over the days observed so far
    Preliminary,
    /// Definitive month-end invoice
    Final,
}

impl TimeIndex {
    /// Whether rows from this index are final
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final)
    }
}

impl TryFrom<i64> for TimeIndex {
    type Error = BillingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Preliminary),
            -2 => Ok(Self::Final),
            other => Err(BillingError::InvalidConfig(format!(
                "unknown time index {}",
                other
            ))),
        }
    }
}

/// One customer's invoicing request
#[derive(Debug, Clone)]
pub struct CustomerTask {
    /// Customer id
    pub customer_id: String,
    /// Month being invoiced
    pub invoice_month: InvoiceMonth,
    /// Preliminary or final run
    pub time_index: TimeIndex,
    /// Wall clock of the run
    pub now: DateTime<Utc>,
    /// Legal entities of the customer, by id
    pub entities: HashMap<String, Entity>,
}

impl CustomerTask {
    /// Last observed day a still-open annual run may have without being credited
    fn credit_cutoff(&self) -> NaiveDate {
        match self.time_index {
            TimeIndex::Preliminary => self.now.date_naive() - Duration::days(1),
            TimeIndex::Final => self.invoice_month.last_day(),
        }
    }
}

/// External collaborators of the engine
#[derive(Clone)]
pub struct BillingStores {
    /// Daily inventory
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Contract discounts
    pub discounts: Arc<dyn DiscountResolver>,
    /// Per-asset routing and tags
    pub settings: Arc<dyn AssetSettingsStore>,
    /// Manual invoice adjustments
    pub adjustments: Arc<dyn AdjustmentStore>,
}

/// Memoization scoped to one customer computation
#[derive(Debug, Default)]
pub struct RunCaches {
    pub(crate) discounts: DiscountCache,
    pub(crate) ranks: RankTable,
    settings: HashMap<String, AssetSettings>,
}

impl RunCaches {
    /// Remember an asset's settings for this run
    pub fn insert_settings(&mut self, asset_id: &str, settings: AssetSettings) {
        self.settings.insert(asset_id.to_string(), settings);
    }

    /// Settings of an asset; empty when it has none
    pub fn settings_for(&self, asset_id: &str) -> AssetSettings {
        self.settings.get(asset_id).cloned().unwrap_or_default()
    }

    fn has_settings(&self, asset_id: &str) -> bool {
        self.settings.contains_key(asset_id)
    }
}

/// Computes invoice rows for one customer at a time
pub struct InvoicingEngine {
    config: Arc<InvoicingConfig>,
    catalog: Arc<Catalog>,
    stores: BillingStores,
}

impl InvoicingEngine {
    /// Engine over a preloaded catalog
    pub fn new(config: InvoicingConfig, catalog: Catalog, stores: BillingStores) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            stores,
        }
    }

    /// Configuration of this engine
    pub fn config(&self) -> &InvoicingConfig {
        &self.config
    }

    /// Rows for one customer and month
    ///
    /// Credits come first, then line items per subscription, then manual
    /// adjustments. Identical inputs always produce identical rows and ranks.
    pub async fn compute_product_invoice_rows(&self, task: &CustomerTask) -> BillingResult<Vec<InvoiceRow>> {
        let month = task.invoice_month;

        let adjustments = self
            .stores
            .adjustments
            .adjustments_for(&task.customer_id, &self.config.product_type, month)
            .await
            .map_err(|e| {
                tracing::error!(
                    "[g-suite] failed to get invoice adjustments for {} with error: {}",
                    task.customer_id,
                    e
                );
                e
            })?;

        let snapshots = self.stores.snapshots.list_days(&task.customer_id, month).await?;
        let retained: Vec<&DailySnapshot> = snapshots
            .iter()
            .filter(|s| is_retained(s, &self.config))
            .collect();

        tracing::debug!(
            "[g-suite] {} retained {} of {} snapshot days for {}",
            task.customer_id,
            retained.len(),
            snapshots.len(),
            month
        );

        let mut caches = RunCaches::default();
        for snapshot in &retained {
            let asset_id = snapshot.asset_id();
            if !caches.has_settings(&asset_id) {
                let settings = self
                    .stores
                    .settings
                    .settings_for(&asset_id)
                    .await?
                    .unwrap_or_default();
                caches.insert_settings(&asset_id, settings);
            }
        }

        let days = retained
            .iter()
            .map(|&s| classify(s, &self.config))
            .collect::<BillingResult<Vec<_>>>()?;

        let mut rows = self.credit_pass(&days, task, &mut caches).await?;

        let aggregator = LineItemAggregator {
            config: &self.config,
            catalog: &self.catalog,
            snapshots: self.stores.snapshots.as_ref(),
            discounts: self.stores.discounts.as_ref(),
            month,
            is_final: task.time_index.is_final(),
        };
        for (asset_id, group) in group_by_asset(days) {
            rows.extend(aggregator.aggregate(&asset_id, &group, &mut caches).await?);
        }

        rows.extend(adjustment_rows(&adjustments, &task.entities, &self.config)?);
        Ok(rows)
    }

    async fn credit_pass<'a>(
        &self,
        days: &[ClassifiedDay<'a>],
        task: &CustomerTask,
        caches: &mut RunCaches,
    ) -> BillingResult<Vec<InvoiceRow>> {
        let mut tracker = CommitmentTracker::new(&self.config, &self.catalog, self.stores.discounts.as_ref());
        let mut credits = Vec::new();

        for day in days {
            if let Some(row) = tracker.observe(day, caches).await? {
                credits.push(row);
            }
        }
        credits.extend(tracker.drain(task.credit_cutoff(), caches).await?);
        Ok(credits)
    }
}

/// Days per asset, assets in first-seen order and days by date
fn group_by_asset(days: Vec<ClassifiedDay<'_>>) -> Vec<(String, Vec<ClassifiedDay<'_>>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ClassifiedDay<'_>>)> = Vec::new();

    for day in days {
        let asset_id = day.snapshot.asset_id();
        match index.get(&asset_id) {
            Some(&i) => groups[i].1.push(day),
            None => {
                index.insert(asset_id.clone(), groups.len());
                groups.push((asset_id, vec![day]));
            }
        }
    }

    for (_, group) in &mut groups {
        group.sort_by_key(|d| d.date());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::rows::INVOICE_ADJUSTMENT_RANK;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use reseller_common::{InvoiceAdjustment, RepoResult, RepositoryError};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn adjustment(entity: &str) -> InvoiceAdjustment {
        InvoiceAdjustment {
            id: "adj-1".into(),
            description: "Support fee".into(),
            details: "March support".into(),
            amount: dec!(25),
            currency: "USD".into(),
            entity: entity.into(),
        }
    }

    /// Flexible subscription all month, annual subscription last seen on the 10th
    fn seed(world: &TestWorld, annual_end: NaiveDate) {
        let annual_start = ymd(2023, 6, 1);
        for d in 1..=31 {
            world.snapshots.insert(flexible_day("sub-flex", ymd(2024, 3, d), 4));
        }
        world
            .snapshots
            .insert(annual_day("sub-annual", ymd(2024, 2, 29), annual_start, annual_end, 10));
        for d in 1..=10 {
            world
                .snapshots
                .insert(annual_day("sub-annual", ymd(2024, 3, d), annual_start, annual_end, 10));
        }

        world.settings.insert(
            "g-suite-sub-flex",
            AssetSettings {
                tags: vec!["eng".into()],
                entity: Some(ENTITY.into()),
                bucket: Some("bucket-eng".into()),
            },
        );
        world
            .adjustments
            .insert(CUSTOMER, "g-suite", march(), adjustment(ENTITY));
    }

    #[tokio::test]
    async fn test_final_run_credits_early_ended_commitment() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 6, 1));

        let rows = world
            .engine()
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);

        let credit = &rows[0];
        assert_eq!(credit.quantity, -10);
        assert!(credit.total < Decimal::ZERO);
        assert_eq!(credit.details, "Annual credit from 2024/03/10 to 2024/06/01 for domain example.com");
        assert_eq!(credit.rank, 1);

        let flex = &rows[1];
        assert_eq!(flex.quantity, 4);
        assert_eq!(flex.ppu, dec!(31));
        assert_eq!(flex.total, dec!(124));
        assert_eq!(flex.details, "Period of 2024/03/01 to 2024/03/31 for domain example.com");
        assert_eq!(flex.tags, vec!["eng".to_string()]);
        assert_eq!(flex.entity.as_deref(), Some(ENTITY));
        assert_eq!(flex.bucket.as_deref(), Some("bucket-eng"));
        assert_eq!(flex.rank, 2);
        assert!(flex.is_final);

        let manual = &rows[2];
        assert_eq!(manual.rank, INVOICE_ADJUSTMENT_RANK);
        assert_eq!(manual.total, dec!(25));
        assert_eq!(manual.bucket.as_deref(), Some("bucket-default"));
    }

    #[tokio::test]
    async fn test_short_gap_is_not_credited() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 3, 17));

        let rows = world
            .engine()
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap();

        assert!(rows.iter().all(|r| r.quantity > 0));
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_preliminary_run_waits_for_yesterday() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 6, 1));

        let mut prelim = task(TimeIndex::Preliminary);
        prelim.now = Utc.with_ymd_and_hms(2024, 3, 11, 8, 0, 0).unwrap();
        let rows = world.engine().compute_product_invoice_rows(&prelim).await.unwrap();
        assert!(rows.iter().all(|r| r.quantity > 0), "run seen yesterday stays open");
        assert!(rows.iter().filter(|r| r.rank != INVOICE_ADJUSTMENT_RANK).all(|r| !r.is_final));

        prelim.now = Utc.with_ymd_and_hms(2024, 3, 12, 8, 0, 0).unwrap();
        let rows = world.engine().compute_product_invoice_rows(&prelim).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.quantity < 0).count(), 1);
    }

    #[tokio::test]
    async fn test_recomputation_is_identical() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 6, 1));
        let engine = world.engine();
        let task = task(TimeIndex::Final);

        let first = engine.compute_product_invoice_rows(&task).await.unwrap();
        let second = engine.compute_product_invoice_rows(&task).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_suspended_and_free_days_are_ignored() {
        let world = TestWorld::new();
        for d in 1..=4 {
            let mut snap = flexible_day("sub-1", ymd(2024, 3, d), 4);
            if d % 2 == 0 {
                snap.subscription.as_mut().unwrap().status = "SUSPENDED".into();
            }
            world.snapshots.insert(snap);
        }
        let mut free = flexible_day("sub-2", ymd(2024, 3, 1), 4);
        free.subscription.as_mut().unwrap().plan.as_mut().unwrap().plan_name = "FREE".into();
        world.snapshots.insert(free);

        let rows = world
            .engine()
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap();

        // retained days 1 and 3 are consecutive in the pass and fold together
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ppu, dec!(2));
    }

    #[tokio::test]
    async fn test_unknown_adjustment_entity_fails_customer() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 6, 1));
        world
            .adjustments
            .insert(CUSTOMER, "g-suite", march(), adjustment("entity-9"));

        let err = world
            .engine()
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::UnknownEntity { entity, .. } if entity == "entity-9"));
    }

    #[tokio::test]
    async fn test_snapshot_without_plan_is_invalid() {
        let world = TestWorld::new();
        let mut snap = flexible_day("sub-1", ymd(2024, 3, 1), 4);
        snap.subscription.as_mut().unwrap().plan = None;
        world.snapshots.insert(snap);

        let err = world
            .engine()
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidSubscription(id) if id == "g-suite-sub-1"));
    }

    struct UnavailableAdjustments;

    #[async_trait]
    impl AdjustmentStore for UnavailableAdjustments {
        async fn adjustments_for(&self, _: &str, _: &str, _: InvoiceMonth) -> RepoResult<Vec<InvoiceAdjustment>> {
            Err(RepositoryError::StorageError("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_adjustment_store_failure_is_fatal() {
        let world = TestWorld::new();
        seed(&world, ymd(2024, 6, 1));
        let mut stores = world.stores();
        stores.adjustments = Arc::new(UnavailableAdjustments);
        let engine = InvoicingEngine::new(InvoicingConfig::default(), catalog(), stores);

        let err = engine
            .compute_product_invoice_rows(&task(TimeIndex::Final))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Repository(RepositoryError::StorageError(_))));
    }

    #[test]
    fn test_time_index_from_legacy_value() {
        assert_eq!(TimeIndex::try_from(-1).unwrap(), TimeIndex::Preliminary);
        assert_eq!(TimeIndex::try_from(-2).unwrap(), TimeIndex::Final);
        assert!(TimeIndex::try_from(0).is_err());
        assert!(TimeIndex::Final.is_final());
    }

    #[test]
    fn test_credit_cutoff() {
        let mut t = task(TimeIndex::Final);
        assert_eq!(t.credit_cutoff(), ymd(2024, 3, 31));

        t.time_index = TimeIndex::Preliminary;
        t.now = Utc.with_ymd_and_hms(2024, 3, 11, 23, 59, 0).unwrap();
        assert_eq!(t.credit_cutoff(), ymd(2024, 3, 10));
    }
}
