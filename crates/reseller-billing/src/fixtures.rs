//! Shared test fixtures: a small catalog, snapshot builders and in-memory stores

use chrono::{NaiveDate, TimeZone, Utc};
use reseller_common::{
    date_to_epoch_millis, CatalogEntry, CatalogPrice, CommitmentInterval, DailySnapshot, Entity,
    InMemoryAdjustmentStore, InMemoryAssetSettingsStore, InMemoryDiscountResolver,
    InMemorySnapshotStore, InvoiceMonth, Payment, Plan, Seats, Subscription, SubscriptionPlan,
};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::InvoicingConfig;
use crate::engine::{BillingStores, CustomerTask, InvoicingEngine, TimeIndex};
use crate::pricing::Catalog;

pub const SKU: &str = "Google-Apps-For-Business";
pub const CUSTOMER: &str = "cust-1";
pub const DOMAIN: &str = "example.com";
pub const ENTITY: &str = "entity-1";

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn march() -> InvoiceMonth {
    InvoiceMonth::new(2024, 3).unwrap()
}

fn entry(plan: Plan, payment: Payment, usd: rust_decimal::Decimal) -> CatalogEntry {
    CatalogEntry {
        sku_id: SKU.into(),
        sku_name: "Business Starter".into(),
        sku_priority: "01".into(),
        plan,
        payment,
        price: CatalogPrice {
            usd: Some(usd),
            ..Default::default()
        },
        prev_price: None,
        prev_price_end_date: None,
    }
}

/// Flexible costs 1 per seat-day in March; annual costs 1 per seat-day of a leap year
pub fn catalog_entries() -> Vec<CatalogEntry> {
    vec![
        entry(Plan::Flexible, Payment::Monthly, dec!(31)),
        entry(Plan::Annual, Payment::Yearly, dec!(366)),
        entry(Plan::Annual, Payment::Monthly, dec!(31)),
    ]
}

pub fn catalog() -> Catalog {
    Catalog::new(catalog_entries())
}

fn seats(n: i64) -> Option<Seats> {
    Some(Seats {
        licensed_number_of_seats: n,
        maximum_number_of_seats: n,
        number_of_seats: n,
    })
}

pub fn commitment(start: NaiveDate, end: NaiveDate) -> SubscriptionPlan {
    SubscriptionPlan {
        plan_name: "ANNUAL_YEARLY_PAY".into(),
        is_commitment_plan: true,
        commitment_interval: Some(CommitmentInterval {
            start_time: date_to_epoch_millis(start),
            end_time: date_to_epoch_millis(end),
        }),
    }
}

pub fn flexible_plan() -> SubscriptionPlan {
    SubscriptionPlan {
        plan_name: "FLEXIBLE".into(),
        is_commitment_plan: false,
        commitment_interval: None,
    }
}

fn day(sub: &str, date: NaiveDate, plan: SubscriptionPlan, created: NaiveDate, n: i64) -> DailySnapshot {
    DailySnapshot {
        subscription_id: sub.into(),
        customer_id: CUSTOMER.into(),
        customer_domain: DOMAIN.into(),
        date,
        subscription: Some(Subscription {
            id: sub.into(),
            sku_id: SKU.into(),
            sku_name: "Business Starter".into(),
            status: "ACTIVE".into(),
            billing_method: "ONLINE".into(),
            creation_time: date_to_epoch_millis(created),
            plan: Some(plan),
            seats: seats(n),
            trial_settings: None,
        }),
        settings: None,
        contract: None,
    }
}

pub fn flexible_day(sub: &str, date: NaiveDate, n: i64) -> DailySnapshot {
    day(sub, date, flexible_plan(), ymd(2023, 1, 1), n)
}

pub fn annual_day(sub: &str, date: NaiveDate, start: NaiveDate, end: NaiveDate, n: i64) -> DailySnapshot {
    day(sub, date, commitment(start, end), start, n)
}

pub fn entities() -> HashMap<String, Entity> {
    HashMap::from([(
        ENTITY.to_string(),
        Entity {
            id: ENTITY.into(),
            name: "Example Ltd".into(),
            default_bucket: Some("bucket-default".into()),
        },
    )])
}

pub fn task(time_index: TimeIndex) -> CustomerTask {
    CustomerTask {
        customer_id: CUSTOMER.into(),
        invoice_month: march(),
        time_index,
        now: Utc.with_ymd_and_hms(2024, 4, 1, 6, 0, 0).unwrap(),
        entities: entities(),
    }
}

/// In-memory collaborators
pub struct TestWorld {
    pub snapshots: Arc<InMemorySnapshotStore>,
    pub discounts: Arc<InMemoryDiscountResolver>,
    pub settings: Arc<InMemoryAssetSettingsStore>,
    pub adjustments: Arc<InMemoryAdjustmentStore>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            discounts: Arc::new(InMemoryDiscountResolver::new()),
            settings: Arc::new(InMemoryAssetSettingsStore::new()),
            adjustments: Arc::new(InMemoryAdjustmentStore::new()),
        }
    }

    pub fn stores(&self) -> BillingStores {
        BillingStores {
            snapshots: self.snapshots.clone(),
            discounts: self.discounts.clone(),
            settings: self.settings.clone(),
            adjustments: self.adjustments.clone(),
        }
    }

    pub fn engine(&self) -> InvoicingEngine {
        InvoicingEngine::new(InvoicingConfig::default(), catalog(), self.stores())
    }
}
