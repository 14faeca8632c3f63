//! Price Resolver
//!
//! Resolves the per-unit, per-full-period price of a subscription day from the
//! catalog. Proration is left to callers.
//!
//! Resolution order:
//! 1. Legacy enterprise SKU created before 2021-01-16 bills from the historical
//!    rate card and bypasses the catalog.
//! 2. Cloud Identity Premium bills 66.5% of the current price during its first
//!    year.
//! 3. Otherwise the previous price applies while the subscription falls before
//!    the entry's previous-price end date (commitment start for annual plans,
//!    snapshot day for flexible plans).

use chrono::{Months, NaiveDate};
use reseller_common::{CatalogEntry, CatalogPrice, Currency, DailySnapshot, Payment, Plan};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{BillingError, BillingResult};

/// G Suite Enterprise
pub const GSUITE_ENTERPRISE_SKU: &str = "Google-Apps-Unlimited";
/// Cloud Identity Premium
pub const CLOUD_IDENTITY_PREMIUM_SKU: &str = "1010050001";

const FIRST_YEAR_MULTIPLIER: Decimal = dec!(0.665);

/// Subscriptions created before this day keep the historical enterprise rate card
pub fn legacy_price_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 16).unwrap_or(NaiveDate::MIN)
}

/// Historical enterprise yearly rate card
pub fn legacy_yearly_card() -> CatalogPrice {
    CatalogPrice {
        usd: Some(dec!(300)),
        eur: Some(dec!(276)),
        gbp: Some(dec!(240)),
        aud: Some(dec!(408)),
        ..Default::default()
    }
}

/// Historical enterprise monthly rate card
pub fn legacy_monthly_card() -> CatalogPrice {
    legacy_yearly_card().divided_by(dec!(12))
}

/// Which catalog price era was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceWindow {
    /// Historical enterprise card
    Legacy20210116,
    /// Catalog previous price
    Previous,
    /// Catalog current price
    Current,
}

impl PriceWindow {
    /// Tag used in row keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy20210116 => "20210116",
            Self::Previous => "prev",
            Self::Current => "curr",
        }
    }
}

impl fmt::Display for PriceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog preloaded for one invoicing run
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<(String, Plan, Payment), CatalogEntry>,
}

impl Catalog {
    /// Index entries by sku, plan and payment
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| ((e.sku_id.clone(), e.plan, e.payment), e))
            .collect();
        Self { entries }
    }

    /// Entry for a sku, plan and payment
    pub fn lookup(&self, sku_id: &str, plan: Plan, payment: Payment) -> Option<&CatalogEntry> {
        self.entries.get(&(sku_id.to_string(), plan, payment))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pick the price for `currency` out of a rate card
fn price_for_currency(code: &str, card: &CatalogPrice) -> BillingResult<Decimal> {
    let currency =
        Currency::parse(code).ok_or_else(|| BillingError::UnsupportedCurrency(code.to_string()))?;
    card.get(currency)
        .ok_or_else(|| BillingError::UndefinedPrice(code.to_string()))
}

/// Commitment start used to pick the price era of an annual subscription
///
/// Taken from the override plan, then the live plan, then the creation day.
pub fn annual_commitment_start(snapshot: &DailySnapshot) -> Option<NaiveDate> {
    snapshot
        .override_plan()
        .and_then(|p| p.commitment_start())
        .or_else(|| snapshot.plan().and_then(|p| p.commitment_start()))
        .or_else(|| snapshot.creation_date())
}

/// Resolve the unit price and price window for one snapshot
pub fn resolve_price(
    snapshot: &DailySnapshot,
    entry: &CatalogEntry,
    currency: &str,
) -> BillingResult<(Decimal, PriceWindow)> {
    let creation_date = snapshot.creation_date();

    if entry.sku_id == GSUITE_ENTERPRISE_SKU {
        if let Some(created) = creation_date.filter(|d| *d < legacy_price_cutoff()) {
            tracing::debug!(
                "[g-suite] {} created {} bills from the legacy rate card",
                snapshot.subscription_id,
                created
            );
            let card = match entry.payment {
                Payment::Yearly => legacy_yearly_card(),
                Payment::Monthly => legacy_monthly_card(),
            };
            let price = price_for_currency(currency, &card)?;
            return Ok((price, PriceWindow::Legacy20210116));
        }
    }

    if entry.sku_id == CLOUD_IDENTITY_PREMIUM_SKU {
        let first_year_end = creation_date.and_then(|d| d.checked_add_months(Months::new(12)));
        if first_year_end.is_some_and(|end| snapshot.date < end) {
            let price = price_for_currency(currency, &entry.price)?;
            return Ok((price * FIRST_YEAR_MULTIPLIER, PriceWindow::Current));
        }
    }

    let mut card = &entry.price;
    let mut window = PriceWindow::Current;

    if let (Some(prev_price), Some(prev_end)) = (&entry.prev_price, entry.prev_price_end_date) {
        let before_expiry = match entry.plan {
            Plan::Annual => annual_commitment_start(snapshot).is_some_and(|d| d < prev_end),
            Plan::Flexible => snapshot.date < prev_end,
        };
        if before_expiry {
            card = prev_price;
            window = PriceWindow::Previous;
        }
    }

    let price = price_for_currency(currency, card)?;
    Ok((price, window))
}
