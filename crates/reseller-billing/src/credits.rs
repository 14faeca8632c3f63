//! Annual Commitment Tracker
//!
//! Follows each subscription's open annual run over the classified day
//! sequence. A run is closed when a day breaks its commitment window or
//! leaves yearly billing. Runs whose last observed day falls well short of the
//! contracted end are refunded with a credit row.

use chrono::NaiveDate;
use reseller_common::{to_proportion, DiscountResolver, Payment};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::classify::{ClassifiedDay, CommitmentWindow};
use crate::config::InvoicingConfig;
use crate::engine::RunCaches;
use crate::pricing::{resolve_price, Catalog};
use crate::rows::{pretty_date, InvoiceRow};
use crate::{BillingError, BillingResult};

/// Window of a day that takes part in an annual run
fn yearly_window(day: &ClassifiedDay<'_>) -> Option<CommitmentWindow> {
    match day.payment {
        Payment::Yearly => day.window,
        Payment::Monthly => None,
    }
}

/// Open annual runs per subscription
pub struct CommitmentTracker<'a, 'c> {
    config: &'c InvoicingConfig,
    catalog: &'c Catalog,
    discounts: &'c dyn DiscountResolver,
    open: BTreeMap<String, ClassifiedDay<'a>>,
}

impl<'a, 'c> CommitmentTracker<'a, 'c> {
    /// Tracker with no open runs
    pub fn new(config: &'c InvoicingConfig, catalog: &'c Catalog, discounts: &'c dyn DiscountResolver) -> Self {
        Self {
            config,
            catalog,
            discounts,
            open: BTreeMap::new(),
        }
    }

    /// Feed the next day; returns the credit for a run it closed, if owed
    pub async fn observe(
        &mut self,
        day: &ClassifiedDay<'a>,
        caches: &mut RunCaches,
    ) -> BillingResult<Option<InvoiceRow>> {
        let window = yearly_window(day);
        let subscription_id = day.subscription_id();

        let continues = self
            .open
            .get(subscription_id)
            .map(|run| window.is_some() && run.window == window);

        let closed = match continues {
            Some(true) => {
                self.open.insert(subscription_id.to_string(), day.clone());
                return Ok(None);
            }
            Some(false) => self.open.remove(subscription_id),
            None => None,
        };

        let credit = match closed {
            Some(run) => self.credit_for(&run, caches).await?,
            None => None,
        };

        if continues.is_none() && window.is_some_and(|w| day.date() >= w.start) {
            self.open.insert(subscription_id.to_string(), day.clone());
        }

        Ok(credit)
    }

    /// Credit runs still open whose last observed day is before `cutoff`
    pub async fn drain(self, cutoff: NaiveDate, caches: &mut RunCaches) -> BillingResult<Vec<InvoiceRow>> {
        let mut rows = Vec::new();
        for run in self.open.values() {
            if run.date() < cutoff {
                if let Some(row) = self.credit_for(run, caches).await? {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    #[cfg(test)]
    fn open_runs(&self) -> usize {
        self.open.len()
    }

    async fn credit_for(
        &self,
        run: &ClassifiedDay<'a>,
        caches: &mut RunCaches,
    ) -> BillingResult<Option<InvoiceRow>> {
        let Some(window) = run.window else {
            return Ok(None);
        };

        let remaining_days = window.remaining_days(run.date());
        if remaining_days <= self.config.credit_gap_days {
            return Ok(None);
        }

        let entry = self
            .catalog
            .lookup(run.sku_id(), run.plan, run.payment)
            .ok_or_else(|| BillingError::CatalogEntryNotFound {
                subscription_id: run.subscription_id().to_string(),
                sku: run.sku_id().to_string(),
                plan: run.plan.to_string(),
                payment: run.payment.to_string(),
            })?;

        let terms = caches
            .discounts
            .resolve(self.discounts, run.snapshot.contract.as_deref())
            .await?;
        let rank = caches
            .ranks
            .rank(&run.snapshot.customer_id, run.subscription_id(), run.date());

        let total_days = Decimal::from(window.total_days());
        let proration = Decimal::from(remaining_days) / total_days;

        let (price, _) = resolve_price(run.snapshot, entry, &run.currency)?;
        let mut ppu = price * proration;

        if !terms.secondary.is_zero() {
            let year_days = Decimal::from(window.year_days());
            ppu *= to_proportion(terms.secondary) * (total_days / year_days);
        }

        let quantity = run.quantity;
        let total = Decimal::from(quantity) * ppu * to_proportion(terms.primary);
        let settings = caches.settings_for(&run.snapshot.asset_id());

        tracing::info!(
            "[g-suite] annual credit of {} seats for {} ({}) from {} to {}",
            quantity,
            run.subscription_id(),
            run.domain(),
            run.date(),
            window.end
        );

        Ok(Some(InvoiceRow {
            description: entry.sku_name.clone(),
            details: format!(
                "Annual credit from {} to {} for domain {}",
                pretty_date(run.date()),
                pretty_date(window.end),
                run.domain()
            ),
            tags: Vec::new(),
            quantity: -quantity,
            ppu,
            discount: terms.primary,
            currency: run.currency.clone(),
            total: -total,
            sku: entry.sku_priority.clone(),
            rank,
            product_type: self.config.product_type.clone(),
            is_final: false,
            deferred_revenue_period: None,
            entity: settings.entity,
            bucket: settings.bucket,
        }))
    }
}
