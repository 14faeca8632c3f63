//! Line-Item Aggregator
//!
//! Single forward pass over one subscription's classified days. Monthly days
//! fold into period rows that reopen whenever the seat count, the discount
//! contract or the price window changes. Yearly days bill the commitment start
//! in full and prorate later seat increases.

use chrono::NaiveDate;
use reseller_common::{
    to_proportion, AssetSettings, CatalogEntry, DailySnapshot, DiscountResolver, DiscountTerms,
    InvoiceMonth, Payment, Plan, SnapshotStore,
};
use rust_decimal::Decimal;

use crate::classify::{ClassifiedDay, CommitmentWindow};
use crate::config::InvoicingConfig;
use crate::engine::RunCaches;
use crate::pricing::{resolve_price, Catalog, PriceWindow};
use crate::quantity::billable_quantity;
use crate::rows::{pretty_date, DeferredRevenuePeriod, GroupingKey, InvoiceRow, RowSet};
use crate::{BillingError, BillingResult};

/// Whether a snapshot day takes part in billing at all
///
/// Free and trial plans, suspended subscriptions and trial periods are never
/// billed. Days missing their plan are kept so classification reports them.
pub fn is_retained(snapshot: &DailySnapshot, config: &InvoicingConfig) -> bool {
    let Some(subscription) = snapshot.subscription.as_ref() else {
        return true;
    };

    if subscription
        .plan
        .as_ref()
        .is_some_and(|p| config.is_free_plan(&p.plan_name))
    {
        return false;
    }

    subscription.status != config.suspended_status && !snapshot.in_trial()
}

/// Offline channel subscriptions that are billed elsewhere
fn is_offline_exempt(snapshot: &DailySnapshot, config: &InvoicingConfig) -> bool {
    let Some(subscription) = snapshot.subscription.as_ref() else {
        return false;
    };
    if subscription.billing_method != config.offline_billing_method {
        return false;
    }

    if config.offline_skip_skus.iter().any(|s| *s == subscription.sku_id) {
        return true;
    }

    // annual plan with no commitment interval anywhere
    subscription.plan.as_ref().is_some_and(|p| {
        p.plan_name == Plan::Annual.as_str()
            && p.commitment_interval.is_none()
            && snapshot.settings.is_none()
    })
}

/// Carry-over between days of one subscription
#[derive(Debug, Default)]
struct PassState {
    prev_quantity: i64,
    prev_contract_id: String,
    prev_price_window: Option<PriceWindow>,
    period_start: Option<NaiveDate>,
    rows: RowSet,
}

/// Builds the line items of one subscription at a time
pub struct LineItemAggregator<'c> {
    /// Configuration of this engine
    pub config: &'c InvoicingConfig,
    /// Preloaded catalog
    pub catalog: &'c Catalog,
    /// Used to find the day before a subscription's first day
    pub snapshots: &'c dyn SnapshotStore,
    /// Contract discounts
    pub discounts: &'c dyn DiscountResolver,
    /// Month being invoiced
    pub month: InvoiceMonth,
    /// Marks emitted rows as final
    pub is_final: bool,
}

impl<'c> LineItemAggregator<'c> {
    /// Rows for one asset's days, in date order
    pub async fn aggregate(
        &self,
        asset_id: &str,
        days: &[ClassifiedDay<'_>],
        caches: &mut RunCaches,
    ) -> BillingResult<Vec<InvoiceRow>> {
        let settings = caches.settings_for(asset_id);
        let mut state = PassState::default();

        for (i, day) in days.iter().enumerate() {
            let snapshot = day.snapshot;
            let subscription = snapshot
                .subscription
                .as_ref()
                .ok_or_else(|| BillingError::InvalidSubscription(asset_id.to_string()))?;

            if subscription.status != self.config.active_status {
                tracing::warn!(
                    "[g-suite] subscription {} status was '{}' on {}",
                    subscription.id,
                    subscription.status,
                    day.date()
                );
            }

            if is_offline_exempt(snapshot, self.config) || day.quantity <= 0 {
                continue;
            }

            let entry = self
                .catalog
                .lookup(&subscription.sku_id, day.plan, day.payment)
                .ok_or_else(|| BillingError::CatalogEntryNotFound {
                    subscription_id: subscription.id.clone(),
                    sku: subscription.sku_id.clone(),
                    plan: day.plan.to_string(),
                    payment: day.payment.to_string(),
                })?;

            let terms = caches
                .discounts
                .resolve(self.discounts, snapshot.contract.as_deref())
                .await?;

            let ctx = DayContext {
                day,
                entry,
                terms: &terms,
                settings: &settings,
            };

            match day.payment {
                Payment::Monthly => self.bill_monthly(&ctx, i, &mut state, caches)?,
                Payment::Yearly => self.bill_yearly(&ctx, i, days, &mut state, caches).await?,
            }
        }

        Ok(state.rows.into_rows())
    }

    fn bill_monthly(
        &self,
        ctx: &DayContext<'_, '_>,
        i: usize,
        state: &mut PassState,
        caches: &mut RunCaches,
    ) -> BillingResult<()> {
        let day = ctx.day;
        let (price, price_window) = resolve_price(day.snapshot, ctx.entry, &day.currency)?;
        let mut ppu = price / Decimal::from(self.month.days_in_month());

        if i == 0
            || state.period_start.is_none()
            || day.quantity != state.prev_quantity
            || ctx.terms.contract_id != state.prev_contract_id
            || state.prev_price_window != Some(price_window)
        {
            state.prev_quantity = day.quantity;
            state.prev_contract_id = ctx.terms.contract_id.clone();
            state.prev_price_window = Some(price_window);
            state.period_start = Some(day.date());
        }
        let anchor = state.period_start.unwrap_or_else(|| day.date());

        if day.plan == Plan::Annual {
            if !ctx.terms.secondary.is_zero() {
                ppu *= to_proportion(ctx.terms.secondary);
            }

            let window = day.window.ok_or_else(|| day.invalid_window())?;
            if window.remaining_days(day.date()) < 0 {
                return Err(past_end_date(day));
            }
        }

        let total = Decimal::from(day.quantity) * ppu * to_proportion(ctx.terms.primary);
        let details = format!(
            "Period of {} to {} for domain {}",
            pretty_date(anchor),
            pretty_date(day.date()),
            day.domain()
        );
        let key = ctx.key(anchor, price_window, None);

        if let Some(row) = state.rows.get_mut(&key) {
            row.ppu += ppu;
            row.total += total;
            row.details = details;
            return Ok(());
        }

        let rank = caches
            .ranks
            .rank(&day.snapshot.customer_id, day.subscription_id(), anchor);
        let row = ctx.row(self, details, day.quantity, ppu, total, rank);
        state.rows.insert(key, row);
        Ok(())
    }

    async fn bill_yearly(
        &self,
        ctx: &DayContext<'_, '_>,
        i: usize,
        days: &[ClassifiedDay<'_>],
        state: &mut PassState,
        caches: &mut RunCaches,
    ) -> BillingResult<()> {
        let day = ctx.day;
        let window = day.window.ok_or_else(|| day.invalid_window())?;
        let snapshot = day.snapshot;

        let (increase, adjustment, ppu, price_window) = if window.start == day.date() {
            let (price, price_window) = resolve_price(snapshot, ctx.entry, &day.currency)?;
            let ppu = scale_commitment(price, &window, ctx.terms);
            (day.quantity, false, ppu, price_window)
        } else {
            if i == 0 {
                let prev = self
                    .snapshots
                    .previous_day(day.subscription_id(), day.date())
                    .await?;
                if let Some(prev) = prev {
                    state.prev_quantity = billable_quantity(&prev, self.config.seat_anomaly_threshold);
                }
            } else if let Some(prev) = days.get(i - 1) {
                state.prev_quantity = prev.quantity;
            }

            if window.start > day.date() {
                if snapshot.creation_date().is_some_and(|c| c > day.date()) {
                    return Err(BillingError::StartDateAfterObservation {
                        subscription_id: day.subscription_id().to_string(),
                        domain: day.domain().to_string(),
                        start: window.start,
                        date: day.date(),
                    });
                }

                tracing::warn!(
                    "[g-suite] start date {} is after date {} for {} ({}) - SKIPPING",
                    window.start,
                    day.date(),
                    day.subscription_id(),
                    day.domain()
                );
                return Ok(());
            }

            // commitment-with-override subscriptions may legitimately start without history
            let is_plain_commitment =
                snapshot.plan().is_some_and(|p| p.is_commitment_plan) && snapshot.settings.is_none();
            if state.prev_quantity == 0 && is_plain_commitment {
                return Err(BillingError::MissingPreviousSeatCount {
                    subscription_id: day.subscription_id().to_string(),
                    domain: day.domain().to_string(),
                    date: day.date(),
                });
            }

            let increase = day.quantity - state.prev_quantity;
            state.prev_quantity = day.quantity;

            let remaining_days = window.remaining_days(day.date());
            if remaining_days < 0 {
                return Err(past_end_date(day));
            }

            if increase == 0 {
                return Ok(());
            }
            if increase < 0 {
                return Err(BillingError::InvalidSeatDecrease {
                    subscription_id: day.subscription_id().to_string(),
                    domain: day.domain().to_string(),
                    date: day.date(),
                });
            }

            let proration = Decimal::from(remaining_days) / Decimal::from(window.total_days());
            let (price, price_window) = resolve_price(snapshot, ctx.entry, &day.currency)?;
            let ppu = scale_commitment(price * proration, &window, ctx.terms);
            (increase, true, ppu, price_window)
        };

        let (details, deferred) = if adjustment {
            (
                format!(
                    "Annual adjustment on {} for domain {}",
                    pretty_date(day.date()),
                    day.domain()
                ),
                DeferredRevenuePeriod {
                    start_date: day.date(),
                    end_date: window.end,
                },
            )
        } else {
            (
                format!(
                    "Annual commitment from {} to {} for domain {}",
                    pretty_date(window.start),
                    pretty_date(window.end),
                    day.domain()
                ),
                DeferredRevenuePeriod {
                    start_date: window.start,
                    end_date: window.end,
                },
            )
        };

        let total = Decimal::from(increase) * ppu * to_proportion(ctx.terms.primary);
        let key = ctx.key(day.date(), price_window, Some(adjustment));

        if let Some(row) = state.rows.get_mut(&key) {
            row.quantity += increase;
            row.total += total;
            return Ok(());
        }

        let rank = caches
            .ranks
            .rank(&snapshot.customer_id, day.subscription_id(), day.date());
        let mut row = ctx.row(self, details, increase, ppu, total, rank);
        row.deferred_revenue_period = Some(deferred);
        state.rows.insert(key, row);
        Ok(())
    }
}

/// Multi-year and promotional scaling shared by annual rows
fn scale_commitment(mut ppu: Decimal, window: &CommitmentWindow, terms: &DiscountTerms) -> Decimal {
    if window.exceeds_one_year() {
        ppu *= Decimal::from(window.total_days()) / Decimal::from(window.year_days());
    }
    if !terms.secondary.is_zero() {
        ppu *= to_proportion(terms.secondary);
    }
    ppu
}

fn past_end_date(day: &ClassifiedDay<'_>) -> BillingError {
    BillingError::SubscriptionPastEndDate {
        subscription_id: day.subscription_id().to_string(),
        domain: day.domain().to_string(),
        date: day.date(),
    }
}

/// Per-day inputs shared by both cadences
struct DayContext<'d, 'a> {
    day: &'d ClassifiedDay<'a>,
    entry: &'d CatalogEntry,
    terms: &'d DiscountTerms,
    settings: &'d AssetSettings,
}

impl DayContext<'_, '_> {
    fn key(&self, anchor: NaiveDate, price_window: PriceWindow, adjustment: Option<bool>) -> GroupingKey {
        GroupingKey {
            sku: self.entry.sku_priority.clone(),
            customer_id: self.day.snapshot.customer_id.clone(),
            subscription_id: self.day.subscription_id().to_string(),
            anchor,
            currency: self.day.currency.clone(),
            price_window,
            contract_id: self.terms.contract_id.clone(),
            adjustment,
        }
    }

    fn row(
        &self,
        aggregator: &LineItemAggregator<'_>,
        details: String,
        quantity: i64,
        ppu: Decimal,
        total: Decimal,
        rank: u32,
    ) -> InvoiceRow {
        InvoiceRow {
            description: self.entry.sku_name.clone(),
            details,
            tags: self.settings.tags.clone(),
            quantity,
            ppu,
            discount: self.terms.primary,
            currency: self.day.currency.clone(),
            total,
            sku: self.entry.sku_priority.clone(),
            rank,
            product_type: aggregator.config.product_type.clone(),
            is_final: aggregator.is_final,
            deferred_revenue_period: None,
            entity: self.settings.entity.clone(),
            bucket: self.settings.bucket.clone(),
        }
    }
}
