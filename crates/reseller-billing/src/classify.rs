//! Snapshot Classifier
//!
//! Derives the effective plan, payment cadence, currency and commitment window
//! of a snapshot day, applying the per-asset override. Classification runs once
//! per day and the result feeds both the credit pass and the aggregation pass.

use chrono::{Months, NaiveDate};
use reseller_common::{epoch_millis_to_date, CommitmentInterval, DailySnapshot, Payment, Plan};

use crate::config::InvoicingConfig;
use crate::quantity::billable_quantity;
use crate::{BillingError, BillingResult};

const DEFAULT_CURRENCY: &str = "USD";

/// Contracted commitment window, start inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitmentWindow {
    /// First committed day
    pub start: NaiveDate,
    /// Day the commitment ends
    pub end: NaiveDate,
}

impl CommitmentWindow {
    /// Days from start to end
    pub fn total_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Days from `date` until the contracted end
    pub fn remaining_days(&self, date: NaiveDate) -> i64 {
        (self.end - date).num_days()
    }

    /// Length of one calendar year from the start
    pub fn year_days(&self) -> i64 {
        self.one_year_end()
            .map(|d| (d - self.start).num_days())
            .unwrap_or(365)
    }

    /// Whether the contract runs past one calendar year from its start
    pub fn exceeds_one_year(&self) -> bool {
        self.one_year_end().is_some_and(|d| self.end > d)
    }

    fn one_year_end(&self) -> Option<NaiveDate> {
        self.start.checked_add_months(Months::new(12))
    }
}

/// One snapshot day after classification
#[derive(Debug, Clone)]
pub struct ClassifiedDay<'a> {
    /// Source snapshot
    pub snapshot: &'a DailySnapshot,
    /// Effective plan after overrides
    pub plan: Plan,
    /// Effective payment cadence after overrides
    pub payment: Payment,
    /// Billing currency code
    pub currency: String,
    /// Commitment window, when the day has one
    pub window: Option<CommitmentWindow>,
    /// Billable seats
    pub quantity: i64,
}

impl ClassifiedDay<'_> {
    /// Snapshot day
    pub fn date(&self) -> NaiveDate {
        self.snapshot.date
    }

    /// Subscription id
    pub fn subscription_id(&self) -> &str {
        &self.snapshot.subscription_id
    }

    /// Customer domain
    pub fn domain(&self) -> &str {
        &self.snapshot.customer_domain
    }

    /// SKU id
    pub fn sku_id(&self) -> &str {
        self.snapshot
            .subscription
            .as_ref()
            .map(|s| s.sku_id.as_str())
            .unwrap_or_default()
    }

    pub(crate) fn invalid_window(&self) -> BillingError {
        BillingError::InvalidCommitmentWindow {
            subscription_id: self.subscription_id().to_string(),
            domain: self.domain().to_string(),
        }
    }
}

fn interval_dates(interval: Option<&CommitmentInterval>) -> (Option<NaiveDate>, Option<NaiveDate>) {
    match interval {
        Some(i) => (epoch_millis_to_date(i.start_time), epoch_millis_to_date(i.end_time)),
        None => (None, None),
    }
}

/// Map an override plan name onto the effective plan
fn plan_from_name(name: &str, is_commitment: bool) -> Plan {
    if name.starts_with("ANNUAL") {
        Plan::Annual
    } else if name == "FLEXIBLE" {
        Plan::Flexible
    } else if is_commitment {
        Plan::Annual
    } else {
        Plan::Flexible
    }
}

/// Classify one snapshot day
pub fn classify<'a>(snapshot: &'a DailySnapshot, config: &InvoicingConfig) -> BillingResult<ClassifiedDay<'a>> {
    let raw_plan = snapshot
        .plan()
        .ok_or_else(|| BillingError::InvalidSubscription(snapshot.asset_id()))?;

    let (mut plan, mut payment, (mut start, mut end)) = if raw_plan.is_commitment_plan {
        (
            Plan::Annual,
            Payment::Yearly,
            interval_dates(raw_plan.commitment_interval.as_ref()),
        )
    } else {
        (Plan::Flexible, Payment::Monthly, (None, None))
    };
    let mut currency = DEFAULT_CURRENCY.to_string();

    if let Some(settings) = &snapshot.settings {
        if let Some(override_plan) = &settings.plan {
            plan = plan_from_name(&override_plan.plan_name, override_plan.is_commitment_plan);
            if override_plan.is_commitment_plan {
                payment = Payment::Yearly;
                (start, end) = interval_dates(override_plan.commitment_interval.as_ref());
            } else {
                payment = Payment::Monthly;
            }
        }

        if let Some(p) = settings.payment {
            payment = p;
        }

        if let Some(c) = settings.currency.as_deref().filter(|c| !c.is_empty()) {
            currency = c.to_string();
        }
    }

    let window = match (start, end) {
        (Some(start), Some(end)) if end > start => Some(CommitmentWindow { start, end }),
        _ => None,
    };

    let day = ClassifiedDay {
        snapshot,
        plan,
        payment,
        currency,
        window,
        quantity: billable_quantity(snapshot, config.seat_anomaly_threshold),
    };

    if day.plan == Plan::Annual && day.window.is_none() {
        return Err(day.invalid_window());
    }

    Ok(day)
}
