//! Daily inventory snapshots
//!
//! One [`DailySnapshot`] is one observation of one reseller subscription on one
//! calendar day. Snapshots are produced by the ingestion side and are read-only
//! here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Payment;

/// Convert an epoch-millisecond timestamp to its UTC calendar day.
///
/// Zero means "unset" upstream and maps to `None`.
pub fn epoch_millis_to_date(millis: i64) -> Option<NaiveDate> {
    if millis == 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Midnight UTC of `date` as epoch milliseconds.
pub fn date_to_epoch_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// One daily observation of a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub subscription_id: String,
    pub customer_id: String,
    pub customer_domain: String,
    pub date: NaiveDate,
    pub subscription: Option<Subscription>,
    /// Per-asset override captured at observation time
    pub settings: Option<SubscriptionSettings>,
    /// Discount contract reference
    pub contract: Option<String>,
}

impl DailySnapshot {
    /// Asset identifier used for settings lookups and row grouping
    pub fn asset_id(&self) -> String {
        asset_id(&self.subscription_id)
    }

    /// Subscription creation day, if known
    pub fn creation_date(&self) -> Option<NaiveDate> {
        self.subscription
            .as_ref()
            .and_then(|s| epoch_millis_to_date(s.creation_time))
    }

    /// Raw plan of the live subscription
    pub fn plan(&self) -> Option<&SubscriptionPlan> {
        self.subscription.as_ref().and_then(|s| s.plan.as_ref())
    }

    /// Plan from the per-asset override
    pub fn override_plan(&self) -> Option<&SubscriptionPlan> {
        self.settings.as_ref().and_then(|s| s.plan.as_ref())
    }

    /// Whether the subscription was flagged as in trial
    pub fn in_trial(&self) -> bool {
        self.subscription
            .as_ref()
            .and_then(|s| s.trial_settings.as_ref())
            .map(|t| t.is_in_trial)
            .unwrap_or(false)
    }
}

/// Asset identifier for a workspace subscription
pub fn asset_id(subscription_id: &str) -> String {
    format!("g-suite-{}", subscription_id)
}

/// Reseller subscription as reported on the snapshot day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub sku_id: String,
    #[serde(default)]
    pub sku_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub billing_method: String,
    /// Epoch milliseconds
    #[serde(default)]
    pub creation_time: i64,
    pub plan: Option<SubscriptionPlan>,
    pub seats: Option<Seats>,
    pub trial_settings: Option<TrialSettings>,
}

/// Raw plan descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub plan_name: String,
    pub is_commitment_plan: bool,
    pub commitment_interval: Option<CommitmentInterval>,
}

impl SubscriptionPlan {
    /// Commitment start day, when this is a commitment plan with a start set
    pub fn commitment_start(&self) -> Option<NaiveDate> {
        if !self.is_commitment_plan {
            return None;
        }
        self.commitment_interval
            .as_ref()
            .and_then(|i| epoch_millis_to_date(i.start_time))
    }
}

/// Commitment interval, epoch milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentInterval {
    pub start_time: i64,
    pub end_time: i64,
}

/// Seat counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    pub licensed_number_of_seats: i64,
    pub maximum_number_of_seats: i64,
    pub number_of_seats: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSettings {
    pub is_in_trial: bool,
    #[serde(default)]
    pub trial_end_time: i64,
}

/// Per-asset override of plan, payment cadence and currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    pub plan: Option<SubscriptionPlan>,
    pub payment: Option<Payment>,
    pub currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_round_trip_truncates_to_day() {
        let date = NaiveDate::from_ymd_opt(2023, 4, 16).unwrap();
        let millis = date_to_epoch_millis(date) + 13 * 3_600_000;
        assert_eq!(epoch_millis_to_date(millis), Some(date));
        assert_eq!(epoch_millis_to_date(0), None);
    }

    #[test]
    fn test_commitment_start_requires_commitment_plan() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut plan = SubscriptionPlan {
            plan_name: "ANNUAL".into(),
            is_commitment_plan: true,
            commitment_interval: Some(CommitmentInterval {
                start_time: date_to_epoch_millis(start),
                end_time: 0,
            }),
        };
        assert_eq!(plan.commitment_start(), Some(start));

        plan.is_commitment_plan = false;
        assert_eq!(plan.commitment_start(), None);
    }

    #[test]
    fn test_snapshot_deserializes_without_optional_fields() {
        let json = r#"{
            "subscription_id": "sub-1",
            "customer_id": "cust-1",
            "customer_domain": "example.com",
            "date": "2024-03-05",
            "subscription": {"id": "sub-1", "sku_id": "Google-Vault", "plan": null, "seats": null, "trial_settings": null},
            "settings": null,
            "contract": null
        }"#;
        let snapshot: DailySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.asset_id(), "g-suite-sub-1");
        assert!(!snapshot.in_trial());
        assert_eq!(snapshot.creation_date(), None);
    }
}
