//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::{BillingError, BillingResult};

/// Invoicing run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicingConfig {
    /// Product type tag stamped on every row
    pub product_type: String,
    /// Sort key used for manual adjustment rows
    pub product_sku: String,
    /// Annual runs ending more than this many days early are credited
    pub credit_gap_days: i64,
    /// Seat counts at or above this are treated as corrupt
    pub seat_anomaly_threshold: i64,
    /// Customers computed concurrently by the runner
    pub max_concurrent_customers: usize,
    /// Plan names that are never billed
    pub free_plan_names: Vec<String>,
    /// Status billed without a warning
    pub active_status: String,
    /// Status whose days are never billed
    pub suspended_status: String,
    /// Billing method of offline subscriptions
    pub offline_billing_method: String,
    /// SKUs never billed through the offline channel
    pub offline_skip_skus: Vec<String>,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            product_type: "g-suite".into(),
            product_sku: "G Suite".into(),
            credit_gap_days: 7,
            seat_anomaly_threshold: 25_000,
            max_concurrent_customers: 16,
            free_plan_names: vec!["FREE".into(), "TRIAL".into()],
            active_status: "ACTIVE".into(),
            suspended_status: "SUSPENDED".into(),
            offline_billing_method: "OFFLINE".into(),
            offline_skip_skus: vec!["1010010001".into(), "Google-Apps-Lite".into()],
        }
    }
}

impl InvoicingConfig {
    /// Load from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> BillingResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BillingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BillingResult<()> {
        if self.max_concurrent_customers == 0 {
            return Err(BillingError::InvalidConfig(
                "max_concurrent_customers must be at least 1".into(),
            ));
        }
        if self.credit_gap_days < 0 {
            return Err(BillingError::InvalidConfig(
                "credit_gap_days must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Whether the plan name is free or a trial
    pub fn is_free_plan(&self, plan_name: &str) -> bool {
        self.free_plan_names.iter().any(|p| p == plan_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = InvoicingConfig::from_json(r#"{"credit_gap_days": 10}"#).unwrap();
        assert_eq!(config.credit_gap_days, 10);
        assert_eq!(config.seat_anomaly_threshold, 25_000);
        assert!(config.is_free_plan("TRIAL"));
        assert!(!config.is_free_plan("ANNUAL"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = InvoicingConfig::from_json(r#"{"max_concurrent_customers": 0}"#).unwrap_err();
        assert!(matches!(err, BillingError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(InvoicingConfig::from_json("{").is_err());
    }
}
