//! Customer-side records: discounts, asset settings, legal entities, manual adjustments

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discount contract terms
///
/// Both discounts are percentages. `primary` is applied to row totals,
/// `secondary` is the special promotion multiplier applied to unit prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscountTerms {
    pub primary: Decimal,
    pub secondary: Decimal,
    pub contract_id: String,
}

impl DiscountTerms {
    /// Terms for a snapshot without a contract
    pub fn none() -> Self {
        Self::default()
    }
}

/// Convert a discount percentage to the multiplier to apply
pub fn to_proportion(discount: Decimal) -> Decimal {
    (Decimal::ONE_HUNDRED - discount) / Decimal::ONE_HUNDRED
}

/// Routing and tagging of one asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSettings {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Legal entity (billing profile) id
    pub entity: Option<String>,
    /// Invoice bucket id within the entity
    pub bucket: Option<String>,
}

/// Legal entity that invoices are issued to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub default_bucket: Option<String>,
}

/// Manually entered invoice adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAdjustment {
    pub id: String,
    pub description: String,
    pub details: String,
    /// Signed amount; negative for credits
    pub amount: Decimal,
    pub currency: String,
    /// Entity id the adjustment is billed to
    pub entity: String,
}
