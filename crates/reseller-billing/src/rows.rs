//! Invoice rows, grouping keys and the rank table

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pricing::PriceWindow;

/// Rank given to manual adjustment rows so they sort after computed rows
pub const INVOICE_ADJUSTMENT_RANK: u32 = 1_000_000;

/// Format a date the way row details print it
pub fn pretty_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Revenue recognition span of an annual row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredRevenuePeriod {
    /// First deferred day
    pub start_date: NaiveDate,
    /// Last deferred day
    pub end_date: NaiveDate,
}

/// One output invoice line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRow {
    /// SKU display name
    pub description: String,
    /// Human-readable period
    pub details: String,
    /// Asset tags
    pub tags: Vec<String>,
    /// Negative for credits
    pub quantity: i64,
    /// Price per unit
    pub ppu: Decimal,
    /// Primary discount percentage
    pub discount: Decimal,
    /// Currency code
    pub currency: String,
    /// Signed amount after discount
    pub total: Decimal,
    /// Sort key
    pub sku: String,
    /// Display order within the invoice
    pub rank: u32,
    /// Product family of the row
    pub product_type: String,
    /// False for preliminary rows and credits
    pub is_final: bool,
    /// Revenue recognition period of yearly rows
    pub deferred_revenue_period: Option<DeferredRevenuePeriod>,
    /// Billing entity
    pub entity: Option<String>,
    /// Invoice bucket
    pub bucket: Option<String>,
}

/// Identity of a row within one subscription's pass
///
/// Monthly rows are anchored on their period start, annual rows on the
/// billed day together with the adjustment flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupingKey {
    /// SKU sort key
    pub sku: String,
    /// Customer id
    pub customer_id: String,
    /// Subscription id
    pub subscription_id: String,
    /// First day of the period
    pub anchor: NaiveDate,
    /// Currency code
    pub currency: String,
    /// Price era
    pub price_window: PriceWindow,
    /// Discount contract
    pub contract_id: String,
    /// Yearly rows only: adjustment or full commitment
    pub adjustment: Option<bool>,
}

/// First-seen rank per (customer, subscription, anchor)
#[derive(Debug, Default)]
pub struct RankTable {
    ranks: HashMap<(String, String, NaiveDate), u32>,
}

impl RankTable {
    /// Rank of the key, assigning the next one on first sight
    pub fn rank(&mut self, customer_id: &str, subscription_id: &str, anchor: NaiveDate) -> u32 {
        let next = self.ranks.len() as u32 + 1;
        *self
            .ranks
            .entry((customer_id.to_string(), subscription_id.to_string(), anchor))
            .or_insert(next)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.ranks.len()
    }
}

/// Rows keyed by grouping key, kept in insertion order
#[derive(Debug, Default)]
pub(crate) struct RowSet {
    rows: Vec<InvoiceRow>,
    index: HashMap<GroupingKey, usize>,
}

impl RowSet {
    pub(crate) fn get_mut(&mut self, key: &GroupingKey) -> Option<&mut InvoiceRow> {
        let idx = *self.index.get(key)?;
        self.rows.get_mut(idx)
    }

    pub(crate) fn insert(&mut self, key: GroupingKey, row: InvoiceRow) {
        match self.index.get(&key) {
            Some(&idx) => self.rows[idx] = row,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub(crate) fn into_rows(self) -> Vec<InvoiceRow> {
        self.rows
    }
}
