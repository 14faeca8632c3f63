//! Product catalog

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Effective billing plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Annual,
    Flexible,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "ANNUAL",
            Self::Flexible => "FLEXIBLE",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Payment {
    Monthly,
    Yearly,
}

impl Payment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Payment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currencies with configured catalog prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    AUD,
    BRL,
    NOK,
    DKK,
}

impl Currency {
    /// All supported currencies
    pub const ALL: [Currency; 7] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::AUD,
        Currency::BRL,
        Currency::NOK,
        Currency::DKK,
    ];

    /// Parse an ISO code; `None` for anything outside the supported set
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "AUD" => Some(Self::AUD),
            "BRL" => Some(Self::BRL),
            "NOK" => Some(Self::NOK),
            "DKK" => Some(Self::DKK),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::AUD => "AUD",
            Self::BRL => "BRL",
            Self::NOK => "NOK",
            Self::DKK => "DKK",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-currency price card; a missing value means the price is undefined
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogPrice {
    pub usd: Option<Decimal>,
    pub eur: Option<Decimal>,
    pub gbp: Option<Decimal>,
    pub aud: Option<Decimal>,
    pub brl: Option<Decimal>,
    pub nok: Option<Decimal>,
    pub dkk: Option<Decimal>,
}

impl CatalogPrice {
    pub fn get(&self, currency: Currency) -> Option<Decimal> {
        match currency {
            Currency::USD => self.usd,
            Currency::EUR => self.eur,
            Currency::GBP => self.gbp,
            Currency::AUD => self.aud,
            Currency::BRL => self.brl,
            Currency::NOK => self.nok,
            Currency::DKK => self.dkk,
        }
    }

    /// Same card with every defined value divided by `divisor`
    pub fn divided_by(&self, divisor: Decimal) -> Self {
        let scale = |v: Option<Decimal>| v.map(|p| p / divisor);
        Self {
            usd: scale(self.usd),
            eur: scale(self.eur),
            gbp: scale(self.gbp),
            aud: scale(self.aud),
            brl: scale(self.brl),
            nok: scale(self.nok),
            dkk: scale(self.dkk),
        }
    }
}

/// Catalog entry keyed by (SKU, plan, payment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub sku_id: String,
    /// Display name used as the row description
    pub sku_name: String,
    /// Billing sort key
    pub sku_priority: String,
    pub plan: Plan,
    pub payment: Payment,
    pub price: CatalogPrice,
    pub prev_price: Option<CatalogPrice>,
    /// Previous price applies strictly before this day
    pub prev_price_end_date: Option<NaiveDate>,
}
