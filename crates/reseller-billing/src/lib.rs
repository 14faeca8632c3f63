//! Reseller Seat Billing Engine
//!
//! Computes monthly invoice rows for resold seat-based subscriptions from
//! daily inventory snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SEAT BILLING ENGINE (per customer)                  │
//! │                                                                         │
//! │   Daily Snapshots ─► Classifier ─► Classified Days (computed once)      │
//! │                                         │                               │
//! │                        ┌────────────────┴────────────────┐              │
//! │                        ▼                                 ▼              │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐    │
//! │  │  Annual Commitment Tracker   │   │     Line-Item Aggregator     │    │
//! │  │  early-termination credits   │   │  monthly periods, annual     │    │
//! │  │                              │   │  commitments, seat increases │    │
//! │  └──────────────┬───────────────┘   └──────────────┬───────────────┘    │
//! │                 └─────────────┬────────────────────┘                    │
//! │                               ▼                                         │
//! │                 Price Resolver │ Discounts │ Rank Table                 │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ADJUSTMENT MERGER (manual rows)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`InvoicingRunner`] fans the engine out over customers; each customer's
//! computation owns its caches and reports through its own task handle.

#![warn(missing_docs)]

pub mod adjustments;
pub mod classify;
pub mod config;
pub mod credits;
pub mod discounts;
pub mod engine;
#[cfg(test)]
mod fixtures;
pub mod invoicing;
pub mod pricing;
pub mod quantity;
pub mod rows;
pub mod runner;

use chrono::NaiveDate;
use reseller_common::RepositoryError;
use thiserror::Error;

pub use classify::{classify, ClassifiedDay, CommitmentWindow};
pub use config::InvoicingConfig;
pub use engine::{BillingStores, CustomerTask, InvoicingEngine, TimeIndex};
pub use pricing::{resolve_price, Catalog, PriceWindow};
pub use quantity::billable_quantity;
pub use rows::{DeferredRevenuePeriod, GroupingKey, InvoiceRow, RankTable};
pub use runner::{InvoicingRunner, ProductInvoiceRows};

/// Billing error types
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("invalid annual subscription start/end dates for {subscription_id} ({domain})")]
    InvalidCommitmentWindow { subscription_id: String, domain: String },

    #[error("no seats count for previous day on {date} for {subscription_id} ({domain})")]
    MissingPreviousSeatCount {
        subscription_id: String,
        domain: String,
        date: NaiveDate,
    },

    #[error("invalid seats count on {date} for {subscription_id} ({domain})")]
    InvalidSeatDecrease {
        subscription_id: String,
        domain: String,
        date: NaiveDate,
    },

    #[error("subscription was past its end date on {date} for {subscription_id} ({domain})")]
    SubscriptionPastEndDate {
        subscription_id: String,
        domain: String,
        date: NaiveDate,
    },

    #[error("start date {start} is after date {date} for {subscription_id} ({domain})")]
    StartDateAfterObservation {
        subscription_id: String,
        domain: String,
        start: NaiveDate,
        date: NaiveDate,
    },

    #[error("currency {0} is not supported")]
    UnsupportedCurrency(String),

    #[error("price for currency {0} is not defined")]
    UndefinedPrice(String),

    #[error("({subscription_id}) could not find {sku} {plan} {payment} in catalog")]
    CatalogEntryNotFound {
        subscription_id: String,
        sku: String,
        plan: String,
        payment: String,
    },

    #[error("invalid subscription {0}")]
    InvalidSubscription(String),

    #[error("invalid entity {entity} for invoice adjustment {adjustment_id}")]
    UnknownEntity { entity: String, adjustment_id: String },

    #[error("config error: {0}")]
    InvalidConfig(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result type for the billing engine
pub type BillingResult<T> = Result<T, BillingError>;
