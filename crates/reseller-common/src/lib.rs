//! Reseller Common - Shared inventory model for seat subscription invoicing
//!
//! This crate provides:
//! - Daily inventory snapshots of reseller subscriptions
//! - Product catalog entries and per-currency price cards
//! - Discount terms, asset settings, legal entities and manual adjustments
//! - Repository traits for every external data source, with in-memory implementations
//! - Error handling for repository access

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod customer;
pub mod error;
pub mod inventory;
pub mod period;
pub mod repositories;

pub use catalog::*;
pub use customer::*;
pub use error::*;
pub use inventory::*;
pub use period::*;
pub use repositories::*;
