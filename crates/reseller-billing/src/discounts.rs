//! Per-run discount memoization

use reseller_common::{DiscountResolver, DiscountTerms};
use std::collections::HashMap;

use crate::BillingResult;

/// Discount terms resolved during one customer computation
#[derive(Debug, Default)]
pub struct DiscountCache {
    terms: HashMap<String, DiscountTerms>,
}

impl DiscountCache {
    /// Terms for a snapshot's contract reference
    ///
    /// Snapshots without a contract get zero discounts. Each contract is
    /// fetched at most once per cache.
    pub async fn resolve(
        &mut self,
        resolver: &dyn DiscountResolver,
        contract_ref: Option<&str>,
    ) -> BillingResult<DiscountTerms> {
        let Some(contract_ref) = contract_ref.filter(|c| !c.is_empty()) else {
            return Ok(DiscountTerms::none());
        };

        if let Some(terms) = self.terms.get(contract_ref) {
            return Ok(terms.clone());
        }

        let terms = resolver.discount_for(contract_ref).await?;
        self.terms.insert(contract_ref.to_string(), terms.clone());
        Ok(terms)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.terms.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
