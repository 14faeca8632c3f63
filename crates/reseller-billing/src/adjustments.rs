//! Manual invoice adjustments

use reseller_common::{Entity, InvoiceAdjustment};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config::InvoicingConfig;
use crate::rows::{InvoiceRow, INVOICE_ADJUSTMENT_RANK};
use crate::{BillingError, BillingResult};

/// Rows for the month's manual adjustments
///
/// Every adjustment must bill a known entity; one unknown entity fails the
/// whole customer.
pub fn adjustment_rows(
    adjustments: &[InvoiceAdjustment],
    entities: &HashMap<String, Entity>,
    config: &InvoicingConfig,
) -> BillingResult<Vec<InvoiceRow>> {
    adjustments
        .iter()
        .map(|adjustment| {
            let entity = entities.get(&adjustment.entity).ok_or_else(|| {
                tracing::error!(
                    "[g-suite] invalid entity {} for invoice adjustment {}",
                    adjustment.entity,
                    adjustment.id
                );
                BillingError::UnknownEntity {
                    entity: adjustment.entity.clone(),
                    adjustment_id: adjustment.id.clone(),
                }
            })?;

            let quantity = if adjustment.amount < Decimal::ZERO { -1 } else { 1 };

            Ok(InvoiceRow {
                description: adjustment.description.clone(),
                details: adjustment.details.clone(),
                tags: Vec::new(),
                quantity,
                ppu: adjustment.amount.abs(),
                discount: Decimal::ZERO,
                currency: adjustment.currency.clone(),
                total: adjustment.amount,
                sku: config.product_sku.clone(),
                rank: INVOICE_ADJUSTMENT_RANK,
                product_type: config.product_type.clone(),
                is_final: true,
                deferred_revenue_period: None,
                entity: Some(entity.id.clone()),
                bucket: entity.default_bucket.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adjustment(id: &str, amount: Decimal, entity: &str) -> InvoiceAdjustment {
        InvoiceAdjustment {
            id: id.into(),
            description: "Service credit".into(),
            details: "Outage".into(),
            amount,
            currency: "EUR".into(),
            entity: entity.into(),
        }
    }

    fn entities() -> HashMap<String, Entity> {
        HashMap::from([(
            "entity-1".to_string(),
            Entity {
                id: "entity-1".into(),
                name: "Acme GmbH".into(),
                default_bucket: Some("bucket-eu".into()),
            },
        )])
    }

    #[test]
    fn test_positive_and_negative_amounts() {
        let rows = adjustment_rows(
            &[
                adjustment("adj-1", dec!(50), "entity-1"),
                adjustment("adj-2", dec!(-20.5), "entity-1"),
            ],
            &entities(),
            &InvoicingConfig::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].quantity, rows[0].ppu, rows[0].total), (1, dec!(50), dec!(50)));
        assert_eq!((rows[1].quantity, rows[1].ppu, rows[1].total), (-1, dec!(20.5), dec!(-20.5)));

        for row in &rows {
            assert!(row.is_final);
            assert_eq!(row.rank, INVOICE_ADJUSTMENT_RANK);
            assert_eq!(row.sku, "G Suite");
            assert_eq!(row.entity.as_deref(), Some("entity-1"));
            assert_eq!(row.bucket.as_deref(), Some("bucket-eu"));
        }
    }

    #[test]
    fn test_unknown_entity_fails_all() {
        let err = adjustment_rows(
            &[
                adjustment("adj-1", dec!(50), "entity-1"),
                adjustment("adj-2", dec!(10), "entity-9"),
            ],
            &entities(),
            &InvoicingConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            BillingError::UnknownEntity { entity, adjustment_id }
                if entity == "entity-9" && adjustment_id == "adj-2"
        ));
    }
}
