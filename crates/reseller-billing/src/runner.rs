//! Customer fan-out
//!
//! One tokio task per customer, bounded by a semaphore. Each task reports
//! through its own join handle; results come back in input order and a
//! failing customer never affects the others.

use reseller_common::CatalogStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::InvoicingConfig;
use crate::engine::{BillingStores, CustomerTask, InvoicingEngine};
use crate::pricing::Catalog;
use crate::rows::InvoiceRow;
use crate::{BillingError, BillingResult};

/// Result of one customer's computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInvoiceRows {
    /// Customer id
    pub customer_id: String,
    /// Product family of the rows
    pub product_type: String,
    /// Empty when the customer failed
    pub rows: Vec<InvoiceRow>,
    /// Failure message, if any
    pub error: Option<String>,
}

/// Runs the engine over many customers
pub struct InvoicingRunner {
    engine: Arc<InvoicingEngine>,
    limiter: Arc<Semaphore>,
}

impl InvoicingRunner {
    /// Runner sized by `max_concurrent_customers`
    pub fn new(engine: InvoicingEngine) -> Self {
        let permits = engine.config().max_concurrent_customers.max(1);
        Self {
            engine: Arc::new(engine),
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Build a runner with the catalog preloaded for the whole run
    pub async fn load(
        config: InvoicingConfig,
        catalog_store: &dyn CatalogStore,
        stores: BillingStores,
    ) -> BillingResult<Self> {
        let entries = catalog_store.load().await?;
        tracing::info!("[g-suite] loaded {} catalog entries", entries.len());
        Ok(Self::new(InvoicingEngine::new(config, Catalog::new(entries), stores)))
    }

    /// Compute every task; one result per task, in task order
    pub async fn run(&self, tasks: Vec<CustomerTask>) -> Vec<ProductInvoiceRows> {
        let product_type = self.engine.config().product_type.clone();

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let engine = self.engine.clone();
                let limiter = self.limiter.clone();
                let customer_id = task.customer_id.clone();

                let handle = tokio::spawn(async move {
                    let _permit = limiter
                        .acquire_owned()
                        .await
                        .map_err(|e| BillingError::InvalidConfig(e.to_string()))?;

                    tracing::info!("[g-suite] computing invoice rows for {}", task.customer_id);
                    engine.compute_product_invoice_rows(&task).await
                });
                (customer_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (customer_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(e) => Err(format!("customer task aborted: {}", e)),
            };

            let result = match outcome {
                Ok(rows) => {
                    tracing::info!("[g-suite] {} produced {} rows", customer_id, rows.len());
                    ProductInvoiceRows {
                        customer_id,
                        product_type: product_type.clone(),
                        rows,
                        error: None,
                    }
                }
                Err(error) => {
                    tracing::error!("[g-suite] failed to compute rows for {}: {}", customer_id, error);
                    ProductInvoiceRows {
                        customer_id,
                        product_type: product_type.clone(),
                        rows: Vec::new(),
                        error: Some(error),
                    }
                }
            };
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TimeIndex;
    use crate::fixtures::*;
    use reseller_common::InMemoryCatalogStore;

    fn customer_day(customer: &str, sub: &str, d: u32) -> reseller_common::DailySnapshot {
        let mut snap = flexible_day(sub, ymd(2024, 3, d), 2);
        snap.customer_id = customer.into();
        snap
    }

    fn customer_task(customer: &str) -> CustomerTask {
        let mut t = task(TimeIndex::Final);
        t.customer_id = customer.into();
        t
    }

    async fn runner(world: &TestWorld, max_concurrent_customers: usize) -> InvoicingRunner {
        let config = InvoicingConfig {
            max_concurrent_customers,
            ..Default::default()
        };
        let catalog_store = InMemoryCatalogStore::new(catalog_entries());
        InvoicingRunner::load(config, &catalog_store, world.stores())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_in_task_order_with_isolated_failures() {
        let world = TestWorld::new();
        for d in 1..=3 {
            world.snapshots.insert(customer_day("cust-a", "sub-a", d));
            world.snapshots.insert(customer_day("cust-c", "sub-c", d));
        }
        let mut broken = customer_day("cust-b", "sub-b", 1);
        broken.subscription.as_mut().unwrap().plan = None;
        world.snapshots.insert(broken);

        let results = runner(&world, 2)
            .await
            .run(vec![
                customer_task("cust-a"),
                customer_task("cust-b"),
                customer_task("cust-c"),
            ])
            .await;

        let ids: Vec<_> = results.iter().map(|r| r.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["cust-a", "cust-b", "cust-c"]);

        assert!(results[0].error.is_none());
        assert_eq!(results[0].rows.len(), 1);
        assert_eq!(results[0].product_type, "g-suite");

        assert!(results[1].rows.is_empty());
        assert!(results[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("invalid subscription g-suite-sub-b")));

        assert!(results[2].error.is_none());
        assert_eq!(results[2].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_single_permit_completes_all_customers() {
        let world = TestWorld::new();
        let customers: Vec<String> = (0..5).map(|i| format!("cust-{}", i)).collect();
        for c in &customers {
            world.snapshots.insert(customer_day(c, &format!("sub-{}", c), 1));
        }

        let results = runner(&world, 1)
            .await
            .run(customers.iter().map(|c| customer_task(c)).collect())
            .await;

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.error.is_none() && r.rows.len() == 1));
    }

    #[tokio::test]
    async fn test_empty_run() {
        let world = TestWorld::new();
        assert!(runner(&world, 4).await.run(Vec::new()).await.is_empty());
    }
}
