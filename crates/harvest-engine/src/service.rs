//! Caller-facing surface of the harvesting engine.

use std::sync::Arc;
use tax_lot_core::{estimate_alpha, HarvestConfig, HarvestError, TaxAlpha};

use crate::db::HarvestDb;
use crate::executor::HarvestExecutor;
use crate::models::{HarvestExecutionLog, HarvestOpportunity, HarvestRequest, WashSaleViolation};
use crate::scanner::OpportunityScanner;
use crate::sources::{PriceSource, ReinvestmentBroker};
use crate::store::LotStore;

/// One engine instance per process/request context, holding injected
/// references to its collaborators. Every operation returns a structured
/// result; raw storage errors never cross this boundary.
pub struct HarvestService {
    store: LotStore,
    scanner: OpportunityScanner,
    executor: HarvestExecutor,
    config: HarvestConfig,
}

impl HarvestService {
    pub fn new(
        db: HarvestDb,
        prices: Arc<dyn PriceSource>,
        broker: Option<Arc<dyn ReinvestmentBroker>>,
        config: HarvestConfig,
    ) -> Self {
        let store = LotStore::new(db);
        Self {
            scanner: OpportunityScanner::new(store.clone(), prices.clone(), config.clone()),
            executor: HarvestExecutor::new(store.clone(), prices, broker, config.clone()),
            store,
            config,
        }
    }

    /// Direct access to the lot ledger (acquisition/sale recording).
    pub fn store(&self) -> &LotStore {
        &self.store
    }

    /// Detect harvest opportunities from current unrealized losses.
    pub async fn scan(&self, owner_id: &str) -> Result<Vec<HarvestOpportunity>, HarvestError> {
        self.scanner.scan(owner_id).await
    }

    pub async fn get_opportunities(
        &self,
        owner_id: &str,
    ) -> Result<Vec<HarvestOpportunity>, HarvestError> {
        self.store.opportunities_for_owner(owner_id).await
    }

    /// Execute a harvest; see `HarvestExecutor` for semantics.
    pub async fn execute(
        &self,
        request: HarvestRequest,
    ) -> Result<HarvestExecutionLog, HarvestError> {
        self.executor.execute(request).await
    }

    /// Decline an opportunity without touching any lot.
    pub async fn reject_opportunity(&self, id: i64) -> Result<(), HarvestError> {
        self.store.reject_opportunity(id).await
    }

    pub async fn get_violations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<WashSaleViolation>, HarvestError> {
        self.store.violations_for_owner(owner_id).await
    }

    /// Estimated tax benefit across the owner's executed harvests.
    /// Only allowed losses count; disallowed wash-sale amounts never do.
    pub async fn get_alpha(&self, owner_id: &str) -> Result<TaxAlpha, HarvestError> {
        let losses = self.store.executed_allowed_losses(owner_id).await?;
        Ok(estimate_alpha(losses, self.config.tax_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LotSelection;
    use crate::testutil::FixedPrices;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    async fn setup() -> (HarvestService, Arc<FixedPrices>) {
        let db = HarvestDb::new("sqlite::memory:").await.unwrap();
        let prices = Arc::new(FixedPrices::default());
        let service = HarvestService::new(db, prices.clone(), None, HarvestConfig::default());
        (service, prices)
    }

    #[tokio::test]
    async fn test_scan_execute_alpha_flow() {
        let (service, prices) = setup().await;
        service
            .store()
            .record_acquisition(
                "owner1",
                "AAPL",
                dec!(10),
                dec!(150),
                Utc::now() - Duration::days(400),
            )
            .await
            .unwrap();
        prices.set("AAPL", dec!(100));

        let detected = service.scan("owner1").await.unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].unrealized_loss, dec!(500));

        let log = service
            .execute(HarvestRequest {
                owner_id: "owner1".to_string(),
                symbol: "AAPL".to_string(),
                selection: LotSelection::ByQuantity {
                    quantity: dec!(10),
                    method: None,
                },
                reinvest_into: None,
            })
            .await
            .unwrap();
        assert_eq!(log.allowed_loss, dec!(500));

        let alpha = service.get_alpha("owner1").await.unwrap();
        assert_eq!(alpha.total_losses_harvested, dec!(500));
        assert_eq!(alpha.estimated_tax_alpha, dec!(100.00));
    }

    #[tokio::test]
    async fn test_get_alpha_idempotent() {
        let (service, prices) = setup().await;
        service
            .store()
            .record_acquisition(
                "owner1",
                "AAPL",
                dec!(4),
                dec!(150),
                Utc::now() - Duration::days(100),
            )
            .await
            .unwrap();
        prices.set("AAPL", dec!(100));

        service
            .execute(HarvestRequest {
                owner_id: "owner1".to_string(),
                symbol: "AAPL".to_string(),
                selection: LotSelection::ByQuantity {
                    quantity: dec!(4),
                    method: None,
                },
                reinvest_into: None,
            })
            .await
            .unwrap();

        let first = service.get_alpha("owner1").await.unwrap();
        let second = service.get_alpha("owner1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_alpha_empty_owner() {
        let (service, _) = setup().await;
        let alpha = service.get_alpha("nobody").await.unwrap();
        assert_eq!(alpha.total_losses_harvested, dec!(0));
    }
}
