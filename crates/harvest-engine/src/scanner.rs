//! Opportunity scanner: finds positions worth harvesting.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tax_lot_core::{HarvestConfig, HarvestError, TaxLot};

use crate::models::HarvestOpportunity;
use crate::sources::PriceSource;
use crate::store::LotStore;

pub struct OpportunityScanner {
    store: LotStore,
    prices: Arc<dyn PriceSource>,
    config: HarvestConfig,
}

impl OpportunityScanner {
    pub fn new(store: LotStore, prices: Arc<dyn PriceSource>, config: HarvestConfig) -> Self {
        Self {
            store,
            prices,
            config,
        }
    }

    /// Walk the owner's open lots and record an opportunity for every
    /// position whose harvestable loss clears the configured threshold.
    /// Positions without a price are skipped, not failed.
    pub async fn scan(&self, owner_id: &str) -> Result<Vec<HarvestOpportunity>, HarvestError> {
        let open = self.store.open_lots_for_owner(owner_id).await?;

        let mut by_symbol: BTreeMap<String, Vec<TaxLot>> = BTreeMap::new();
        for lot in open {
            by_symbol.entry(lot.symbol.clone()).or_default().push(lot);
        }

        let mut detected = Vec::new();
        let now = Utc::now();

        for (symbol, lots) in by_symbol {
            let price = match self.prices.latest_price(&symbol).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "no price for position, skipping scan");
                    continue;
                }
            };

            // Harvestable loss: loss lots only, gain lots contribute zero
            let loss: Decimal = lots
                .iter()
                .map(|l| l.quantity * l.loss_per_unit(price))
                .sum();

            if loss < self.config.min_loss_threshold {
                continue;
            }

            let id = self
                .store
                .upsert_opportunity(owner_id, &symbol, loss, now)
                .await?;
            if let Some(opportunity) = self.store.get_opportunity(id).await? {
                detected.push(opportunity);
            }
        }

        detected.sort_by(|a, b| b.unrealized_loss.cmp(&a.unrealized_loss));
        tracing::info!(owner = %owner_id, count = detected.len(), "scan complete");

        Ok(detected)
    }
}
