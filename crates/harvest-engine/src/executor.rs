//! Harvest execution: select lots, check wash-sale exposure, mutate the
//! ledger atomically, record the log, then reinvest.
//!
//! At most one harvest may be in flight per (owner, symbol); a second
//! attempt fails fast with `ConcurrentModification` and retry policy is
//! left to the caller.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tax_lot_core::{
    check_wash_sale, select_lots, HarvestConfig, HarvestError, LotAllocation,
};

use crate::models::{
    HarvestExecutionLog, HarvestRequest, LotSelection, NewExecutionLog, NewViolation,
    ReinvestmentOutcome,
};
use crate::sources::{PriceSource, ReinvestmentBroker};
use crate::store::LotStore;

type PositionKey = (String, String);

pub struct HarvestExecutor {
    store: LotStore,
    prices: Arc<dyn PriceSource>,
    broker: Option<Arc<dyn ReinvestmentBroker>>,
    config: HarvestConfig,
    in_flight: DashMap<PositionKey, ()>,
}

/// Removes the position from the in-flight registry when the harvest
/// attempt ends, success or not.
struct InFlightGuard<'a> {
    registry: &'a DashMap<PositionKey, ()>,
    key: PositionKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

impl HarvestExecutor {
    pub fn new(
        store: LotStore,
        prices: Arc<dyn PriceSource>,
        broker: Option<Arc<dyn ReinvestmentBroker>>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            store,
            prices,
            broker,
            config,
            in_flight: DashMap::new(),
        }
    }

    fn lock_position(
        &self,
        owner_id: &str,
        symbol: &str,
    ) -> Result<InFlightGuard<'_>, HarvestError> {
        let key = (owner_id.to_string(), symbol.to_string());
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => Err(HarvestError::ConcurrentModification {
                owner_id: owner_id.to_string(),
                symbol: symbol.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    registry: &self.in_flight,
                    key,
                })
            }
        }
    }

    /// Run a harvest end to end and return its execution log.
    ///
    /// A detected wash sale does not block the sale: the violation is
    /// recorded and the disallowed amount is split out of the allowed
    /// loss in the log. Blocking is caller policy.
    pub async fn execute(
        &self,
        request: HarvestRequest,
    ) -> Result<HarvestExecutionLog, HarvestError> {
        let _guard = self.lock_position(&request.owner_id, &request.symbol)?;
        tracing::info!(
            owner = %request.owner_id,
            symbol = %request.symbol,
            "harvest initiated"
        );

        let open = self
            .store
            .open_lots(&request.owner_id, &request.symbol)
            .await?;
        if open.is_empty() {
            return Err(HarvestError::UnknownPosition {
                owner_id: request.owner_id.clone(),
                symbol: request.symbol.clone(),
            });
        }

        let allocations = match &request.selection {
            LotSelection::Explicit { lot_ids } => {
                if lot_ids.is_empty() {
                    return Err(HarvestError::EmptySelection);
                }
                let mut allocations = Vec::with_capacity(lot_ids.len());
                for id in lot_ids {
                    let lot = open
                        .iter()
                        .find(|l| l.id == *id)
                        .ok_or(HarvestError::UnknownLot(*id))?;
                    // Manual selection sells each named lot in full
                    allocations.push(LotAllocation {
                        lot: lot.clone(),
                        quantity: lot.quantity,
                    });
                }
                allocations
            }
            LotSelection::ByQuantity { quantity, method } => select_lots(
                &open,
                *quantity,
                method.unwrap_or(self.config.default_method),
            )?,
        };
        tracing::debug!(lots = allocations.len(), "lots selected");

        let price = self
            .prices
            .latest_price(&request.symbol)
            .await
            .map_err(|e| HarvestError::PriceUnavailable {
                symbol: request.symbol.clone(),
                reason: e.to_string(),
            })?;

        let quantity_sold: Decimal = allocations.iter().map(|a| a.quantity).sum();
        let loss: Decimal = allocations
            .iter()
            .map(|a| a.quantity * a.lot.loss_per_unit(price))
            .sum();
        let lot_ids: Vec<i64> = allocations.iter().map(|a| a.lot.id).collect();

        let executed_at = chrono::Utc::now();
        let sale_date = executed_at.date_naive();

        let position_lots = self
            .store
            .lots_for_position(&request.owner_id, &request.symbol)
            .await?;
        let wash_check = check_wash_sale(&position_lots, sale_date, loss, &lot_ids);
        let (allowed_loss, disallowed_loss) = if wash_check.is_wash_sale {
            tracing::warn!(
                symbol = %request.symbol,
                disallowed = %wash_check.disallowed_loss,
                replacements = ?wash_check.replacement_lot_ids,
                "wash sale detected, loss disallowed"
            );
            (Decimal::ZERO, wash_check.disallowed_loss)
        } else {
            (loss, Decimal::ZERO)
        };

        let log = NewExecutionLog {
            owner_id: request.owner_id.clone(),
            symbol: request.symbol.clone(),
            lot_ids: lot_ids.clone(),
            quantity_sold,
            allowed_loss,
            disallowed_loss,
            metadata: serde_json::json!({}),
            executed_at,
        };

        // The atomic unit: lot mutation + executed log, bounded by the
        // configured budget. On any abort a failed log is written and no
        // lot mutation is visible.
        let mutation = self.store.apply_harvest(&allocations, &log);
        let log_id = match tokio::time::timeout(self.config.mutation_timeout, mutation).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "harvest mutation aborted");
                self.store.record_failed_harvest(&log).await?;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!("harvest mutation exceeded its budget");
                self.store.record_failed_harvest(&log).await?;
                return Err(HarvestError::Timeout);
            }
        };
        tracing::info!(
            log_id,
            %quantity_sold,
            %allowed_loss,
            %disallowed_loss,
            "harvest recorded"
        );

        if wash_check.is_wash_sale {
            self.store
                .record_violation(&NewViolation {
                    owner_id: request.owner_id.clone(),
                    symbol: request.symbol.clone(),
                    sale_date,
                    disallowed_loss: wash_check.disallowed_loss,
                    replacement_lot_ids: wash_check.replacement_lot_ids.clone(),
                })
                .await?;
        }

        self.store
            .mark_position_harvested(&request.owner_id, &request.symbol)
            .await?;

        // Reinvestment runs strictly after commit; its failure is a
        // warning in the log's metadata, never a rollback.
        if let (Some(broker), Some(proxy)) = (&self.broker, request.reinvest_into.as_deref()) {
            let principal = price * quantity_sold;
            let outcome = match broker.reinvest(&request.owner_id, proxy, principal).await {
                Ok(fill) => {
                    tracing::info!(
                        broker = broker.broker_name(),
                        %proxy,
                        %principal,
                        order = %fill.order_id,
                        "reinvested harvest proceeds"
                    );
                    ReinvestmentOutcome {
                        proxy_symbol: proxy.to_string(),
                        principal,
                        order_id: Some(fill.order_id),
                        succeeded: true,
                        message: format!("filled {} {}", fill.filled_quantity, proxy),
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        broker = broker.broker_name(),
                        %proxy,
                        error = %e,
                        "reinvestment failed after committed harvest"
                    );
                    ReinvestmentOutcome {
                        proxy_symbol: proxy.to_string(),
                        principal,
                        order_id: None,
                        succeeded: false,
                        message: e.to_string(),
                    }
                }
            };
            let metadata = serde_json::json!({ "reinvestment": outcome });
            self.store.update_log_metadata(log_id, &metadata).await?;
        }

        self.store.get_log(log_id).await
    }
}
