//! Shared test doubles for the external collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Mutex;

use crate::sources::{PriceSource, ReinvestmentBroker, ReinvestmentFill};
use crate::store::LotStore;

#[derive(Default)]
pub struct FixedPrices {
    prices: DashMap<String, Decimal>,
}

impl FixedPrices {
    pub fn set(&self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .get(symbol)
            .map(|p| *p)
            .ok_or_else(|| anyhow!("no price for {symbol}"))
    }
}

/// Consumes one unit from a lot the first time it is asked for a price,
/// simulating a concurrent writer racing the harvest.
pub struct SabotagingPrices {
    store: LotStore,
    lot_id: i64,
    price: Decimal,
    fired: Mutex<bool>,
}

impl SabotagingPrices {
    pub fn new(store: LotStore, lot_id: i64, price: Decimal) -> Self {
        Self {
            store,
            lot_id,
            price,
            fired: Mutex::new(false),
        }
    }
}

#[async_trait]
impl PriceSource for SabotagingPrices {
    async fn latest_price(&self, _symbol: &str) -> Result<Decimal> {
        let first_call = {
            let mut fired = self.fired.lock().unwrap();
            !std::mem::replace(&mut *fired, true)
        };
        if first_call {
            self.store
                .record_sale(self.lot_id, Decimal::ONE, chrono::Utc::now())
                .await
                .map_err(|e| anyhow!(e.to_string()))?;
        }
        Ok(self.price)
    }
}

pub struct MockBroker {
    fail_with: Option<String>,
    last_principal: Mutex<Option<Decimal>>,
}

impl MockBroker {
    pub fn succeeding() -> Self {
        Self {
            fail_with: None,
            last_principal: Mutex::new(None),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            last_principal: Mutex::new(None),
        }
    }

    pub fn last_principal(&self) -> Option<Decimal> {
        *self.last_principal.lock().unwrap()
    }
}

#[async_trait]
impl ReinvestmentBroker for MockBroker {
    async fn reinvest(
        &self,
        _owner_id: &str,
        proxy_symbol: &str,
        principal: Decimal,
    ) -> Result<ReinvestmentFill> {
        *self.last_principal.lock().unwrap() = Some(principal);
        if let Some(reason) = &self.fail_with {
            return Err(anyhow!("{reason}"));
        }
        Ok(ReinvestmentFill {
            order_id: "mock-order-1".to_string(),
            proxy_symbol: proxy_symbol.to_string(),
            filled_quantity: Decimal::ONE,
        })
    }

    fn broker_name(&self) -> &str {
        "mock"
    }
}
