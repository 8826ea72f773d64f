//! External collaborators consumed through narrow interfaces.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current market data for an instrument.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest market price for a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal>;
}

/// Fill returned by a reinvestment purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentFill {
    pub order_id: String,
    pub proxy_symbol: String,
    pub filled_quantity: Decimal,
}

/// Purchases a wash-sale-safe correlated proxy with the realized
/// principal of a harvest. Called only after the harvest transaction has
/// committed; a failure is reported into the log's metadata, never
/// rolled back.
#[async_trait]
pub trait ReinvestmentBroker: Send + Sync {
    async fn reinvest(
        &self,
        owner_id: &str,
        proxy_symbol: &str,
        principal: Decimal,
    ) -> Result<ReinvestmentFill>;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}
