use rust_decimal::Decimal;
use thiserror::Error;

/// Every fallible engine operation returns one of these; storage
/// failures are wrapped so callers never see raw database errors.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    #[error("Invalid cost basis: {0}")]
    InvalidCostBasis(Decimal),

    #[error("Unknown selection method: {0}")]
    UnknownMethod(String),

    #[error("No open lots for {owner_id}/{symbol}")]
    UnknownPosition { owner_id: String, symbol: String },

    #[error("Unknown or closed lot: {0}")]
    UnknownLot(i64),

    #[error("No lots named in explicit selection")]
    EmptySelection,

    #[error("Unknown opportunity: {0}")]
    UnknownOpportunity(i64),

    #[error("Insufficient lots: requested {requested}, available {available}")]
    InsufficientLots {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Harvest already in flight for {owner_id}/{symbol}")]
    ConcurrentModification { owner_id: String, symbol: String },

    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    #[error("Harvest timed out during lot mutation")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HarvestError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
