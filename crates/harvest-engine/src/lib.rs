//! Harvest Engine
//!
//! Storage-backed tax-lot ledger and wash-sale-compliant harvesting:
//! the durable `LotStore`, the transactional `HarvestExecutor`, the
//! opportunity scanner, and the caller-facing `HarvestService`. Pure
//! selection/wash-sale/alpha math lives in `tax-lot-core`.

pub mod db;
pub mod executor;
pub mod models;
pub mod scanner;
pub mod service;
pub mod sources;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use db::HarvestDb;
pub use executor::HarvestExecutor;
pub use models::{
    ExecutionStatus, HarvestExecutionLog, HarvestOpportunity, HarvestRequest, LotSelection,
    NewExecutionLog, NewViolation, OpportunityStatus, ReinvestmentOutcome, WashSaleViolation,
};
pub use scanner::OpportunityScanner;
pub use service::HarvestService;
pub use sources::{PriceSource, ReinvestmentBroker, ReinvestmentFill};
pub use store::LotStore;
