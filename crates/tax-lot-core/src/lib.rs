//! Tax-Lot Core
//!
//! Pure domain logic for tax-lot accounting and loss harvesting:
//! lot selection (FIFO/LIFO/HIFO), wash-sale window checks, and
//! tax-alpha estimation. Storage and orchestration live in the
//! `harvest-engine` crate.

pub mod alpha;
pub mod config;
pub mod error;
pub mod lot;
pub mod selection;
pub mod wash_sale;

pub use alpha::{estimate_alpha, TaxAlpha};
pub use config::HarvestConfig;
pub use error::HarvestError;
pub use lot::{SelectionMethod, TaxLot};
pub use selection::{select_lots, LotAllocation};
pub use wash_sale::{check_wash_sale, WashSaleCheck, WASH_SALE_WINDOW_DAYS};
