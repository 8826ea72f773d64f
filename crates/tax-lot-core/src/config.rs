use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lot::SelectionMethod;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Lot selection method when the caller does not pick lots explicitly.
    pub default_method: SelectionMethod,
    /// Long-term capital-gains rate used for tax-alpha estimates.
    pub tax_rate: Decimal,
    /// Minimum unrealized loss for the scanner to surface an opportunity.
    pub min_loss_threshold: Decimal,
    /// Budget for the atomic lot-mutation step of a harvest.
    pub mutation_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            default_method: SelectionMethod::Hifo,
            tax_rate: Decimal::new(20, 2),
            min_loss_threshold: Decimal::from(50),
            mutation_timeout: Duration::from_secs(5),
        }
    }
}
