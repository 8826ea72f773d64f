//! Tax-alpha estimation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Estimated tax benefit attributable to harvested losses. This is a
/// point-in-time estimate at the configured rate, not realized cash
/// savings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAlpha {
    pub total_losses_harvested: Decimal,
    pub estimated_tax_alpha: Decimal,
    pub tax_rate: Decimal,
}

/// Roll allowed loss amounts up into a benefit estimate. Disallowed
/// wash-sale amounts must not be included by the caller.
pub fn estimate_alpha(
    allowed_losses: impl IntoIterator<Item = Decimal>,
    tax_rate: Decimal,
) -> TaxAlpha {
    let total: Decimal = allowed_losses.into_iter().sum();
    TaxAlpha {
        total_losses_harvested: total,
        estimated_tax_alpha: total * tax_rate,
        tax_rate,
    }
}
