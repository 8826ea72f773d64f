//! Lot selection for liquidation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::lot::{SelectionMethod, TaxLot};

/// Quantity to consume from a single lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotAllocation {
    pub lot: TaxLot,
    pub quantity: Decimal,
}

/// Choose an ordered subset of open lots covering `quantity` units.
///
/// Pure computation with no side effects; the caller applies the
/// allocation. Fails with `InsufficientLots` before allocating anything
/// when the open lots cannot cover the request. On success the
/// allocations sum exactly to `quantity` and no lot is allocated beyond
/// its current balance.
pub fn select_lots(
    open_lots: &[TaxLot],
    quantity: Decimal,
    method: SelectionMethod,
) -> Result<Vec<LotAllocation>, HarvestError> {
    if quantity <= Decimal::ZERO {
        return Err(HarvestError::InvalidQuantity(quantity));
    }

    let mut candidates: Vec<&TaxLot> = open_lots.iter().filter(|l| l.is_open()).collect();

    let available: Decimal = candidates.iter().map(|l| l.quantity).sum();
    if available < quantity {
        return Err(HarvestError::InsufficientLots {
            requested: quantity,
            available,
        });
    }

    // Ties on the primary key fall back to ascending acquired-at, then
    // lot id, so selection is fully deterministic.
    match method {
        SelectionMethod::Fifo => {
            candidates.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at).then(a.id.cmp(&b.id)))
        }
        SelectionMethod::Lifo => {
            candidates.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then(a.id.cmp(&b.id)))
        }
        SelectionMethod::Hifo => candidates.sort_by(|a, b| {
            b.cost_basis_per_unit
                .cmp(&a.cost_basis_per_unit)
                .then(a.acquired_at.cmp(&b.acquired_at))
                .then(a.id.cmp(&b.id))
        }),
    }

    let mut remaining = quantity;
    let mut allocations = Vec::new();
    for lot in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = lot.quantity.min(remaining);
        remaining -= take;
        allocations.push(LotAllocation {
            lot: lot.clone(),
            quantity: take,
        });
    }
    debug_assert!(remaining.is_zero());

    Ok(allocations)
}
