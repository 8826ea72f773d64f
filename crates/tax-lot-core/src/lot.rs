use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::HarvestError;

/// One discrete acquisition of a quantity of an instrument.
///
/// A lot is the permanent audit record of its acquisition: partial sales
/// reduce `quantity` in place, the row is never split or deleted, and once
/// `sold` is set the quantity is exactly zero and the lot is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLot {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis_per_unit: Decimal,
    pub acquired_at: DateTime<Utc>,
    pub sold: bool,
    pub sold_at: Option<DateTime<Utc>>,
}

impl TaxLot {
    pub fn is_open(&self) -> bool {
        !self.sold && self.quantity > Decimal::ZERO
    }

    pub fn total_cost_basis(&self) -> Decimal {
        self.quantity * self.cost_basis_per_unit
    }

    /// Loss per unit at the given market price. Gain lots contribute
    /// zero; they may still be sold but never count toward realized loss.
    pub fn loss_per_unit(&self, market_price: Decimal) -> Decimal {
        if self.cost_basis_per_unit > market_price {
            self.cost_basis_per_unit - market_price
        } else {
            Decimal::ZERO
        }
    }

    /// Unrealized gain (positive) or loss (negative) at the given price.
    pub fn unrealized_pnl(&self, market_price: Decimal) -> Decimal {
        (market_price - self.cost_basis_per_unit) * self.quantity
    }
}

/// Lot selection method. Closed set with exhaustive matching; unknown
/// string tags are rejected at the surface instead of falling through
/// to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionMethod {
    /// Oldest acquisition first.
    Fifo,
    /// Newest acquisition first.
    Lifo,
    /// Highest cost basis first. Default for harvesting since it
    /// maximizes realized loss per unit sold.
    Hifo,
}

impl Default for SelectionMethod {
    fn default() -> Self {
        Self::Hifo
    }
}

impl FromStr for SelectionMethod {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "HIFO" => Ok(Self::Hifo),
            other => Err(HarvestError::UnknownMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMethod::Fifo => write!(f, "FIFO"),
            SelectionMethod::Lifo => write!(f, "LIFO"),
            SelectionMethod::Hifo => write!(f, "HIFO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn lot(cost: Decimal, qty: Decimal) -> TaxLot {
        TaxLot {
            id: 1,
            owner_id: "owner1".to_string(),
            symbol: "AAPL".to_string(),
            quantity: qty,
            cost_basis_per_unit: cost,
            acquired_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            sold: false,
            sold_at: None,
        }
    }

    #[test]
    fn test_loss_per_unit() {
        let l = lot(dec!(150), dec!(10));
        assert_eq!(l.loss_per_unit(dec!(100)), dec!(50));
        // Gain lot contributes zero loss
        assert_eq!(l.loss_per_unit(dec!(160)), Decimal::ZERO);
    }

    #[test]
    fn test_open_state() {
        let mut l = lot(dec!(150), dec!(10));
        assert!(l.is_open());
        l.quantity = Decimal::ZERO;
        l.sold = true;
        assert!(!l.is_open());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("hifo".parse::<SelectionMethod>().unwrap(), SelectionMethod::Hifo);
        assert_eq!("FIFO".parse::<SelectionMethod>().unwrap(), SelectionMethod::Fifo);
        assert!(matches!(
            "AVERAGE".parse::<SelectionMethod>(),
            Err(HarvestError::UnknownMethod(_))
        ));
    }
}
