//! Wash-sale window check.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lot::TaxLot;

/// Days on each side of the sale date. The full window spans 61 days,
/// inclusive of both ends.
pub const WASH_SALE_WINDOW_DAYS: i64 = 30;

/// Result of a wash-sale check. Read-only: recording a violation is the
/// caller's responsibility once it decides how to act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WashSaleCheck {
    pub is_wash_sale: bool,
    pub replacement_lot_ids: Vec<i64>,
    pub disallowed_loss: Decimal,
}

impl WashSaleCheck {
    pub fn clear() -> Self {
        Self {
            is_wash_sale: false,
            replacement_lot_ids: Vec::new(),
            disallowed_loss: Decimal::ZERO,
        }
    }
}

/// Check whether a loss sale on `sale_date` is disallowed.
///
/// Any acquisition of the same position inside
/// `[sale_date - 30d, sale_date + 30d]`, excluding the lots being sold,
/// disallows the entire loss. Disallowance is deliberately all-or-nothing
/// rather than prorated by replaced share count; downstream tax-alpha
/// figures assume this policy.
pub fn check_wash_sale(
    position_lots: &[TaxLot],
    sale_date: NaiveDate,
    loss: Decimal,
    exclude_lot_ids: &[i64],
) -> WashSaleCheck {
    if loss <= Decimal::ZERO {
        return WashSaleCheck::clear();
    }

    let window_start = sale_date - Duration::days(WASH_SALE_WINDOW_DAYS);
    let window_end = sale_date + Duration::days(WASH_SALE_WINDOW_DAYS);

    let replacement_lot_ids: Vec<i64> = position_lots
        .iter()
        .filter(|l| !exclude_lot_ids.contains(&l.id))
        .filter(|l| {
            let acquired = l.acquired_at.date_naive();
            acquired >= window_start && acquired <= window_end
        })
        .map(|l| l.id)
        .collect();

    if replacement_lot_ids.is_empty() {
        WashSaleCheck::clear()
    } else {
        WashSaleCheck {
            is_wash_sale: true,
            replacement_lot_ids,
            disallowed_loss: loss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn lot(id: i64, year: i32, month: u32, day: u32) -> TaxLot {
        TaxLot {
            id,
            owner_id: "owner1".to_string(),
            symbol: "AAPL".to_string(),
            quantity: dec!(3),
            cost_basis_per_unit: dec!(100),
            acquired_at: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            sold: false,
            sold_at: None,
        }
    }

    fn sale_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_replacement_inside_window() {
        // Worked example: replacement purchase within 30 days of a loss sale
        let sale = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let lots = vec![lot(7, 2024, 1, 15)];
        let check = check_wash_sale(&lots, sale, dec!(500), &[]);
        assert!(check.is_wash_sale);
        assert_eq!(check.replacement_lot_ids, vec![7]);
        assert_eq!(check.disallowed_loss, dec!(500));
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        // Exactly 30 days before and after are inside the window
        let before = vec![lot(1, 2024, 5, 16)];
        assert!(check_wash_sale(&before, sale_date(), dec!(100), &[]).is_wash_sale);

        let after = vec![lot(2, 2024, 7, 15)];
        assert!(check_wash_sale(&after, sale_date(), dec!(100), &[]).is_wash_sale);
    }

    #[test]
    fn test_one_day_outside_window() {
        let before = vec![lot(1, 2024, 5, 15)];
        assert!(!check_wash_sale(&before, sale_date(), dec!(100), &[]).is_wash_sale);

        let after = vec![lot(2, 2024, 7, 16)];
        assert!(!check_wash_sale(&after, sale_date(), dec!(100), &[]).is_wash_sale);
    }

    #[test]
    fn test_excludes_lots_being_sold() {
        let lots = vec![lot(1, 2024, 6, 10)];
        let check = check_wash_sale(&lots, sale_date(), dec!(100), &[1]);
        assert!(!check.is_wash_sale);
        assert!(check.replacement_lot_ids.is_empty());
    }

    #[test]
    fn test_no_loss_no_wash_sale() {
        let lots = vec![lot(1, 2024, 6, 10)];
        let check = check_wash_sale(&lots, sale_date(), Decimal::ZERO, &[]);
        assert!(!check.is_wash_sale);
    }
}
