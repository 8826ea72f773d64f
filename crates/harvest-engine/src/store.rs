//! Durable tax-lot ledger over SQLite.
//!
//! All decimal columns are TEXT and cross into `rust_decimal` at the row
//! boundary. Quantity mutations go through optimistic
//! `WHERE quantity = <expected>` guards so a concurrent writer can never
//! be silently overwritten.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tax_lot_core::{HarvestError, LotAllocation, TaxLot};

use crate::db::HarvestDb;
use crate::models::{
    parse_decimal, ExecutionStatus, HarvestExecutionLog, HarvestOpportunity, LogRow, LotRow,
    NewExecutionLog, NewViolation, OpportunityRow, ViolationRow, WashSaleViolation,
};

type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Clone)]
pub struct LotStore {
    db: HarvestDb,
}

impl LotStore {
    pub fn new(db: HarvestDb) -> Self {
        Self { db }
    }

    // -- tax lots ----------------------------------------------------------

    /// Record an acquisition (external event). This is the only way a lot
    /// enters the ledger.
    pub async fn record_acquisition(
        &self,
        owner_id: &str,
        symbol: &str,
        quantity: Decimal,
        cost_basis_per_unit: Decimal,
        acquired_at: DateTime<Utc>,
    ) -> Result<i64> {
        if quantity <= Decimal::ZERO {
            return Err(HarvestError::InvalidQuantity(quantity));
        }
        if cost_basis_per_unit <= Decimal::ZERO {
            return Err(HarvestError::InvalidCostBasis(cost_basis_per_unit));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO tax_lots (owner_id, symbol, quantity, cost_basis_per_unit, acquired_at, sold)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(owner_id)
        .bind(symbol)
        .bind(quantity.to_string())
        .bind(cost_basis_per_unit.to_string())
        .bind(acquired_at)
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_lot(&self, id: i64) -> Result<Option<TaxLot>> {
        let row = sqlx::query_as::<_, LotRow>("SELECT * FROM tax_lots WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(HarvestError::storage)?;

        row.map(TaxLot::try_from).transpose()
    }

    /// Every lot for a position, open or sold. The wash-sale window scan
    /// reads acquisitions from this set.
    pub async fn lots_for_position(&self, owner_id: &str, symbol: &str) -> Result<Vec<TaxLot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            "SELECT * FROM tax_lots WHERE owner_id = ? AND symbol = ? ORDER BY acquired_at, id",
        )
        .bind(owner_id)
        .bind(symbol)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        rows.into_iter().map(TaxLot::try_from).collect()
    }

    pub async fn open_lots(&self, owner_id: &str, symbol: &str) -> Result<Vec<TaxLot>> {
        let lots = self.lots_for_position(owner_id, symbol).await?;
        Ok(lots.into_iter().filter(|l| l.is_open()).collect())
    }

    pub async fn open_lots_for_owner(&self, owner_id: &str) -> Result<Vec<TaxLot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            "SELECT * FROM tax_lots WHERE owner_id = ? AND sold = 0 ORDER BY symbol, acquired_at, id",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        let lots: Result<Vec<TaxLot>> = rows.into_iter().map(TaxLot::try_from).collect();
        Ok(lots?.into_iter().filter(|l| l.is_open()).collect())
    }

    /// Record a direct (non-harvest) sale against a single lot. The lot's
    /// quantity is reduced in place; at exactly zero it is marked sold.
    pub async fn record_sale(
        &self,
        lot_id: i64,
        quantity: Decimal,
        sold_at: DateTime<Utc>,
    ) -> Result<TaxLot> {
        if quantity <= Decimal::ZERO {
            return Err(HarvestError::InvalidQuantity(quantity));
        }

        let lot = self
            .get_lot(lot_id)
            .await?
            .filter(|l| l.is_open())
            .ok_or(HarvestError::UnknownLot(lot_id))?;

        if quantity > lot.quantity {
            return Err(HarvestError::InsufficientLots {
                requested: quantity,
                available: lot.quantity,
            });
        }

        let new_quantity = lot.quantity - quantity;
        let now_sold = new_quantity.is_zero();

        let result = sqlx::query(
            r#"
            UPDATE tax_lots SET quantity = ?, sold = ?, sold_at = ?
            WHERE id = ? AND sold = 0 AND quantity = ?
            "#,
        )
        .bind(new_quantity.to_string())
        .bind(now_sold)
        .bind(now_sold.then_some(sold_at))
        .bind(lot_id)
        .bind(lot.quantity.to_string())
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        if result.rows_affected() != 1 {
            return Err(HarvestError::ConcurrentModification {
                owner_id: lot.owner_id,
                symbol: lot.symbol,
            });
        }

        self.get_lot(lot_id)
            .await?
            .ok_or(HarvestError::UnknownLot(lot_id))
    }

    /// Apply a harvest as a single transaction: reduce every allocated
    /// lot and insert the `executed` log row, or change nothing at all.
    ///
    /// Each lot update carries the quantity observed at selection time;
    /// if any lot changed underneath us the whole batch rolls back.
    pub async fn apply_harvest(
        &self,
        allocations: &[LotAllocation],
        log: &NewExecutionLog,
    ) -> Result<i64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(HarvestError::storage)?;

        for alloc in allocations {
            let new_quantity = alloc.lot.quantity - alloc.quantity;
            if new_quantity < Decimal::ZERO {
                return Err(HarvestError::InsufficientLots {
                    requested: alloc.quantity,
                    available: alloc.lot.quantity,
                });
            }
            let now_sold = new_quantity.is_zero();

            let result = sqlx::query(
                r#"
                UPDATE tax_lots SET quantity = ?, sold = ?, sold_at = ?
                WHERE id = ? AND sold = 0 AND quantity = ?
                "#,
            )
            .bind(new_quantity.to_string())
            .bind(now_sold)
            .bind(now_sold.then_some(log.executed_at))
            .bind(alloc.lot.id)
            .bind(alloc.lot.quantity.to_string())
            .execute(&mut *tx)
            .await
            .map_err(HarvestError::storage)?;

            if result.rows_affected() != 1 {
                // Lot changed since selection; dropping tx rolls everything back
                return Err(HarvestError::ConcurrentModification {
                    owner_id: log.owner_id.clone(),
                    symbol: log.symbol.clone(),
                });
            }
        }

        let log_id = Self::insert_log(&mut tx, log, ExecutionStatus::Executed).await?;

        tx.commit().await.map_err(HarvestError::storage)?;
        Ok(log_id)
    }

    // -- execution logs ----------------------------------------------------

    async fn insert_log(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        log: &NewExecutionLog,
        status: ExecutionStatus,
    ) -> Result<i64> {
        let lot_ids = serde_json::to_string(&log.lot_ids).map_err(HarvestError::storage)?;
        let metadata = serde_json::to_string(&log.metadata).map_err(HarvestError::storage)?;

        let result = sqlx::query(
            r#"
            INSERT INTO harvest_execution_logs
                (owner_id, symbol, lot_ids, quantity_sold, allowed_loss, disallowed_loss, status, metadata, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.owner_id)
        .bind(&log.symbol)
        .bind(lot_ids)
        .bind(log.quantity_sold.to_string())
        .bind(log.allowed_loss.to_string())
        .bind(log.disallowed_loss.to_string())
        .bind(status.as_str())
        .bind(metadata)
        .bind(log.executed_at)
        .execute(&mut **tx)
        .await
        .map_err(HarvestError::storage)?;

        Ok(result.last_insert_rowid())
    }

    /// Record a harvest attempt that aborted before any mutation stuck.
    pub async fn record_failed_harvest(&self, log: &NewExecutionLog) -> Result<i64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(HarvestError::storage)?;
        let id = Self::insert_log(&mut tx, log, ExecutionStatus::Failed).await?;
        tx.commit().await.map_err(HarvestError::storage)?;
        Ok(id)
    }

    pub async fn get_log(&self, id: i64) -> Result<HarvestExecutionLog> {
        let row = sqlx::query_as::<_, LogRow>("SELECT * FROM harvest_execution_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(HarvestError::storage)?
            .ok_or_else(|| HarvestError::storage(format!("missing execution log {id}")))?;

        row.try_into()
    }

    pub async fn logs_for_owner(&self, owner_id: &str) -> Result<Vec<HarvestExecutionLog>> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT * FROM harvest_execution_logs WHERE owner_id = ? ORDER BY executed_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        rows.into_iter().map(HarvestExecutionLog::try_from).collect()
    }

    /// Allowed losses of executed harvests, the input to the alpha roll-up.
    pub async fn executed_allowed_losses(&self, owner_id: &str) -> Result<Vec<Decimal>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT allowed_loss FROM harvest_execution_logs WHERE owner_id = ? AND status = 'executed'",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        rows.iter()
            .map(|(raw,)| parse_decimal(raw, "harvest_execution_logs.allowed_loss"))
            .collect()
    }

    /// Metadata enrichment is the one allowed post-creation log mutation.
    pub async fn update_log_metadata(
        &self,
        id: i64,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query("UPDATE harvest_execution_logs SET metadata = ? WHERE id = ?")
            .bind(serde_json::to_string(metadata).map_err(HarvestError::storage)?)
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(HarvestError::storage)?;

        Ok(())
    }

    // -- wash-sale violations ----------------------------------------------

    pub async fn record_violation(&self, violation: &NewViolation) -> Result<i64> {
        let lot_ids =
            serde_json::to_string(&violation.replacement_lot_ids).map_err(HarvestError::storage)?;

        let result = sqlx::query(
            r#"
            INSERT INTO wash_sale_violations
                (owner_id, symbol, sale_date, disallowed_loss, replacement_lot_ids)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&violation.owner_id)
        .bind(&violation.symbol)
        .bind(violation.sale_date)
        .bind(violation.disallowed_loss.to_string())
        .bind(lot_ids)
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn violations_for_owner(&self, owner_id: &str) -> Result<Vec<WashSaleViolation>> {
        let rows = sqlx::query_as::<_, ViolationRow>(
            "SELECT id, owner_id, symbol, sale_date, disallowed_loss, replacement_lot_ids
             FROM wash_sale_violations WHERE owner_id = ? ORDER BY sale_date DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        rows.into_iter().map(WashSaleViolation::try_from).collect()
    }

    // -- opportunities -----------------------------------------------------

    /// Insert a detected opportunity, or refresh the loss figure on an
    /// already-active one for the same position.
    pub async fn upsert_opportunity(
        &self,
        owner_id: &str,
        symbol: &str,
        unrealized_loss: Decimal,
        detected_at: DateTime<Utc>,
    ) -> Result<i64> {
        let active: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM harvest_opportunities
             WHERE owner_id = ? AND symbol = ? AND status IN ('detected', 'pending')
             ORDER BY id DESC LIMIT 1",
        )
        .bind(owner_id)
        .bind(symbol)
        .fetch_optional(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        if let Some((id,)) = active {
            sqlx::query(
                "UPDATE harvest_opportunities SET unrealized_loss = ?, detected_at = ? WHERE id = ?",
            )
            .bind(unrealized_loss.to_string())
            .bind(detected_at)
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(HarvestError::storage)?;
            return Ok(id);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO harvest_opportunities (owner_id, symbol, unrealized_loss, status, detected_at)
            VALUES (?, ?, ?, 'detected', ?)
            "#,
        )
        .bind(owner_id)
        .bind(symbol)
        .bind(unrealized_loss.to_string())
        .bind(detected_at)
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_opportunity(&self, id: i64) -> Result<Option<HarvestOpportunity>> {
        let row =
            sqlx::query_as::<_, OpportunityRow>("SELECT * FROM harvest_opportunities WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await
                .map_err(HarvestError::storage)?;

        row.map(HarvestOpportunity::try_from).transpose()
    }

    pub async fn opportunities_for_owner(&self, owner_id: &str) -> Result<Vec<HarvestOpportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            "SELECT * FROM harvest_opportunities WHERE owner_id = ? ORDER BY detected_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        rows.into_iter().map(HarvestOpportunity::try_from).collect()
    }

    /// Reject an active opportunity without touching any lot.
    pub async fn reject_opportunity(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE harvest_opportunities SET status = 'rejected'
             WHERE id = ? AND status IN ('detected', 'pending')",
        )
        .bind(id)
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        if result.rows_affected() == 0 {
            return Err(HarvestError::UnknownOpportunity(id));
        }
        Ok(())
    }

    /// Close out active opportunities for a position after a successful
    /// harvest.
    pub async fn mark_position_harvested(&self, owner_id: &str, symbol: &str) -> Result<()> {
        sqlx::query(
            "UPDATE harvest_opportunities SET status = 'harvested'
             WHERE owner_id = ? AND symbol = ? AND status IN ('detected', 'pending')",
        )
        .bind(owner_id)
        .bind(symbol)
        .execute(self.db.pool())
        .await
        .map_err(HarvestError::storage)?;

        Ok(())
    }
}
