use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tax_lot_core::{HarvestError, SelectionMethod, TaxLot};

/// Lifecycle of a detected harvest opportunity. `Harvested` is reachable
/// only through a successful execution; `Rejected` never mutates lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Detected,
    Pending,
    Harvested,
    Rejected,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Detected => "detected",
            OpportunityStatus::Pending => "pending",
            OpportunityStatus::Harvested => "harvested",
            OpportunityStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for OpportunityStatus {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(Self::Detected),
            "pending" => Ok(Self::Pending),
            "harvested" => Ok(Self::Harvested),
            "rejected" => Ok(Self::Rejected),
            other => Err(HarvestError::storage(format!(
                "unknown opportunity status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Executed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            other => Err(HarvestError::storage(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOpportunity {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub unrealized_loss: Decimal,
    pub status: OpportunityStatus,
    pub detected_at: DateTime<Utc>,
}

/// Regulatory record of a disallowed loss. Informational only; it never
/// mutates lot quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WashSaleViolation {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub disallowed_loss: Decimal,
    pub replacement_lot_ids: Vec<i64>,
}

/// Permanent record of a harvest attempt. `metadata` enrichment (the
/// reinvestment outcome) is the one allowed post-creation mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestExecutionLog {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub lot_ids: Vec<i64>,
    pub quantity_sold: Decimal,
    pub allowed_loss: Decimal,
    pub disallowed_loss: Decimal,
    pub status: ExecutionStatus,
    pub metadata: serde_json::Value,
    pub executed_at: DateTime<Utc>,
}

/// Reinvestment result attached to a log's metadata after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinvestmentOutcome {
    pub proxy_symbol: String,
    pub principal: Decimal,
    pub order_id: Option<String>,
    pub succeeded: bool,
    pub message: String,
}

/// How the caller wants lots resolved for a harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSelection {
    /// Manual selection: each named lot is sold in full.
    Explicit { lot_ids: Vec<i64> },
    /// Computed by the selector; method defaults to the configured one.
    ByQuantity {
        quantity: Decimal,
        method: Option<SelectionMethod>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub owner_id: String,
    pub symbol: String,
    pub selection: LotSelection,
    /// Correlated proxy to buy with the realized principal, if any.
    pub reinvest_into: Option<String>,
}

// ---------------------------------------------------------------------------
// Row types: TEXT decimal/JSON columns converted at this boundary
// ---------------------------------------------------------------------------

pub(crate) fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, HarvestError> {
    Decimal::from_str(raw)
        .map_err(|e| HarvestError::storage(format!("bad decimal in {column}: {e}")))
}

fn parse_lot_ids(raw: &str) -> Result<Vec<i64>, HarvestError> {
    serde_json::from_str(raw).map_err(|e| HarvestError::storage(format!("bad lot id list: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LotRow {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub quantity: String,
    pub cost_basis_per_unit: String,
    pub acquired_at: DateTime<Utc>,
    pub sold: bool,
    pub sold_at: Option<DateTime<Utc>>,
}

impl TryFrom<LotRow> for TaxLot {
    type Error = HarvestError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        Ok(TaxLot {
            id: row.id,
            owner_id: row.owner_id,
            symbol: row.symbol,
            quantity: parse_decimal(&row.quantity, "tax_lots.quantity")?,
            cost_basis_per_unit: parse_decimal(
                &row.cost_basis_per_unit,
                "tax_lots.cost_basis_per_unit",
            )?,
            acquired_at: row.acquired_at,
            sold: row.sold,
            sold_at: row.sold_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OpportunityRow {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub unrealized_loss: String,
    pub status: String,
    pub detected_at: DateTime<Utc>,
}

impl TryFrom<OpportunityRow> for HarvestOpportunity {
    type Error = HarvestError;

    fn try_from(row: OpportunityRow) -> Result<Self, Self::Error> {
        Ok(HarvestOpportunity {
            id: row.id,
            owner_id: row.owner_id,
            symbol: row.symbol,
            unrealized_loss: parse_decimal(
                &row.unrealized_loss,
                "harvest_opportunities.unrealized_loss",
            )?,
            status: row.status.parse()?,
            detected_at: row.detected_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ViolationRow {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub disallowed_loss: String,
    pub replacement_lot_ids: String,
}

impl TryFrom<ViolationRow> for WashSaleViolation {
    type Error = HarvestError;

    fn try_from(row: ViolationRow) -> Result<Self, Self::Error> {
        Ok(WashSaleViolation {
            id: row.id,
            owner_id: row.owner_id,
            symbol: row.symbol,
            sale_date: row.sale_date,
            disallowed_loss: parse_decimal(
                &row.disallowed_loss,
                "wash_sale_violations.disallowed_loss",
            )?,
            replacement_lot_ids: parse_lot_ids(&row.replacement_lot_ids)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LogRow {
    pub id: i64,
    pub owner_id: String,
    pub symbol: String,
    pub lot_ids: String,
    pub quantity_sold: String,
    pub allowed_loss: String,
    pub disallowed_loss: String,
    pub status: String,
    pub metadata: String,
    pub executed_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for HarvestExecutionLog {
    type Error = HarvestError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(HarvestExecutionLog {
            id: row.id,
            owner_id: row.owner_id,
            symbol: row.symbol,
            lot_ids: parse_lot_ids(&row.lot_ids)?,
            quantity_sold: parse_decimal(&row.quantity_sold, "harvest_execution_logs.quantity_sold")?,
            allowed_loss: parse_decimal(&row.allowed_loss, "harvest_execution_logs.allowed_loss")?,
            disallowed_loss: parse_decimal(
                &row.disallowed_loss,
                "harvest_execution_logs.disallowed_loss",
            )?,
            status: row.status.parse()?,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| HarvestError::storage(format!("bad log metadata: {e}")))?,
            executed_at: row.executed_at,
        })
    }
}

/// Fields for a new execution log row; the store assigns id and status.
#[derive(Debug, Clone)]
pub struct NewExecutionLog {
    pub owner_id: String,
    pub symbol: String,
    pub lot_ids: Vec<i64>,
    pub quantity_sold: Decimal,
    pub allowed_loss: Decimal,
    pub disallowed_loss: Decimal,
    pub metadata: serde_json::Value,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewViolation {
    pub owner_id: String,
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub disallowed_loss: Decimal,
    pub replacement_lot_ids: Vec<i64>,
}
