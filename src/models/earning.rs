use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarningType {
    TaskPayout,
    Bonus,
    Tip,
    Penalty,
    Referral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    Pending,
    Paid,
    Cancelled,
}

/// Append-only ledger entry owned by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earning {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub worker_id: Uuid,
    pub task_id: Uuid,
    pub earning_type: EarningType,
    pub amount: Decimal,
    pub description: String,
    pub status: EarningStatus,
    pub created_at: DateTime<Utc>,
}
