use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub distance_km: f64,
    pub distance_score: f64,
    pub rating_score: f64,
    pub success_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Offered,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
    Completed,
    Failed,
}

impl AllocationStatus {
    pub fn can_transition_to(self, target: AllocationStatus) -> bool {
        use AllocationStatus::*;

        matches!(
            (self, target),
            (Offered, Accepted)
                | (Offered, Rejected)
                | (Offered, Expired)
                | (Offered, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Failed)
                | (Accepted, Cancelled)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, AllocationStatus::Offered | AllocationStatus::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocationStatus::Offered => "offered",
            AllocationStatus::Accepted => "accepted",
            AllocationStatus::Rejected => "rejected",
            AllocationStatus::Expired => "expired",
            AllocationStatus::Cancelled => "cancelled",
            AllocationStatus::Completed => "completed",
            AllocationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub task_id: Uuid,
    pub worker_id: Uuid,
    pub offer_id: Uuid,
    pub status: AllocationStatus,
    pub base_payout: Decimal,
    pub bonus_payout: Decimal,
    pub surge_multiplier: Decimal,
    pub total_payout: Decimal,
    pub allocated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
