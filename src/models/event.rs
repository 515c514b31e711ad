use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::offer::DeclineReason;

/// Lifecycle events published to observers (websocket clients, alerting).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    OfferCreated {
        offer_id: Uuid,
        task_id: Uuid,
        worker_id: Uuid,
        payout_amount: Decimal,
        expires_at: DateTime<Utc>,
    },
    OfferDeclined {
        offer_id: Uuid,
        task_id: Uuid,
        worker_id: Uuid,
        reason: DeclineReason,
    },
    OfferExpired {
        offer_id: Uuid,
        task_id: Uuid,
        worker_id: Uuid,
    },
    TaskAssigned {
        task_id: Uuid,
        worker_id: Uuid,
        allocation_id: Uuid,
        total_payout: Decimal,
        at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: Uuid,
        worker_id: Uuid,
    },
    TaskCompleted {
        task_id: Uuid,
        worker_id: Uuid,
        allocation_id: Uuid,
        earning_id: Uuid,
        duration_secs: Option<i64>,
        at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: Uuid,
        worker_id: Uuid,
        reason: String,
    },
    TaskCancelled {
        task_id: Uuid,
        reason: String,
    },
    TaskReleased {
        task_id: Uuid,
        worker_id: Uuid,
    },
    DispatchExhausted {
        task_id: Uuid,
        attempts: u32,
    },
    TaskOverdue {
        task_id: Uuid,
        deadline: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            DispatchEvent::OfferCreated { task_id, .. }
            | DispatchEvent::OfferDeclined { task_id, .. }
            | DispatchEvent::OfferExpired { task_id, .. }
            | DispatchEvent::TaskAssigned { task_id, .. }
            | DispatchEvent::TaskStarted { task_id, .. }
            | DispatchEvent::TaskCompleted { task_id, .. }
            | DispatchEvent::TaskFailed { task_id, .. }
            | DispatchEvent::TaskCancelled { task_id, .. }
            | DispatchEvent::TaskReleased { task_id, .. }
            | DispatchEvent::DispatchExhausted { task_id, .. }
            | DispatchEvent::TaskOverdue { task_id, .. } => *task_id,
        }
    }
}
