use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::allocation::calculate_total_payout;
use crate::error::AppError;
use crate::models::worker::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Delivery,
    Pickup,
    Collection,
    SalesVisit,
    Audit,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, Accepted)
                | (Assigned, Pending)
                | (Assigned, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Accepted => "accepted",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: i32,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub base_payout: Decimal,
    pub bonus_payout: Decimal,
    pub surge_multiplier: Decimal,
    pub deadline: Option<DateTime<Utc>>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Task {
    pub fn total_payout(&self) -> Decimal {
        calculate_total_payout(self.base_payout, self.bonus_payout, self.surge_multiplier)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => {
                now > deadline
                    && !matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled)
            }
            None => false,
        }
    }

    /// Applies a legal status edge and stamps the matching lifecycle timestamp.
    pub fn transition_to(&mut self, target: TaskStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.status.can_transition_to(target) {
            return Err(AppError::InvalidStatusTransition {
                entity: "task",
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        match target {
            TaskStatus::Pending => {
                self.assigned_at = None;
            }
            TaskStatus::Assigned => self.assigned_at = Some(now),
            TaskStatus::Accepted => self.accepted_at = Some(now),
            TaskStatus::InProgress => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(now),
            TaskStatus::Cancelled => {}
        }

        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Returns an accepted task to the pending pool after the worker backs out
    /// before starting. This edge is deliberately absent from the general graph.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status != TaskStatus::Accepted {
            return Err(AppError::InvalidStatusTransition {
                entity: "task",
                from: self.status.as_str().to_string(),
                to: TaskStatus::Pending.as_str().to_string(),
            });
        }

        self.status = TaskStatus::Pending;
        self.assigned_at = None;
        self.accepted_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.is_nil() {
            return Err(AppError::Validation("task id is required".to_string()));
        }
        if self.tenant_id.is_nil() {
            return Err(AppError::Validation("tenant id is required".to_string()));
        }
        if self.order_id.is_nil() {
            return Err(AppError::Validation("order id is required".to_string()));
        }
        if self.base_payout <= Decimal::ZERO {
            return Err(AppError::Validation("base payout must be positive".to_string()));
        }
        if self.bonus_payout < Decimal::ZERO {
            return Err(AppError::Validation(
                "bonus payout cannot be negative".to_string(),
            ));
        }
        if self.surge_multiplier < Decimal::ONE {
            return Err(AppError::Validation(
                "surge multiplier must be at least 1".to_string(),
            ));
        }
        self.pickup.validate()?;
        self.dropoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{Task, TaskStatus, TaskType};
    use crate::error::AppError;
    use crate::models::worker::GeoPoint;

    fn task(status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            task_type: TaskType::Delivery,
            status,
            priority: 0,
            pickup: GeoPoint::new(6.5244, 3.3792),
            dropoff: GeoPoint::new(6.4550, 3.3941),
            base_payout: Decimal::from(500),
            bonus_payout: Decimal::from(100),
            surge_multiplier: Decimal::new(15, 1),
            deadline: None,
            description: String::new(),
            created_at: now,
            updated_at: now,
            assigned_at: None,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::Accepted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    #[test]
    fn only_listed_task_edges_are_legal() {
        let legal = [
            (TaskStatus::Pending, TaskStatus::Assigned),
            (TaskStatus::Pending, TaskStatus::Cancelled),
            (TaskStatus::Assigned, TaskStatus::Accepted),
            (TaskStatus::Assigned, TaskStatus::Pending),
            (TaskStatus::Assigned, TaskStatus::Cancelled),
            (TaskStatus::Accepted, TaskStatus::InProgress),
            (TaskStatus::Accepted, TaskStatus::Cancelled),
            (TaskStatus::InProgress, TaskStatus::Completed),
            (TaskStatus::InProgress, TaskStatus::Failed),
        ];

        for from in ALL {
            for to in ALL {
                let mut t = task(from);
                let result = t.transition_to(to, Utc::now());
                if legal.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from:?} -> {to:?} should be legal");
                    assert_eq!(t.status, to);
                } else {
                    assert!(
                        matches!(result, Err(AppError::InvalidStatusTransition { .. })),
                        "{from:?} -> {to:?} should be rejected"
                    );
                    assert_eq!(t.status, from);
                }
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outbound_edges() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn payout_includes_bonus_and_surge() {
        let t = task(TaskStatus::Pending);
        assert_eq!(t.total_payout(), Decimal::new(90000, 2));
        assert_eq!(t.total_payout().to_string(), "900.00");
    }

    #[test]
    fn overdue_requires_past_deadline_and_open_status() {
        let now = Utc::now();
        let mut t = task(TaskStatus::InProgress);
        assert!(!t.is_overdue(now));

        t.deadline = Some(now - Duration::minutes(5));
        assert!(t.is_overdue(now));

        t.status = TaskStatus::Completed;
        assert!(!t.is_overdue(now));

        t.status = TaskStatus::Cancelled;
        assert!(!t.is_overdue(now));

        t.status = TaskStatus::Pending;
        t.deadline = Some(now + Duration::minutes(5));
        assert!(!t.is_overdue(now));
    }

    #[test]
    fn release_only_from_accepted() {
        let mut accepted = task(TaskStatus::Accepted);
        accepted.accepted_at = Some(Utc::now());
        accepted.release(Utc::now()).unwrap();
        assert_eq!(accepted.status, TaskStatus::Pending);
        assert!(accepted.accepted_at.is_none());

        let mut started = task(TaskStatus::InProgress);
        assert!(started.release(Utc::now()).is_err());
        assert_eq!(started.status, TaskStatus::InProgress);
    }

    #[test]
    fn surge_below_one_is_rejected() {
        let mut t = task(TaskStatus::Pending);
        t.surge_multiplier = Decimal::new(9, 1);
        assert!(matches!(t.validate(), Err(AppError::Validation(_))));
    }
}
