use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::task::TaskType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy_m: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Validation(format!(
                "invalid latitude {}",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "invalid longitude {}",
                self.lng
            )));
        }
        if let Some(accuracy) = self.accuracy_m
            && (!accuracy.is_finite() || accuracy < 0.0)
        {
            return Err(AppError::Validation(format!(
                "invalid location accuracy {accuracy}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Delivery,
    Sales,
    Collection,
    Audit,
    MultiRole,
}

impl WorkerType {
    /// Task types this worker type is qualified for. `MultiRole` covers all of them.
    pub fn capabilities(self) -> &'static [TaskType] {
        match self {
            WorkerType::Delivery => &[TaskType::Delivery, TaskType::Pickup],
            WorkerType::Sales => &[TaskType::SalesVisit],
            WorkerType::Collection => &[TaskType::Collection],
            WorkerType::Audit => &[TaskType::Audit],
            WorkerType::MultiRole => &[
                TaskType::Delivery,
                TaskType::Pickup,
                TaskType::Collection,
                TaskType::SalesVisit,
                TaskType::Audit,
                TaskType::Custom,
            ],
        }
    }

    pub fn handles(self, task_type: TaskType) -> bool {
        self.capabilities().contains(&task_type)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Offline,
    Available,
    Busy,
    OnBreak,
    InTransit,
}

impl WorkerStatus {
    pub fn can_transition_to(self, target: WorkerStatus) -> bool {
        use WorkerStatus::*;

        matches!(
            (self, target),
            (Offline, Available)
                | (Available, Busy)
                | (Available, OnBreak)
                | (Available, InTransit)
                | (Available, Offline)
                | (Busy, Available)
                | (Busy, InTransit)
                | (OnBreak, Available)
                | (OnBreak, Offline)
                | (InTransit, Available)
                | (InTransit, Busy)
        )
    }

    /// Statuses in which the worker holds exactly one active allocation.
    pub fn is_engaged(self) -> bool {
        matches!(self, WorkerStatus::Busy | WorkerStatus::InTransit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Offline => "offline",
            WorkerStatus::Available => "available",
            WorkerStatus::Busy => "busy",
            WorkerStatus::OnBreak => "on_break",
            WorkerStatus::InTransit => "in_transit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: String,
    pub worker_type: WorkerType,
    pub status: WorkerStatus,
    pub location: GeoPoint,
    pub location_updated_at: DateTime<Utc>,
    pub rating: Decimal,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// Whether this worker may receive an offer for a task of `task_type` right now.
    pub fn can_accept_task(&self, task_type: TaskType) -> bool {
        self.status == WorkerStatus::Available
            && self.is_verified
            && self.is_active
            && self.worker_type.handles(task_type)
    }

    pub fn success_rate(&self) -> Decimal {
        crate::engine::scorecard::success_rate(self.total_tasks, self.completed_tasks)
    }

    /// Moves the worker along a legal status edge, stamping `updated_at`.
    pub fn transition_to(
        &mut self,
        target: WorkerStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !self.status.can_transition_to(target) {
            return Err(AppError::InvalidStatusTransition {
                entity: "worker",
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.is_nil() {
            return Err(AppError::Validation("worker id is required".to_string()));
        }
        if self.tenant_id.is_nil() {
            return Err(AppError::Validation("tenant id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("worker name is required".to_string()));
        }
        if self.phone.trim().is_empty() {
            return Err(AppError::Validation("worker phone is required".to_string()));
        }
        if self.rating < Decimal::ZERO || self.rating > Decimal::from(5) {
            return Err(AppError::Validation(
                "rating must be between 0 and 5".to_string(),
            ));
        }
        if self.completed_tasks > self.total_tasks {
            return Err(AppError::Validation(
                "completed tasks cannot exceed total tasks".to_string(),
            ));
        }
        self.location.validate()
    }
}
