use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::queue::{enqueue_task, DispatchRequest};
use crate::error::AppError;
use crate::models::task::{Task, TaskStatus, TaskType};
use crate::models::worker::{GeoPoint, Worker, WorkerStatus, WorkerType};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: i32,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub base_payout: Decimal,
    #[serde(default)]
    pub bonus_payout: Decimal,
    #[serde(default)]
    pub surge_multiplier: Option<Decimal>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: String,
    pub worker_type: WorkerType,
    pub location: GeoPoint,
    #[serde(default)]
    pub status: Option<WorkerStatus>,
    #[serde(default)]
    pub rating: Option<Decimal>,
    #[serde(default)]
    pub is_verified: bool,
}

/// Stores a pending task and queues its first dispatch cycle.
pub async fn create_task(state: &AppState, new: NewTask) -> Result<Task, AppError> {
    let now = state.clock.now();
    let task = Task {
        id: Uuid::new_v4(),
        tenant_id: new.tenant_id,
        order_id: new.order_id.unwrap_or_else(Uuid::new_v4),
        task_type: new.task_type,
        status: TaskStatus::Pending,
        priority: new.priority,
        pickup: new.pickup,
        dropoff: new.dropoff,
        base_payout: new.base_payout,
        bonus_payout: new.bonus_payout,
        surge_multiplier: new.surge_multiplier.unwrap_or(Decimal::ONE),
        deadline: new.deadline,
        description: new.description,
        created_at: now,
        updated_at: now,
        assigned_at: None,
        accepted_at: None,
        started_at: None,
        completed_at: None,
        failure_reason: None,
    };
    task.validate()?;

    let task = state.tasks.insert(task).await?;
    info!(
        task_id = %task.id,
        tenant_id = %task.tenant_id,
        task_type = ?task.task_type,
        payout = %task.total_payout(),
        "task created"
    );

    enqueue_task(state, DispatchRequest::first(task.id)).await?;
    Ok(task)
}

pub async fn register_worker(state: &AppState, new: NewWorker) -> Result<Worker, AppError> {
    let status = new.status.unwrap_or(WorkerStatus::Offline);
    if !matches!(status, WorkerStatus::Offline | WorkerStatus::Available) {
        return Err(AppError::Validation(
            "new workers start offline or available".to_string(),
        ));
    }

    let now = state.clock.now();
    let worker = Worker {
        id: Uuid::new_v4(),
        tenant_id: new.tenant_id,
        name: new.name.trim().to_string(),
        phone: new.phone.trim().to_string(),
        worker_type: new.worker_type,
        status,
        location: new.location,
        location_updated_at: now,
        rating: new.rating.unwrap_or(Decimal::from(5)),
        total_tasks: 0,
        completed_tasks: 0,
        is_verified: new.is_verified,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    worker.validate()?;

    let worker = state.workers.insert(worker).await?;
    state.geo.update(worker.id, worker.location, worker.location_updated_at);
    info!(
        worker_id = %worker.id,
        tenant_id = %worker.tenant_id,
        worker_type = ?worker.worker_type,
        status = worker.status.as_str(),
        "worker registered"
    );
    Ok(worker)
}
