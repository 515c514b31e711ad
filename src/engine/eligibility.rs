use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::task::Task;
use crate::models::worker::Worker;
use crate::state::AppState;

pub fn is_eligible(worker: &Worker, task: &Task) -> bool {
    worker.tenant_id == task.tenant_id && worker.can_accept_task(task.task_type)
}

/// Eligible workers around the task's pickup point with their distance in km,
/// nearest first. Workers in `excluded` are never returned.
pub async fn find_candidates(
    state: &AppState,
    task: &Task,
    excluded: &HashSet<Uuid>,
) -> Result<Vec<(Worker, f64)>, AppError> {
    let limit = state.settings.candidate_limit;
    let nearby = state
        .workers
        .find_available_near(
            task.tenant_id,
            task.pickup,
            state.settings.search_radius_km,
            Some(task.task_type),
            limit.saturating_add(excluded.len()),
        )
        .await?;

    Ok(nearby
        .into_iter()
        .filter(|worker| !excluded.contains(&worker.id) && is_eligible(worker, task))
        .map(|worker| {
            let distance = haversine_km(&task.pickup, &worker.location);
            (worker, distance)
        })
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::is_eligible;
    use crate::models::task::{Task, TaskStatus, TaskType};
    use crate::models::worker::{GeoPoint, Worker, WorkerStatus, WorkerType};

    fn task(tenant_id: Uuid, task_type: TaskType) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            tenant_id,
            order_id: Uuid::new_v4(),
            task_type,
            status: TaskStatus::Pending,
            priority: 0,
            pickup: GeoPoint::new(6.5244, 3.3792),
            dropoff: GeoPoint::new(6.4654, 3.4064),
            base_payout: Decimal::from(500),
            bonus_payout: Decimal::ZERO,
            surge_multiplier: Decimal::ONE,
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

    fn worker(tenant_id: Uuid, worker_type: WorkerType) -> Worker {
        let now = Utc::now();
        Worker {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Ada".to_string(),
            phone: "+2348000000001".to_string(),
            worker_type,
            status: WorkerStatus::Available,
            location: GeoPoint::new(6.5244, 3.3792),
            location_updated_at: now,
            rating: Decimal::from(4),
            total_tasks: 0,
            completed_tasks: 0,
            is_verified: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn worker_from_another_tenant_is_not_eligible() {
        let tenant = Uuid::new_v4();
        let t = task(tenant, TaskType::Delivery);

        assert!(is_eligible(&worker(tenant, WorkerType::Delivery), &t));
        assert!(!is_eligible(&worker(Uuid::new_v4(), WorkerType::Delivery), &t));
    }

    #[test]
    fn worker_type_must_cover_task_type() {
        let tenant = Uuid::new_v4();

        assert!(!is_eligible(
            &worker(tenant, WorkerType::Sales),
            &task(tenant, TaskType::Delivery)
        ));
        assert!(is_eligible(
            &worker(tenant, WorkerType::MultiRole),
            &task(tenant, TaskType::Audit)
        ));
    }
}
