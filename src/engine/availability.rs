use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::worker::{GeoPoint, Worker, WorkerStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct NearbyWorker {
    pub worker: Worker,
    pub distance_km: f64,
}

/// Worker-driven status toggle. `busy` is reserved for the engine, and a
/// worker holding an active allocation cannot walk away from it here.
pub async fn set_status(
    state: &AppState,
    worker_id: Uuid,
    target: WorkerStatus,
) -> Result<Worker, AppError> {
    if target == WorkerStatus::Busy {
        return Err(AppError::Validation(
            "busy is set when an offer is accepted".to_string(),
        ));
    }

    let worker = state.workers.get(worker_id).await?;
    if worker.status.is_engaged()
        && target != WorkerStatus::InTransit
        && state
            .allocations
            .find_active_for_worker(worker_id)
            .await?
            .is_some()
    {
        return Err(AppError::ActiveAllocationExists(format!("worker {worker_id}")));
    }

    let updated = state
        .workers
        .compare_and_set_status(worker_id, worker.status, target, state.clock.now())
        .await?;

    info!(
        worker_id = %worker_id,
        from = worker.status.as_str(),
        to = target.as_str(),
        "worker status changed"
    );
    Ok(updated)
}

/// Applies a location fix if it is newer than the last one. Returns whether
/// it was applied.
pub async fn update_location(
    state: &AppState,
    worker_id: Uuid,
    point: GeoPoint,
    recorded_at: Option<DateTime<Utc>>,
) -> Result<bool, AppError> {
    point.validate()?;
    let recorded_at = recorded_at.unwrap_or_else(|| state.clock.now());

    let applied = state
        .workers
        .update_location(worker_id, point, recorded_at)
        .await?;
    if applied {
        state.geo.update(worker_id, point, recorded_at);
    }
    Ok(applied)
}

pub async fn set_active(state: &AppState, worker_id: Uuid, active: bool) -> Result<Worker, AppError> {
    if !active
        && state
            .allocations
            .find_active_for_worker(worker_id)
            .await?
            .is_some()
    {
        return Err(AppError::ActiveAllocationExists(format!("worker {worker_id}")));
    }

    let worker = state
        .workers
        .set_active(worker_id, active, state.clock.now())
        .await?;
    if active {
        state
            .geo
            .update(worker.id, worker.location, worker.location_updated_at);
    } else {
        state.geo.remove(&worker.id);
    }

    info!(worker_id = %worker_id, active, "worker activation changed");
    Ok(worker)
}

/// Active workers around `origin` regardless of status, nearest first.
pub async fn nearby(
    state: &AppState,
    origin: GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Result<Vec<NearbyWorker>, AppError> {
    origin.validate()?;
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(AppError::Validation("radius_km must be > 0".to_string()));
    }

    let mut found = Vec::new();
    for (worker_id, distance_km) in state.geo.near(&origin, radius_km, limit) {
        match state.workers.get(worker_id).await {
            Ok(worker) if worker.is_active => found.push(NearbyWorker {
                worker,
                distance_km,
            }),
            Ok(_) | Err(AppError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(found)
}
