use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::worker::Worker;
use crate::state::AppState;

const MIN_RATING: Decimal = Decimal::ONE;
const MAX_RATING: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Completed share of all finished tasks, as a percentage. Zero before the first task.
pub fn success_rate(total_tasks: u32, completed_tasks: u32) -> Decimal {
    if total_tasks == 0 {
        return Decimal::ZERO;
    }

    (Decimal::from(completed_tasks) * Decimal::ONE_HUNDRED / Decimal::from(total_tasks))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn validate_rating(submitted: Decimal) -> Result<(), AppError> {
    if submitted < MIN_RATING || submitted > MAX_RATING {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 5, got {submitted}"
        )));
    }
    Ok(())
}

/// Running average over completed tasks, clamped to [1, 5].
pub fn next_rating(
    current: Decimal,
    completed_before: u32,
    submitted: Decimal,
) -> Result<Decimal, AppError> {
    validate_rating(submitted)?;

    let weight = Decimal::from(completed_before);
    let averaged = (current * weight + submitted) / (weight + Decimal::ONE);

    Ok(averaged
        .clamp(MIN_RATING, MAX_RATING)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

pub fn record_outcome(worker: &mut Worker, completed: bool, now: DateTime<Utc>) {
    worker.total_tasks = worker.total_tasks.saturating_add(1);
    if completed {
        worker.completed_tasks = worker.completed_tasks.saturating_add(1);
    }
    worker.updated_at = now;
}

pub async fn submit_rating(
    state: &AppState,
    worker_id: Uuid,
    submitted: Decimal,
) -> Result<Worker, AppError> {
    validate_rating(submitted)?;

    let worker = state
        .workers
        .apply_rating(worker_id, submitted, state.clock.now())
        .await?;

    info!(
        worker_id = %worker_id,
        submitted = %submitted,
        rating = %worker.rating,
        "worker rating updated"
    );
    Ok(worker)
}
