use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::offers::withdraw_offer;
use crate::engine::queue::{enqueue_task, DispatchRequest};
use crate::error::AppError;
use crate::models::allocation::{Allocation, AllocationStatus};
use crate::models::earning::{Earning, EarningStatus, EarningType};
use crate::models::event::DispatchEvent;
use crate::models::task::{Task, TaskStatus};
use crate::models::worker::WorkerStatus;
use crate::ports::CompletionProof;
use crate::state::AppState;

const CANCEL_ATTEMPTS: usize = 5;

/// `(base + bonus) × surge`, half away from zero, always two decimal places.
pub fn calculate_total_payout(base: Decimal, bonus: Decimal, surge: Decimal) -> Decimal {
    let mut total = ((base + bonus) * surge)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(2);
    total
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub task: Task,
    pub allocation: Allocation,
    pub earning: Earning,
}

pub async fn start_task(state: &AppState, task_id: Uuid, worker_id: Uuid) -> Result<Task, AppError> {
    assigned_allocation(state, task_id, worker_id).await?;

    let now = state.clock.now();
    let task = state
        .tasks
        .compare_and_set_status(task_id, TaskStatus::Accepted, TaskStatus::InProgress, now)
        .await?;

    state.publish(DispatchEvent::TaskStarted { task_id, worker_id });
    info!(task_id = %task_id, worker_id = %worker_id, "task started");
    Ok(task)
}

pub async fn complete_task(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
    proof: CompletionProof,
) -> Result<CompletionReceipt, AppError> {
    let allocation = assigned_allocation(state, task_id, worker_id).await?;
    let task = state.tasks.get(task_id).await?;
    if task.status != TaskStatus::InProgress {
        return Err(AppError::InvalidStatusTransition {
            entity: "task",
            from: task.status.as_str().to_string(),
            to: TaskStatus::Completed.as_str().to_string(),
        });
    }

    state.proof_validator.validate(task_id, &proof).await?;

    let now = state.clock.now();
    let task = state
        .tasks
        .compare_and_set_status(task_id, TaskStatus::InProgress, TaskStatus::Completed, now)
        .await?;
    free_worker(state, worker_id, now).await;
    let allocation = state
        .allocations
        .update_status(
            allocation.id,
            AllocationStatus::Accepted,
            AllocationStatus::Completed,
            now,
        )
        .await?;

    let earning = state
        .earnings
        .create(Earning {
            id: Uuid::new_v4(),
            tenant_id: task.tenant_id,
            worker_id,
            task_id,
            earning_type: EarningType::TaskPayout,
            amount: allocation.total_payout,
            description: format!("payout for task {task_id}"),
            status: EarningStatus::Pending,
            created_at: now,
        })
        .await?;
    state.workers.record_outcome(worker_id, true, now).await?;

    state.book.forget(&task_id);
    state.metrics.workers_busy.dec();

    let duration_secs = task
        .started_at
        .map(|started_at| (now - started_at).num_seconds());
    state.publish(DispatchEvent::TaskCompleted {
        task_id,
        worker_id,
        allocation_id: allocation.id,
        earning_id: earning.id,
        duration_secs,
        at: now,
    });
    info!(
        task_id = %task_id,
        worker_id = %worker_id,
        payout = %earning.amount,
        duration_secs = ?duration_secs,
        "task completed"
    );

    Ok(CompletionReceipt {
        task,
        allocation,
        earning,
    })
}

pub async fn fail_task(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
    reason: String,
) -> Result<Task, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("failure reason is required".to_string()));
    }
    let allocation = assigned_allocation(state, task_id, worker_id).await?;

    let now = state.clock.now();
    let task = state.tasks.mark_failed(task_id, reason.clone(), now).await?;
    free_worker(state, worker_id, now).await;
    state
        .allocations
        .update_status(
            allocation.id,
            AllocationStatus::Accepted,
            AllocationStatus::Failed,
            now,
        )
        .await?;
    state.workers.record_outcome(worker_id, false, now).await?;

    state.book.forget(&task_id);
    state.metrics.workers_busy.dec();

    state.publish(DispatchEvent::TaskFailed {
        task_id,
        worker_id,
        reason: reason.clone(),
    });
    warn!(task_id = %task_id, worker_id = %worker_id, reason = %reason, "task failed");
    Ok(task)
}

/// Cancels a task that has not started. Concurrent transitions are retried
/// against the freshly read status.
pub async fn cancel_task(state: &AppState, task_id: Uuid, reason: String) -> Result<Task, AppError> {
    let mut last_seen = TaskStatus::Pending;

    for _ in 0..CANCEL_ATTEMPTS {
        let now = state.clock.now();
        let task = state.tasks.get(task_id).await?;
        last_seen = task.status;

        let cancelled = match task.status {
            TaskStatus::Pending => {
                state
                    .tasks
                    .compare_and_set_status(task_id, TaskStatus::Pending, TaskStatus::Cancelled, now)
                    .await
            }
            TaskStatus::Assigned => {
                if let Some(offer) = state.offers.find_pending_for_task(task_id).await? {
                    withdraw_offer(state, offer.id).await?;
                }
                state
                    .tasks
                    .compare_and_set_status(task_id, TaskStatus::Assigned, TaskStatus::Cancelled, now)
                    .await
            }
            TaskStatus::Accepted => {
                let result = state
                    .tasks
                    .compare_and_set_status(task_id, TaskStatus::Accepted, TaskStatus::Cancelled, now)
                    .await;
                if result.is_ok() {
                    close_allocation(state, task_id, now).await?;
                }
                result
            }
            status => {
                return Err(AppError::InvalidStatusTransition {
                    entity: "task",
                    from: status.as_str().to_string(),
                    to: TaskStatus::Cancelled.as_str().to_string(),
                });
            }
        };

        match cancelled {
            Ok(task) => {
                state.book.forget(&task_id);
                state.publish(DispatchEvent::TaskCancelled {
                    task_id,
                    reason: reason.clone(),
                });
                info!(task_id = %task_id, reason = %reason, "task cancelled");
                return Ok(task);
            }
            Err(err) if err.is_contention() => tokio::task::yield_now().await,
            Err(err) => return Err(err),
        }
    }

    Err(AppError::StatusConflict {
        entity: "task",
        expected: "cancellable".to_string(),
        actual: last_seen.as_str().to_string(),
    })
}

async fn close_allocation(
    state: &AppState,
    task_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let Some(allocation) = state.allocations.find_active_for_task(task_id).await? else {
        return Ok(());
    };

    // An acceptance still landing may close the same allocation; the CAS
    // decides who frees the worker.
    match state
        .allocations
        .update_status(allocation.id, allocation.status, AllocationStatus::Cancelled, now)
        .await
    {
        Ok(_) => {}
        Err(err) if err.is_contention() => return Ok(()),
        Err(err) => return Err(err),
    }
    free_worker(state, allocation.worker_id, now).await;
    state
        .workers
        .record_outcome(allocation.worker_id, false, now)
        .await?;
    state.metrics.workers_busy.dec();
    Ok(())
}

/// The worker backs out after accepting but before starting. The task goes
/// back into the cascade without them.
pub async fn release_task(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
) -> Result<Task, AppError> {
    let allocation = assigned_allocation(state, task_id, worker_id).await?;

    let now = state.clock.now();
    let task = state.tasks.release(task_id, now).await?;
    free_worker(state, worker_id, now).await;
    state
        .allocations
        .update_status(
            allocation.id,
            AllocationStatus::Accepted,
            AllocationStatus::Cancelled,
            now,
        )
        .await?;
    state.workers.record_outcome(worker_id, false, now).await?;

    state.book.exclude(task_id, worker_id);
    state.metrics.workers_busy.dec();
    state.publish(DispatchEvent::TaskReleased { task_id, worker_id });
    info!(task_id = %task_id, worker_id = %worker_id, "task released back to pool");

    enqueue_task(state, DispatchRequest::first(task_id)).await?;
    Ok(task)
}

async fn assigned_allocation(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
) -> Result<Allocation, AppError> {
    match state.allocations.find_active_for_task(task_id).await? {
        Some(allocation) if allocation.worker_id == worker_id => Ok(allocation),
        Some(_) => Err(AppError::NotAssignedWorker),
        None => {
            state.tasks.get(task_id).await?;
            Err(AppError::NotAssignedWorker)
        }
    }
}

/// Returns an engaged worker to `available`. The task-side transition has
/// already committed, so a failure here is logged rather than surfaced.
pub(crate) async fn free_worker(state: &AppState, worker_id: Uuid, now: DateTime<Utc>) {
    for _ in 0..CANCEL_ATTEMPTS {
        let worker = match state.workers.get(worker_id).await {
            Ok(worker) => worker,
            Err(err) => {
                warn!(worker_id = %worker_id, error = %err, "failed to load worker to free");
                return;
            }
        };
        if !worker.status.is_engaged() {
            return;
        }

        match state
            .workers
            .compare_and_set_status(worker_id, worker.status, WorkerStatus::Available, now)
            .await
        {
            Ok(_) => return,
            Err(err) if err.is_contention() => continue,
            Err(err) => {
                warn!(worker_id = %worker_id, error = %err, "failed to free worker");
                return;
            }
        }
    }
    warn!(worker_id = %worker_id, "gave up freeing worker after repeated conflicts");
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use super::calculate_total_payout;

    #[test]
    fn surge_applies_to_base_plus_bonus() {
        let total = calculate_total_payout(
            Decimal::from(500),
            Decimal::from(100),
            Decimal::from_str("1.5").unwrap(),
        );
        assert_eq!(total.to_string(), "900.00");
    }

    #[test]
    fn rounds_half_away_from_zero_to_two_places() {
        let total = calculate_total_payout(
            Decimal::from_str("10.005").unwrap(),
            Decimal::ZERO,
            Decimal::ONE,
        );
        assert_eq!(total.to_string(), "10.01");

        let total = calculate_total_payout(
            Decimal::from_str("33.33").unwrap(),
            Decimal::ZERO,
            Decimal::from_str("1.25").unwrap(),
        );
        assert_eq!(total.to_string(), "41.66");
    }

    #[test]
    fn whole_amounts_keep_two_decimal_places() {
        let total = calculate_total_payout(Decimal::from(250), Decimal::ZERO, Decimal::ONE);
        assert_eq!(total.to_string(), "250.00");
    }
}
