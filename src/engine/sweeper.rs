use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::engine::offers::expire_offer;
use crate::engine::queue::{enqueue_task, DispatchRequest};
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::task::TaskStatus;
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_offers: usize,
    pub repaired_tasks: usize,
    pub overdue_tasks: usize,
    pub requeued_tasks: usize,
}

/// One reconciliation pass: expire lapsed offers, repair tasks stuck in
/// `assigned`, report overdue tasks and hand undriven pending tasks back to
/// the dispatcher.
pub async fn sweep_once(state: &AppState) -> Result<SweepReport, AppError> {
    let mut report = SweepReport::default();
    let now = state.clock.now();

    for offer in state.offers.find_expiring(now).await? {
        if expire_offer(state, offer.id).await? {
            report.expired_offers += 1;
        }
    }

    let grace = chrono::Duration::from_std(state.settings.sweep_interval)
        .map_err(|err| AppError::Internal(format!("sweep interval out of range: {err}")))?;
    for task in state.tasks.find_stuck_assigned(now - grace).await? {
        if state.offers.find_pending_for_task(task.id).await?.is_some()
            || state.allocations.find_active_for_task(task.id).await?.is_some()
        {
            continue;
        }

        match state
            .tasks
            .compare_and_set_status(task.id, TaskStatus::Assigned, TaskStatus::Pending, now)
            .await
        {
            Ok(_) => {
                warn!(task_id = %task.id, "task stuck in assigned without an offer; returned to pool");
                report.repaired_tasks += 1;
            }
            Err(err) if err.is_contention() => {}
            Err(err) => return Err(err),
        }
    }

    let overdue = state.tasks.find_overdue(now).await?;
    report.overdue_tasks = overdue.len();
    state.metrics.overdue_tasks.set(overdue.len() as i64);
    for task in &overdue {
        if let Some(deadline) = task.deadline
            && state.book.mark_overdue(task.id)
        {
            warn!(task_id = %task.id, deadline = %deadline, status = task.status.as_str(), "task overdue");
            state.publish(DispatchEvent::TaskOverdue {
                task_id: task.id,
                deadline,
            });
        }
    }

    let cooldown = state
        .settings
        .retry_delay(state.settings.max_dispatch_attempts.saturating_add(1));
    for task in state.tasks.find_pending(None, usize::MAX).await? {
        let book = &state.book;
        if book.is_queued(&task.id) || book.is_in_flight(&task.id) || book.in_backoff(&task.id) {
            continue;
        }
        if let Some(exhausted_at) = book.exhausted_at(&task.id) {
            if exhausted_at.elapsed() < cooldown {
                continue;
            }
            book.clear_exhausted(&task.id);
        }

        enqueue_task(state, DispatchRequest::first(task.id)).await?;
        report.requeued_tasks += 1;
    }

    let busy = state
        .workers
        .list()
        .await?
        .iter()
        .filter(|worker| worker.status.is_engaged())
        .count();
    state.metrics.workers_busy.set(busy as i64);

    Ok(report)
}

pub async fn run_sweeper(state: Arc<AppState>) {
    let mut ticker = interval(state.settings.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = state.settings.sweep_interval.as_secs(), "sweeper started");

    loop {
        ticker.tick().await;
        match sweep_once(&state).await {
            Ok(report) if report.expired_offers + report.repaired_tasks + report.requeued_tasks > 0 => {
                info!(
                    expired_offers = report.expired_offers,
                    repaired_tasks = report.repaired_tasks,
                    overdue_tasks = report.overdue_tasks,
                    requeued_tasks = report.requeued_tasks,
                    "sweep finished"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "sweep failed"),
        }
    }
}
