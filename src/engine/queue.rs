use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRequest {
    pub task_id: Uuid,
    /// 1 for the first cascade; bumped after each exhausted cycle.
    pub attempt: u32,
}

impl DispatchRequest {
    pub fn first(task_id: Uuid) -> Self {
        Self {
            task_id,
            attempt: 1,
        }
    }
}

/// Per-task dispatch bookkeeping shared by the dispatcher, the sweeper and
/// the allocation operations.
#[derive(Debug, Default)]
pub struct DispatchBook {
    queued: DashSet<Uuid>,
    in_flight: DashSet<Uuid>,
    backoff: DashSet<Uuid>,
    exhausted_at: DashMap<Uuid, Instant>,
    excluded: DashMap<Uuid, HashSet<Uuid>>,
    overdue_alerted: DashSet<Uuid>,
}

impl DispatchBook {
    /// Returns `false` when a request for the task is already waiting in the queue.
    pub fn mark_queued(&self, task_id: Uuid) -> bool {
        self.queued.insert(task_id)
    }

    pub fn unmark_queued(&self, task_id: &Uuid) {
        self.queued.remove(task_id);
    }

    pub fn is_queued(&self, task_id: &Uuid) -> bool {
        self.queued.contains(task_id)
    }

    /// Returns `false` when a driver already owns the task.
    pub fn try_claim(&self, task_id: Uuid) -> bool {
        self.in_flight.insert(task_id)
    }

    pub fn release_claim(&self, task_id: &Uuid) {
        self.in_flight.remove(task_id);
    }

    pub fn is_in_flight(&self, task_id: &Uuid) -> bool {
        self.in_flight.contains(task_id)
    }

    pub fn exclude(&self, task_id: Uuid, worker_id: Uuid) {
        self.excluded.entry(task_id).or_default().insert(worker_id);
    }

    pub fn excluded(&self, task_id: &Uuid) -> HashSet<Uuid> {
        self.excluded
            .get(task_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn clear_exclusions(&self, task_id: &Uuid) {
        self.excluded.remove(task_id);
    }

    pub fn enter_backoff(&self, task_id: Uuid) -> bool {
        self.backoff.insert(task_id)
    }

    pub fn leave_backoff(&self, task_id: &Uuid) -> bool {
        self.backoff.remove(task_id).is_some()
    }

    pub fn in_backoff(&self, task_id: &Uuid) -> bool {
        self.backoff.contains(task_id)
    }

    pub fn mark_exhausted(&self, task_id: Uuid) {
        self.exhausted_at.insert(task_id, Instant::now());
    }

    pub fn exhausted_at(&self, task_id: &Uuid) -> Option<Instant> {
        self.exhausted_at.get(task_id).map(|entry| *entry.value())
    }

    pub fn clear_exhausted(&self, task_id: &Uuid) {
        self.exhausted_at.remove(task_id);
    }

    /// Returns `true` only the first time a task is reported overdue.
    pub fn mark_overdue(&self, task_id: Uuid) -> bool {
        self.overdue_alerted.insert(task_id)
    }

    /// Drops everything tracked for a task that reached a terminal state.
    pub fn forget(&self, task_id: &Uuid) {
        self.backoff.remove(task_id);
        self.exhausted_at.remove(task_id);
        self.excluded.remove(task_id);
        self.overdue_alerted.remove(task_id);
    }
}

/// Queues a dispatch cycle. A task with a request already waiting is not queued twice.
pub async fn enqueue_task(state: &AppState, request: DispatchRequest) -> Result<(), AppError> {
    if !state.book.mark_queued(request.task_id) {
        return Ok(());
    }

    if let Err(err) = state.dispatch_tx.send(request).await {
        state.book.unmark_queued(&request.task_id);
        return Err(AppError::Internal(format!("dispatch queue send failed: {err}")));
    }

    state.metrics.dispatch_queue_depth.inc();
    debug!(task_id = %request.task_id, attempt = request.attempt, "task enqueued for dispatch");
    Ok(())
}

/// Re-enqueues `task_id` after the exponential delay for `attempt`. A task
/// already waiting out a delay is left alone.
pub fn schedule_retry(state: Arc<AppState>, task_id: Uuid, attempt: u32) {
    if !state.book.enter_backoff(task_id) {
        return;
    }
    state.metrics.tasks_in_backoff.inc();

    let delay = state.settings.retry_delay(attempt.saturating_sub(1));
    tokio::spawn(async move {
        sleep(delay).await;

        if state.book.leave_backoff(&task_id) {
            state.metrics.tasks_in_backoff.dec();
        }
        if let Err(err) = enqueue_task(&state, DispatchRequest { task_id, attempt }).await {
            warn!(task_id = %task_id, error = %err, "failed to re-enqueue task after backoff");
        }
    });
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::DispatchBook;

    #[test]
    fn claim_is_exclusive_until_released() {
        let book = DispatchBook::default();
        let task = Uuid::new_v4();

        assert!(book.try_claim(task));
        assert!(!book.try_claim(task));
        book.release_claim(&task);
        assert!(book.try_claim(task));
    }

    #[test]
    fn exclusions_accumulate_per_task() {
        let book = DispatchBook::default();
        let task = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        book.exclude(task, a);
        book.exclude(task, b);
        book.exclude(Uuid::new_v4(), a);

        let excluded = book.excluded(&task);
        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains(&a) && excluded.contains(&b));

        book.forget(&task);
        assert!(book.excluded(&task).is_empty());
    }

    #[test]
    fn a_task_is_queued_at_most_once() {
        let book = DispatchBook::default();
        let task = Uuid::new_v4();

        assert!(book.mark_queued(task));
        assert!(!book.mark_queued(task));
        book.unmark_queued(&task);
        assert!(!book.is_queued(&task));
    }

    #[test]
    fn overdue_is_reported_once() {
        let book = DispatchBook::default();
        let task = Uuid::new_v4();

        assert!(book.mark_overdue(task));
        assert!(!book.mark_overdue(task));
    }
}
