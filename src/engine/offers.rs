//! Offer lifecycle: creating an offer for one candidate, and the three ways
//! it resolves (accept, decline, expiry) plus withdrawal when the task is
//! cancelled. Creation claims the task before the offer appears; every
//! resolution commits offer first, then task, then worker.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::allocation::free_worker;
use crate::engine::eligibility::is_eligible;
use crate::error::AppError;
use crate::models::allocation::{Allocation, AllocationStatus};
use crate::models::event::DispatchEvent;
use crate::models::offer::{DeclineReason, OfferStatus, TaskOffer};
use crate::models::task::TaskStatus;
use crate::models::worker::WorkerStatus;
use crate::ports::OfferNotice;
use crate::state::AppState;

/// Wakes the dispatcher blocked on an offer as soon as it resolves.
#[derive(Debug, Default)]
pub struct OfferWaiters {
    waiters: DashMap<Uuid, oneshot::Sender<OfferStatus>>,
}

impl OfferWaiters {
    pub fn register(&self, offer_id: Uuid) -> oneshot::Receiver<OfferStatus> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(offer_id, tx);
        rx
    }

    pub fn resolve(&self, offer_id: Uuid, status: OfferStatus) {
        if let Some((_, tx)) = self.waiters.remove(&offer_id) {
            let _ = tx.send(status);
        }
    }

    pub fn discard(&self, offer_id: &Uuid) {
        self.waiters.remove(offer_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Offers a pending task to one worker. Either the offer exists and the task
/// is `assigned`, or neither changed.
pub async fn offer_to_candidate(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
) -> Result<TaskOffer, AppError> {
    let now = state.clock.now();
    let task = state.tasks.get(task_id).await?;
    if task.status != TaskStatus::Pending {
        return Err(AppError::StatusConflict {
            entity: "task",
            expected: TaskStatus::Pending.as_str().to_string(),
            actual: task.status.as_str().to_string(),
        });
    }

    let worker = state.workers.get(worker_id).await?;
    if !is_eligible(&worker, &task) {
        return Err(AppError::WorkerNotEligible);
    }

    let ttl = chrono::Duration::from_std(state.settings.offer_ttl)
        .map_err(|err| AppError::Internal(format!("offer ttl out of range: {err}")))?;

    // The task is claimed before the offer exists, so an offer is never
    // acceptable while its task is still pending.
    state
        .tasks
        .compare_and_set_status(task_id, TaskStatus::Pending, TaskStatus::Assigned, now)
        .await?;

    let offer = match state
        .offers
        .create(TaskOffer {
            id: Uuid::new_v4(),
            task_id,
            worker_id,
            status: OfferStatus::Pending,
            offered_at: now,
            expires_at: now + ttl,
            responded_at: None,
            payout_amount: task.total_payout(),
            decline_reason: None,
        })
        .await
    {
        Ok(offer) => offer,
        Err(err) => {
            reopen_task(state, task_id, now).await?;
            return Err(err);
        }
    };

    // A cancel that landed between the claim and the offer saw no offer to
    // withdraw.
    let claimed = state.tasks.get(task_id).await?;
    if claimed.status != TaskStatus::Assigned {
        withdraw_offer(state, offer.id).await?;
        return Err(AppError::StatusConflict {
            entity: "task",
            expected: TaskStatus::Assigned.as_str().to_string(),
            actual: claimed.status.as_str().to_string(),
        });
    }

    state.metrics.record_offer("created");
    state.publish(DispatchEvent::OfferCreated {
        offer_id: offer.id,
        task_id,
        worker_id,
        payout_amount: offer.payout_amount,
        expires_at: offer.expires_at,
    });
    info!(
        offer_id = %offer.id,
        task_id = %task_id,
        worker_id = %worker_id,
        payout = %offer.payout_amount,
        "offer created"
    );

    notify(state, &offer);
    Ok(offer)
}

fn notify(state: &AppState, offer: &TaskOffer) {
    let notifier = state.notifier.clone();
    let metrics = state.metrics.clone();
    let notice = OfferNotice {
        offer_id: offer.id,
        worker_id: offer.worker_id,
        task_id: offer.task_id,
        payout_amount: offer.payout_amount,
        expires_at: offer.expires_at,
    };

    tokio::spawn(async move {
        let offer_id = notice.offer_id;
        if let Err(err) = notifier.send_offer(notice).await {
            metrics.notification_failures_total.inc();
            tracing::error!(offer_id = %offer_id, error = %err, "offer notification failed");
        }
    });
}

pub async fn accept_offer(
    state: &AppState,
    offer_id: Uuid,
    worker_id: Uuid,
) -> Result<Allocation, AppError> {
    let now = state.clock.now();
    let offer = state.offers.get(offer_id).await?;
    if offer.worker_id != worker_id {
        return Err(AppError::NotOfferRecipient);
    }
    if offer.status != OfferStatus::Pending {
        return Err(AppError::OfferNoLongerAvailable);
    }
    if offer.is_expired(now) {
        expire_offer(state, offer_id).await?;
        return Err(AppError::OfferNoLongerAvailable);
    }

    let task = state.tasks.get(offer.task_id).await?;
    if task.status != TaskStatus::Assigned {
        return Err(AppError::OfferNoLongerAvailable);
    }
    let worker = state.workers.get(worker_id).await?;
    if !is_eligible(&worker, &task) {
        return Err(AppError::WorkerNotEligible);
    }

    state
        .offers
        .compare_and_set_status(offer_id, OfferStatus::Pending, OfferStatus::Accepted, now, None)
        .await
        .map_err(no_longer_available)?;

    if let Err(err) = state
        .tasks
        .compare_and_set_status(task.id, TaskStatus::Assigned, TaskStatus::Accepted, now)
        .await
    {
        warn!(offer_id = %offer_id, task_id = %task.id, error = %err, "task moved before acceptance landed");
        state.waiters.resolve(offer_id, OfferStatus::Expired);
        return Err(no_longer_available(err));
    }

    if let Err(err) = state
        .workers
        .compare_and_set_status(worker_id, WorkerStatus::Available, WorkerStatus::Busy, now)
        .await
    {
        warn!(worker_id = %worker_id, task_id = %task.id, error = %err, "worker left available before acceptance landed");
        undo_acceptance(state, task.id, worker_id, offer_id, now, false).await;
        return Err(AppError::WorkerNotEligible);
    }

    let allocation = match state
        .allocations
        .create(Allocation {
            id: Uuid::new_v4(),
            tenant_id: task.tenant_id,
            task_id: task.id,
            worker_id,
            offer_id,
            status: AllocationStatus::Accepted,
            base_payout: task.base_payout,
            bonus_payout: task.bonus_payout,
            surge_multiplier: task.surge_multiplier,
            total_payout: offer.payout_amount,
            allocated_at: offer.offered_at,
            accepted_at: Some(now),
            completed_at: None,
        })
        .await
    {
        Ok(allocation) => allocation,
        Err(err) => {
            undo_acceptance(state, task.id, worker_id, offer_id, now, true).await;
            return Err(err);
        }
    };
    state.metrics.workers_busy.inc();

    // A cancel that landed after the task CAS had no allocation to close yet.
    if state.tasks.get(task.id).await?.status == TaskStatus::Cancelled {
        warn!(offer_id = %offer_id, task_id = %task.id, "task cancelled while acceptance landed");
        abandon_allocation(state, &allocation, now).await;
        state.waiters.resolve(offer_id, OfferStatus::Expired);
        return Err(AppError::OfferNoLongerAvailable);
    }

    state.metrics.record_offer("accepted");
    state.waiters.resolve(offer_id, OfferStatus::Accepted);
    state.publish(DispatchEvent::TaskAssigned {
        task_id: task.id,
        worker_id,
        allocation_id: allocation.id,
        total_payout: allocation.total_payout,
        at: now,
    });
    info!(
        offer_id = %offer_id,
        task_id = %task.id,
        worker_id = %worker_id,
        allocation_id = %allocation.id,
        "offer accepted"
    );

    Ok(allocation)
}

/// Closes an allocation whose task was cancelled underneath it. Whoever wins
/// the allocation CAS frees the worker, so a concurrent cancel never frees
/// twice.
async fn abandon_allocation(state: &AppState, allocation: &Allocation, now: DateTime<Utc>) {
    match state
        .allocations
        .update_status(
            allocation.id,
            AllocationStatus::Accepted,
            AllocationStatus::Cancelled,
            now,
        )
        .await
    {
        Ok(_) => {
            free_worker(state, allocation.worker_id, now).await;
            state.metrics.workers_busy.dec();
        }
        Err(err) if err.is_contention() => {
            debug!(allocation_id = %allocation.id, "allocation already closed by cancel");
        }
        Err(err) => {
            warn!(allocation_id = %allocation.id, error = %err, "failed to close abandoned allocation");
        }
    }
}

/// Puts an accepted task back in the pool when the worker side of the
/// acceptance could not be committed.
async fn undo_acceptance(
    state: &AppState,
    task_id: Uuid,
    worker_id: Uuid,
    offer_id: Uuid,
    now: DateTime<Utc>,
    worker_was_claimed: bool,
) {
    if worker_was_claimed
        && let Err(err) = state
            .workers
            .compare_and_set_status(worker_id, WorkerStatus::Busy, WorkerStatus::Available, now)
            .await
    {
        warn!(worker_id = %worker_id, error = %err, "failed to free worker after aborted acceptance");
    }
    if let Err(err) = state.tasks.release(task_id, now).await {
        warn!(task_id = %task_id, error = %err, "failed to release task after aborted acceptance");
    }

    state.book.exclude(task_id, worker_id);
    state.waiters.resolve(offer_id, OfferStatus::Rejected);
}

pub async fn decline_offer(
    state: &AppState,
    offer_id: Uuid,
    worker_id: Uuid,
    reason: DeclineReason,
) -> Result<TaskOffer, AppError> {
    let now = state.clock.now();
    let offer = state.offers.get(offer_id).await?;
    if offer.worker_id != worker_id {
        return Err(AppError::NotOfferRecipient);
    }
    if offer.status != OfferStatus::Pending {
        return Err(AppError::OfferNoLongerAvailable);
    }
    if offer.is_expired(now) {
        expire_offer(state, offer_id).await?;
        return Err(AppError::OfferNoLongerAvailable);
    }

    let declined = state
        .offers
        .compare_and_set_status(
            offer_id,
            OfferStatus::Pending,
            OfferStatus::Rejected,
            now,
            Some(reason),
        )
        .await
        .map_err(no_longer_available)?;

    reopen_task(state, declined.task_id, now).await?;
    state.book.exclude(declined.task_id, worker_id);
    state.waiters.resolve(offer_id, OfferStatus::Rejected);

    state.metrics.record_offer("declined");
    state.publish(DispatchEvent::OfferDeclined {
        offer_id,
        task_id: declined.task_id,
        worker_id,
        reason,
    });
    info!(
        offer_id = %offer_id,
        task_id = %declined.task_id,
        worker_id = %worker_id,
        reason = ?reason,
        "offer declined"
    );

    Ok(declined)
}

/// Expires a pending offer and returns its task to the pool. Returns `false`
/// without side effects when the offer was already resolved.
pub async fn expire_offer(state: &AppState, offer_id: Uuid) -> Result<bool, AppError> {
    let now = state.clock.now();
    let expired = match state
        .offers
        .compare_and_set_status(offer_id, OfferStatus::Pending, OfferStatus::Expired, now, None)
        .await
    {
        Ok(offer) => offer,
        Err(err) if err.is_contention() => return Ok(false),
        Err(err) => return Err(err),
    };

    reopen_task(state, expired.task_id, now).await?;
    state.book.exclude(expired.task_id, expired.worker_id);
    state.waiters.resolve(offer_id, OfferStatus::Expired);

    state.metrics.record_offer("expired");
    state.publish(DispatchEvent::OfferExpired {
        offer_id,
        task_id: expired.task_id,
        worker_id: expired.worker_id,
    });
    info!(
        offer_id = %offer_id,
        task_id = %expired.task_id,
        worker_id = %expired.worker_id,
        "offer expired"
    );

    Ok(true)
}

/// Closes a pending offer without touching its task. Used when the task
/// itself is being cancelled.
pub async fn withdraw_offer(state: &AppState, offer_id: Uuid) -> Result<bool, AppError> {
    let now = state.clock.now();
    match state
        .offers
        .compare_and_set_status(offer_id, OfferStatus::Pending, OfferStatus::Expired, now, None)
        .await
    {
        Ok(offer) => {
            state.waiters.resolve(offer_id, OfferStatus::Expired);
            state.metrics.record_offer("withdrawn");
            debug!(offer_id = %offer_id, task_id = %offer.task_id, "offer withdrawn");
            Ok(true)
        }
        Err(err) if err.is_contention() => Ok(false),
        Err(err) => Err(err),
    }
}

async fn reopen_task(state: &AppState, task_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
    match state
        .tasks
        .compare_and_set_status(task_id, TaskStatus::Assigned, TaskStatus::Pending, now)
        .await
    {
        Ok(_) => Ok(()),
        Err(err) if err.is_contention() => {
            debug!(task_id = %task_id, error = %err, "task already left assigned");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn no_longer_available(err: AppError) -> AppError {
    if err.is_contention() {
        AppError::OfferNoLongerAvailable
    } else {
        err
    }
}
