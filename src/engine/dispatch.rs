use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::eligibility::find_candidates;
use crate::engine::offers::{expire_offer, offer_to_candidate};
use crate::engine::queue::{schedule_retry, DispatchRequest};
use crate::engine::scoring::{rank, CandidateRanking};
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::offer::OfferStatus;
use crate::models::task::{Task, TaskStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A worker accepted the task.
    Assigned,
    /// Every candidate was tried; the task waits for a retry.
    Exhausted,
    /// The task left `pending` through some other path.
    Abandoned,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleOutcome::Assigned => "assigned",
            CycleOutcome::Exhausted => "exhausted",
            CycleOutcome::Abandoned => "abandoned",
        }
    }
}

/// Releases the per-task claim however the driver exits.
struct InFlight {
    state: Arc<AppState>,
    task_id: Uuid,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state.book.release_claim(&self.task_id);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Consumes dispatch requests and drives each task on its own tokio task.
    /// At most one driver runs per task.
    pub async fn run(self, mut dispatch_rx: mpsc::Receiver<DispatchRequest>) {
        info!("dispatcher started");

        while let Some(request) = dispatch_rx.recv().await {
            self.state.metrics.dispatch_queue_depth.dec();
            self.state.book.unmark_queued(&request.task_id);

            if !self.state.book.try_claim(request.task_id) {
                debug!(task_id = %request.task_id, "task already being dispatched");
                continue;
            }

            let dispatcher = self.clone();
            tokio::spawn(async move {
                let _claim = InFlight {
                    state: dispatcher.state.clone(),
                    task_id: request.task_id,
                };

                let start = Instant::now();
                match dispatcher.drive(request).await {
                    Ok(outcome) => {
                        dispatcher
                            .state
                            .metrics
                            .record_cycle(outcome.as_str(), start.elapsed().as_secs_f64());
                    }
                    Err(err) => {
                        dispatcher
                            .state
                            .metrics
                            .record_cycle("error", start.elapsed().as_secs_f64());
                        error!(task_id = %request.task_id, error = %err, "dispatch cycle failed");
                    }
                }
            });
        }

        warn!("dispatcher stopped: queue channel closed");
    }

    /// Offers the task to ranked candidates one at a time until one accepts,
    /// the task leaves `pending`, or nobody is left.
    pub async fn drive(&self, request: DispatchRequest) -> Result<CycleOutcome, AppError> {
        let state = &self.state;
        let task_id = request.task_id;
        let mut ranking: Option<CandidateRanking> = None;

        loop {
            let task = state.tasks.get(task_id).await?;
            match task.status {
                TaskStatus::Pending => {}
                TaskStatus::Accepted | TaskStatus::InProgress | TaskStatus::Completed => {
                    return Ok(CycleOutcome::Assigned);
                }
                _ => return Ok(CycleOutcome::Abandoned),
            }

            let excluded = state.book.excluded(&task_id);
            let mut fresh = false;
            if ranking.as_ref().is_none_or(CandidateRanking::is_stale) {
                ranking = Some(self.rank_candidates(&task, &excluded).await?);
                fresh = true;
            }

            let mut candidate = ranking
                .as_mut()
                .and_then(|ranking| ranking.next_candidate(&excluded));
            if candidate.is_none() && !fresh {
                let mut reranked = self.rank_candidates(&task, &excluded).await?;
                candidate = reranked.next_candidate(&excluded);
                ranking = Some(reranked);
            }

            let Some(candidate) = candidate else {
                return Ok(self.exhausted(task_id, request.attempt));
            };

            let offer = match offer_to_candidate(state, task_id, candidate.worker_id).await {
                Ok(offer) => offer,
                Err(AppError::Internal(message)) => return Err(AppError::Internal(message)),
                Err(err) => {
                    state.book.exclude(task_id, candidate.worker_id);
                    state.metrics.record_offer("skipped");
                    warn!(
                        task_id = %task_id,
                        worker_id = %candidate.worker_id,
                        error = %err,
                        "skipping candidate"
                    );
                    continue;
                }
            };

            debug!(
                task_id = %task_id,
                worker_id = %candidate.worker_id,
                score = candidate.score,
                distance_km = candidate.breakdown.distance_km,
                rating_score = candidate.breakdown.rating_score,
                success_score = candidate.breakdown.success_score,
                "waiting on offer"
            );

            let resolution = self.await_resolution(offer.id, offer.expires_at).await?;
            debug!(offer_id = %offer.id, status = resolution.as_str(), "offer resolved");
        }
    }

    async fn rank_candidates(
        &self,
        task: &Task,
        excluded: &HashSet<Uuid>,
    ) -> Result<CandidateRanking, AppError> {
        let settings = &self.state.settings;
        let candidates = find_candidates(&self.state, task, excluded).await?;
        let ranked = rank(&candidates, settings.search_radius_km, &settings.weights);
        Ok(CandidateRanking::new(ranked, settings.ranking_stale_after))
    }

    /// Blocks until the offer resolves or its deadline passes, expiring it in
    /// the latter case.
    async fn await_resolution(
        &self,
        offer_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<OfferStatus, AppError> {
        let state = &self.state;
        let resolved = state.waiters.register(offer_id);

        let current = state.offers.get(offer_id).await?;
        if current.status != OfferStatus::Pending {
            state.waiters.discard(&offer_id);
            return Ok(current.status);
        }

        let remaining = (expires_at - state.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            status = resolved => match status {
                Ok(status) => Ok(status),
                Err(_) => Ok(state.offers.get(offer_id).await?.status),
            },
            _ = sleep(remaining) => {
                expire_offer(state, offer_id).await?;
                state.waiters.discard(&offer_id);
                Ok(state.offers.get(offer_id).await?.status)
            }
        }
    }

    fn exhausted(&self, task_id: Uuid, attempt: u32) -> CycleOutcome {
        let state = &self.state;
        state.book.clear_exclusions(&task_id);

        if attempt >= state.settings.max_dispatch_attempts {
            state.book.mark_exhausted(task_id);
            state.metrics.dispatch_exhausted_total.inc();
            state.publish(DispatchEvent::DispatchExhausted {
                task_id,
                attempts: attempt,
            });
            warn!(task_id = %task_id, attempts = attempt, "dispatch attempts exhausted; task stays pending");
        } else {
            warn!(task_id = %task_id, attempt, "no eligible workers; retrying after backoff");
            schedule_retry(state.clone(), task_id, attempt + 1);
        }

        CycleOutcome::Exhausted
    }
}

pub async fn run_dispatcher(state: Arc<AppState>, dispatch_rx: mpsc::Receiver<DispatchRequest>) {
    Dispatcher::new(state).run(dispatch_rx).await;
}
