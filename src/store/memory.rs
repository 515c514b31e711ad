use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{AllocationStore, EarningStore, OfferStore, TaskStore, WorkerStore};
use crate::engine::scorecard;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::allocation::{Allocation, AllocationStatus};
use crate::models::earning::Earning;
use crate::models::offer::{DeclineReason, OfferStatus, TaskOffer};
use crate::models::task::{Task, TaskStatus, TaskType};
use crate::models::worker::{GeoPoint, Worker, WorkerStatus};

fn not_found(entity: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{entity} {id} not found"))
}

#[derive(Debug, Default)]
pub struct InMemoryWorkerStore {
    workers: DashMap<Uuid, Worker>,
}

impl InMemoryWorkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerStore for InMemoryWorkerStore {
    async fn insert(&self, worker: Worker) -> Result<Worker, AppError> {
        match self.workers.entry(worker.id) {
            Entry::Occupied(_) => Err(AppError::Validation(format!(
                "worker {} already exists",
                worker.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(worker).clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Worker, AppError> {
        self.workers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("worker", id))
    }

    async fn list(&self) -> Result<Vec<Worker>, AppError> {
        let mut workers: Vec<Worker> = self
            .workers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        workers.sort_by_key(|worker| worker.created_at);
        Ok(workers)
    }

    async fn find_available_near(
        &self,
        tenant_id: Uuid,
        point: GeoPoint,
        radius_km: f64,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<Worker>, AppError> {
        let mut hits: Vec<(f64, Worker)> = self
            .workers
            .iter()
            .filter_map(|entry| {
                let worker = entry.value();
                if worker.tenant_id != tenant_id {
                    return None;
                }
                let can_take = match task_type {
                    Some(task_type) => worker.can_accept_task(task_type),
                    None => worker.status == WorkerStatus::Available && worker.is_active,
                };
                if !can_take {
                    return None;
                }

                let distance = haversine_km(&point, &worker.location);
                (distance <= radius_km).then(|| (distance, worker.clone()))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(hits.into_iter().take(limit).map(|(_, worker)| worker).collect())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: WorkerStatus,
        new: WorkerStatus,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError> {
        let mut worker = self.workers.get_mut(&id).ok_or_else(|| not_found("worker", id))?;

        if worker.status != expected {
            return Err(AppError::StatusConflict {
                entity: "worker",
                expected: expected.as_str().to_string(),
                actual: worker.status.as_str().to_string(),
            });
        }

        worker.transition_to(new, now)?;
        Ok(worker.clone())
    }

    async fn update_location(
        &self,
        id: Uuid,
        point: GeoPoint,
        recorded_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut worker = self.workers.get_mut(&id).ok_or_else(|| not_found("worker", id))?;

        if recorded_at <= worker.location_updated_at {
            return Ok(false);
        }

        worker.location = point;
        worker.location_updated_at = recorded_at;
        worker.updated_at = recorded_at;
        Ok(true)
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError> {
        let mut worker = self.workers.get_mut(&id).ok_or_else(|| not_found("worker", id))?;
        scorecard::record_outcome(&mut *worker, completed, now);
        Ok(worker.clone())
    }

    async fn apply_rating(
        &self,
        id: Uuid,
        rating: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError> {
        let mut worker = self.workers.get_mut(&id).ok_or_else(|| not_found("worker", id))?;
        worker.rating = scorecard::next_rating(worker.rating, worker.completed_tasks, rating)?;
        worker.updated_at = now;
        Ok(worker.clone())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError> {
        let mut worker = self.workers.get_mut(&id).ok_or_else(|| not_found("worker", id))?;
        worker.is_active = active;
        worker.updated_at = now;
        Ok(worker.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, AppError> {
        match self.tasks.entry(task.id) {
            Entry::Occupied(_) => Err(AppError::Validation(format!(
                "task {} already exists",
                task.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(task).clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Task, AppError> {
        self.tasks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("task", id))
    }

    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, AppError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.value().status == status))
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    async fn find_pending(
        &self,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<Task>, AppError> {
        let mut pending: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| {
                let task = entry.value();
                task.status == TaskStatus::Pending
                    && task_type.is_none_or(|task_type| task.task_type == task_type)
            })
            .map(|entry| entry.value().clone())
            .collect();

        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: TaskStatus,
        new: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError> {
        let mut task = self.tasks.get_mut(&id).ok_or_else(|| not_found("task", id))?;

        if task.status != expected {
            return Err(AppError::StatusConflict {
                entity: "task",
                expected: expected.as_str().to_string(),
                actual: task.status.as_str().to_string(),
            });
        }

        task.transition_to(new, now)?;
        Ok(task.clone())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError> {
        let mut task = self.tasks.get_mut(&id).ok_or_else(|| not_found("task", id))?;
        task.transition_to(TaskStatus::Failed, now)?;
        task.failure_reason = Some(reason);
        Ok(task.clone())
    }

    async fn release(&self, id: Uuid, now: DateTime<Utc>) -> Result<Task, AppError> {
        let mut task = self.tasks.get_mut(&id).ok_or_else(|| not_found("task", id))?;
        task.release(now)?;
        Ok(task.clone())
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>, AppError> {
        Ok(self
            .tasks
            .iter()
            .filter(|entry| entry.value().is_overdue(now))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_stuck_assigned(
        &self,
        assigned_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, AppError> {
        Ok(self
            .tasks
            .iter()
            .filter(|entry| {
                let task = entry.value();
                task.status == TaskStatus::Assigned
                    && task.assigned_at.is_some_and(|at| at <= assigned_before)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}

/// Offers plus an index of the single pending offer per task. The index slot
/// is claimed before the offer becomes visible, which is what enforces
/// at-most-one pending offer per task.
#[derive(Debug, Default)]
pub struct InMemoryOfferStore {
    offers: DashMap<Uuid, TaskOffer>,
    pending_by_task: DashMap<Uuid, Uuid>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn create(&self, offer: TaskOffer) -> Result<TaskOffer, AppError> {
        if offer.status != OfferStatus::Pending {
            return Err(AppError::Validation(
                "new offers must be pending".to_string(),
            ));
        }

        match self.pending_by_task.entry(offer.task_id) {
            Entry::Occupied(_) => return Err(AppError::DuplicatePendingOffer),
            Entry::Vacant(slot) => {
                slot.insert(offer.id);
            }
        }

        self.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn get(&self, id: Uuid) -> Result<TaskOffer, AppError> {
        self.offers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("offer", id))
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OfferStatus,
        new: OfferStatus,
        responded_at: DateTime<Utc>,
        reason: Option<DeclineReason>,
    ) -> Result<TaskOffer, AppError> {
        let updated = {
            let mut offer = self.offers.get_mut(&id).ok_or_else(|| not_found("offer", id))?;

            if offer.status != expected {
                return Err(AppError::StatusConflict {
                    entity: "offer",
                    expected: expected.as_str().to_string(),
                    actual: offer.status.as_str().to_string(),
                });
            }
            if !offer.status.can_transition_to(new) {
                return Err(AppError::InvalidStatusTransition {
                    entity: "offer",
                    from: offer.status.as_str().to_string(),
                    to: new.as_str().to_string(),
                });
            }

            offer.status = new;
            offer.responded_at = Some(responded_at);
            offer.decline_reason = reason;
            offer.clone()
        };

        self.pending_by_task
            .remove_if(&updated.task_id, |_, pending_id| *pending_id == updated.id);
        Ok(updated)
    }

    async fn find_expiring(&self, before: DateTime<Utc>) -> Result<Vec<TaskOffer>, AppError> {
        let mut expiring: Vec<TaskOffer> = self
            .offers
            .iter()
            .filter(|entry| entry.value().is_expired(before))
            .map(|entry| entry.value().clone())
            .collect();
        expiring.sort_by_key(|offer| offer.expires_at);
        Ok(expiring)
    }

    async fn find_pending_for_task(&self, task_id: Uuid) -> Result<Option<TaskOffer>, AppError> {
        let Some(offer_id) = self.pending_by_task.get(&task_id).map(|entry| *entry.value()) else {
            return Ok(None);
        };

        Ok(self
            .offers
            .get(&offer_id)
            .map(|entry| entry.value().clone())
            .filter(|offer| offer.status == OfferStatus::Pending))
    }

    async fn find_pending_for_worker(&self, worker_id: Uuid) -> Result<Vec<TaskOffer>, AppError> {
        Ok(self
            .offers
            .iter()
            .filter(|entry| {
                let offer = entry.value();
                offer.worker_id == worker_id && offer.status == OfferStatus::Pending
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<TaskOffer>, AppError> {
        let mut offers: Vec<TaskOffer> = self
            .offers
            .iter()
            .filter(|entry| entry.value().task_id == task_id)
            .map(|entry| entry.value().clone())
            .collect();
        offers.sort_by_key(|offer| offer.offered_at);
        Ok(offers)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAllocationStore {
    allocations: DashMap<Uuid, Allocation>,
    active_by_task: DashMap<Uuid, Uuid>,
    active_by_worker: DashMap<Uuid, Uuid>,
}

impl InMemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self, index: &DashMap<Uuid, Uuid>, key: Uuid) -> Option<Allocation> {
        let allocation_id = index.get(&key).map(|entry| *entry.value())?;
        self.allocations
            .get(&allocation_id)
            .map(|entry| entry.value().clone())
            .filter(|allocation| allocation.status.is_active())
    }
}

#[async_trait]
impl AllocationStore for InMemoryAllocationStore {
    async fn create(&self, allocation: Allocation) -> Result<Allocation, AppError> {
        if !allocation.status.is_active() {
            return Err(AppError::Validation(
                "new allocations must be active".to_string(),
            ));
        }

        match self.active_by_task.entry(allocation.task_id) {
            Entry::Occupied(_) => {
                return Err(AppError::ActiveAllocationExists(format!(
                    "task {}",
                    allocation.task_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(allocation.id);
            }
        }

        match self.active_by_worker.entry(allocation.worker_id) {
            Entry::Occupied(_) => {
                self.active_by_task
                    .remove_if(&allocation.task_id, |_, id| *id == allocation.id);
                return Err(AppError::ActiveAllocationExists(format!(
                    "worker {}",
                    allocation.worker_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(allocation.id);
            }
        }

        self.allocations.insert(allocation.id, allocation.clone());
        Ok(allocation)
    }

    async fn get(&self, id: Uuid) -> Result<Allocation, AppError> {
        self.allocations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("allocation", id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AllocationStatus,
        new: AllocationStatus,
        at: DateTime<Utc>,
    ) -> Result<Allocation, AppError> {
        let updated = {
            let mut allocation = self
                .allocations
                .get_mut(&id)
                .ok_or_else(|| not_found("allocation", id))?;

            if allocation.status != expected {
                return Err(AppError::StatusConflict {
                    entity: "allocation",
                    expected: expected.as_str().to_string(),
                    actual: allocation.status.as_str().to_string(),
                });
            }
            if !allocation.status.can_transition_to(new) {
                return Err(AppError::InvalidStatusTransition {
                    entity: "allocation",
                    from: allocation.status.as_str().to_string(),
                    to: new.as_str().to_string(),
                });
            }

            allocation.status = new;
            match new {
                AllocationStatus::Accepted => allocation.accepted_at = Some(at),
                AllocationStatus::Completed
                | AllocationStatus::Failed
                | AllocationStatus::Cancelled => allocation.completed_at = Some(at),
                _ => {}
            }
            allocation.clone()
        };

        if !updated.status.is_active() {
            self.active_by_task
                .remove_if(&updated.task_id, |_, active_id| *active_id == updated.id);
            self.active_by_worker
                .remove_if(&updated.worker_id, |_, active_id| *active_id == updated.id);
        }
        Ok(updated)
    }

    async fn find_active_for_task(&self, task_id: Uuid) -> Result<Option<Allocation>, AppError> {
        Ok(self.active(&self.active_by_task, task_id))
    }

    async fn find_active_for_worker(
        &self,
        worker_id: Uuid,
    ) -> Result<Option<Allocation>, AppError> {
        Ok(self.active(&self.active_by_worker, worker_id))
    }

    async fn list(&self) -> Result<Vec<Allocation>, AppError> {
        let mut allocations: Vec<Allocation> = self
            .allocations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        allocations.sort_by_key(|allocation| allocation.allocated_at);
        Ok(allocations)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEarningStore {
    earnings: DashMap<Uuid, Earning>,
}

impl InMemoryEarningStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EarningStore for InMemoryEarningStore {
    async fn create(&self, earning: Earning) -> Result<Earning, AppError> {
        if earning.amount < Decimal::ZERO {
            return Err(AppError::Validation(
                "earning amount cannot be negative".to_string(),
            ));
        }

        match self.earnings.entry(earning.id) {
            Entry::Occupied(_) => Err(AppError::Validation(format!(
                "earning {} already recorded",
                earning.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(earning).clone()),
        }
    }

    async fn list_for_worker(&self, worker_id: Uuid) -> Result<Vec<Earning>, AppError> {
        let mut earnings: Vec<Earning> = self
            .earnings
            .iter()
            .filter(|entry| entry.value().worker_id == worker_id)
            .map(|entry| entry.value().clone())
            .collect();
        earnings.sort_by_key(|earning| earning.created_at);
        Ok(earnings)
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Earning>, AppError> {
        Ok(self
            .earnings
            .iter()
            .filter(|entry| entry.value().task_id == task_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{InMemoryAllocationStore, InMemoryOfferStore, InMemoryWorkerStore};
    use crate::error::AppError;
    use crate::models::allocation::{Allocation, AllocationStatus};
    use crate::models::offer::{OfferStatus, TaskOffer};
    use crate::models::task::TaskType;
    use crate::models::worker::{GeoPoint, Worker, WorkerStatus, WorkerType};
    use crate::store::{AllocationStore, OfferStore, WorkerStore};

    fn worker_at(tenant_id: Uuid, lat: f64, lng: f64) -> Worker {
        let now = Utc::now();
        Worker {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Ada".to_string(),
            phone: "+2348000000001".to_string(),
            worker_type: WorkerType::Delivery,
            status: WorkerStatus::Available,
            location: GeoPoint::new(lat, lng),
            location_updated_at: now,
            rating: Decimal::from(5),
            total_tasks: 0,
            completed_tasks: 0,
            is_verified: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn offer(task_id: Uuid) -> TaskOffer {
        let now = Utc::now();
        TaskOffer {
            id: Uuid::new_v4(),
            task_id,
            worker_id: Uuid::new_v4(),
            status: OfferStatus::Pending,
            offered_at: now,
            expires_at: now + Duration::seconds(120),
            responded_at: None,
            payout_amount: Decimal::from(900),
            decline_reason: None,
        }
    }

    fn allocation(task_id: Uuid, worker_id: Uuid) -> Allocation {
        let now = Utc::now();
        Allocation {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            task_id,
            worker_id,
            offer_id: Uuid::new_v4(),
            status: AllocationStatus::Accepted,
            base_payout: Decimal::from(500),
            bonus_payout: Decimal::from(100),
            surge_multiplier: Decimal::ONE,
            total_payout: Decimal::from(600),
            allocated_at: now,
            accepted_at: Some(now),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn nearby_query_limits_within_the_tenant() {
        let store = InMemoryWorkerStore::new();
        let tenant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let pickup = GeoPoint::new(6.5244, 3.3792);

        store.insert(worker_at(other, 6.5244, 3.3792)).await.unwrap();
        store.insert(worker_at(other, 6.5245, 3.3792)).await.unwrap();
        let own = store.insert(worker_at(tenant, 6.5300, 3.3792)).await.unwrap();

        let found = store
            .find_available_near(tenant, pickup, 10.0, Some(TaskType::Delivery), 2)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, own.id);
    }

    #[tokio::test]
    async fn second_pending_offer_for_task_is_rejected() {
        let store = InMemoryOfferStore::new();
        let task_id = Uuid::new_v4();

        store.create(offer(task_id)).await.unwrap();
        let err = store.create(offer(task_id)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicatePendingOffer));
    }

    #[tokio::test]
    async fn resolving_an_offer_frees_the_task_slot() {
        let store = InMemoryOfferStore::new();
        let task_id = Uuid::new_v4();
        let first = store.create(offer(task_id)).await.unwrap();

        store
            .compare_and_set_status(first.id, OfferStatus::Pending, OfferStatus::Expired, Utc::now(), None)
            .await
            .unwrap();

        assert!(store.find_pending_for_task(task_id).await.unwrap().is_none());
        assert!(store.create(offer(task_id)).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_offer_creation_yields_one_pending_offer() {
        let store = Arc::new(InMemoryOfferStore::new());
        let task_id = Uuid::new_v4();

        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create(offer(task_id)).await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        let pending = store
            .list_for_task(task_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|offer| offer.status == OfferStatus::Pending)
            .count();
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn cas_on_resolved_offer_reports_conflict() {
        let store = InMemoryOfferStore::new();
        let created = store.create(offer(Uuid::new_v4())).await.unwrap();

        store
            .compare_and_set_status(created.id, OfferStatus::Pending, OfferStatus::Accepted, Utc::now(), None)
            .await
            .unwrap();
        let err = store
            .compare_and_set_status(created.id, OfferStatus::Pending, OfferStatus::Expired, Utc::now(), None)
            .await
            .unwrap_err();

        assert!(err.is_contention());
        assert_eq!(store.get(created.id).await.unwrap().status, OfferStatus::Accepted);
    }

    #[tokio::test]
    async fn worker_cannot_hold_two_active_allocations() {
        let store = InMemoryAllocationStore::new();
        let worker_id = Uuid::new_v4();

        let first = store
            .create(allocation(Uuid::new_v4(), worker_id))
            .await
            .unwrap();
        let err = store
            .create(allocation(Uuid::new_v4(), worker_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ActiveAllocationExists(_)));

        store
            .update_status(first.id, AllocationStatus::Accepted, AllocationStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert!(store.find_active_for_worker(worker_id).await.unwrap().is_none());
        assert!(store.create(allocation(Uuid::new_v4(), worker_id)).await.is_ok());
    }
}
