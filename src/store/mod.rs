//! Persistence contracts for the dispatch engine. Every `compare_and_set_*`
//! call is the linearization point for its record: the status check and the
//! write happen under one lock, so concurrent writers cannot both commit from
//! the same source state.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::allocation::{Allocation, AllocationStatus};
use crate::models::earning::Earning;
use crate::models::offer::{DeclineReason, OfferStatus, TaskOffer};
use crate::models::task::{Task, TaskStatus, TaskType};
use crate::models::worker::{GeoPoint, Worker, WorkerStatus};

pub use memory::{
    InMemoryAllocationStore, InMemoryEarningStore, InMemoryOfferStore, InMemoryTaskStore,
    InMemoryWorkerStore,
};

#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn insert(&self, worker: Worker) -> Result<Worker, AppError>;
    async fn get(&self, id: Uuid) -> Result<Worker, AppError>;
    async fn list(&self) -> Result<Vec<Worker>, AppError>;

    /// Active, available workers of one tenant able to take `task_type`,
    /// nearest first. `limit` applies after every filter.
    async fn find_available_near(
        &self,
        tenant_id: Uuid,
        point: GeoPoint,
        radius_km: f64,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<Worker>, AppError>;

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: WorkerStatus,
        new: WorkerStatus,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError>;

    /// Applies the location only if `recorded_at` is newer than the stored fix.
    async fn update_location(
        &self,
        id: Uuid,
        point: GeoPoint,
        recorded_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn record_outcome(
        &self,
        id: Uuid,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError>;

    async fn apply_rating(
        &self,
        id: Uuid,
        rating: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError>;

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Worker, AppError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<Task, AppError>;
    async fn get(&self, id: Uuid) -> Result<Task, AppError>;
    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, AppError>;

    /// Pending tasks, highest priority first, then oldest first.
    async fn find_pending(
        &self,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<Task>, AppError>;

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: TaskStatus,
        new: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError>;

    /// `in_progress -> failed`, recording the reported reason in the same write.
    async fn mark_failed(
        &self,
        id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError>;

    /// `accepted -> pending` after the worker backs out before starting.
    async fn release(&self, id: Uuid, now: DateTime<Utc>) -> Result<Task, AppError>;

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>, AppError>;

    /// Tasks still `assigned` whose offer went out at or before `assigned_before`.
    async fn find_stuck_assigned(
        &self,
        assigned_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, AppError>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Fails with `DuplicatePendingOffer` if the task already has a pending offer.
    async fn create(&self, offer: TaskOffer) -> Result<TaskOffer, AppError>;
    async fn get(&self, id: Uuid) -> Result<TaskOffer, AppError>;

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OfferStatus,
        new: OfferStatus,
        responded_at: DateTime<Utc>,
        reason: Option<DeclineReason>,
    ) -> Result<TaskOffer, AppError>;

    /// Pending offers whose deadline is at or before `before`.
    async fn find_expiring(&self, before: DateTime<Utc>) -> Result<Vec<TaskOffer>, AppError>;
    async fn find_pending_for_task(&self, task_id: Uuid) -> Result<Option<TaskOffer>, AppError>;
    async fn find_pending_for_worker(&self, worker_id: Uuid) -> Result<Vec<TaskOffer>, AppError>;
    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<TaskOffer>, AppError>;
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Fails if the task or the worker already holds an active allocation.
    async fn create(&self, allocation: Allocation) -> Result<Allocation, AppError>;
    async fn get(&self, id: Uuid) -> Result<Allocation, AppError>;

    async fn update_status(
        &self,
        id: Uuid,
        expected: AllocationStatus,
        new: AllocationStatus,
        at: DateTime<Utc>,
    ) -> Result<Allocation, AppError>;

    async fn find_active_for_task(&self, task_id: Uuid) -> Result<Option<Allocation>, AppError>;
    async fn find_active_for_worker(
        &self,
        worker_id: Uuid,
    ) -> Result<Option<Allocation>, AppError>;
    async fn list(&self) -> Result<Vec<Allocation>, AppError>;
}

#[async_trait]
pub trait EarningStore: Send + Sync {
    async fn create(&self, earning: Earning) -> Result<Earning, AppError>;
    async fn list_for_worker(&self, worker_id: Uuid) -> Result<Vec<Earning>, AppError>;
    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Earning>, AppError>;
}
