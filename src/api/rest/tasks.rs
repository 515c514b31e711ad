use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::allocation::{self, CompletionReceipt};
use crate::engine::intake::{self, NewTask};
use crate::error::AppError;
use crate::models::allocation::Allocation;
use crate::models::offer::TaskOffer;
use crate::models::task::{Task, TaskStatus};
use crate::ports::CompletionProof;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/cancel", post(cancel_task))
        .route("/tasks/:id/start", post(start_task))
        .route("/tasks/:id/complete", post(complete_task))
        .route("/tasks/:id/fail", post(fail_task))
        .route("/tasks/:id/release", post(release_task))
        .route("/allocations", get(list_allocations))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[derive(Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub total_payout: Decimal,
    pub offers: Vec<TaskOffer>,
    pub allocation: Option<Allocation>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct WorkerActionRequest {
    pub worker_id: Uuid,
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub proof: CompletionProof,
}

#[derive(Deserialize)]
pub struct FailRequest {
    pub worker_id: Uuid,
    pub reason: String,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewTask>,
) -> Result<Json<Task>, AppError> {
    let task = intake::create_task(&state, payload).await?;
    Ok(Json(task))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(state.tasks.list(query.status).await?))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetail>, AppError> {
    let task = state.tasks.get(id).await?;
    let offers = state.offers.list_for_task(id).await?;
    let allocation = state.allocations.find_active_for_task(id).await?;

    Ok(Json(TaskDetail {
        total_payout: task.total_payout(),
        task,
        offers,
        allocation,
    }))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Task>, AppError> {
    let reason = payload
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| "cancelled by requester".to_string());
    let task = allocation::cancel_task(&state, id, reason).await?;
    Ok(Json(task))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkerActionRequest>,
) -> Result<Json<Task>, AppError> {
    let task = allocation::start_task(&state, id, payload.worker_id).await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<CompletionReceipt>, AppError> {
    let receipt = allocation::complete_task(&state, id, payload.worker_id, payload.proof).await?;
    Ok(Json(receipt))
}

async fn fail_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FailRequest>,
) -> Result<Json<Task>, AppError> {
    let task = allocation::fail_task(&state, id, payload.worker_id, payload.reason).await?;
    Ok(Json(task))
}

async fn release_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkerActionRequest>,
) -> Result<Json<Task>, AppError> {
    let task = allocation::release_task(&state, id, payload.worker_id).await?;
    Ok(Json(task))
}

async fn list_allocations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Allocation>>, AppError> {
    Ok(Json(state.allocations.list().await?))
}
