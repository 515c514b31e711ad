use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::offers;
use crate::error::AppError;
use crate::models::allocation::Allocation;
use crate::models::offer::{DeclineReason, TaskOffer};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/decline", post(decline_offer))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub worker_id: Uuid,
}

#[derive(Deserialize)]
pub struct DeclineRequest {
    pub worker_id: Uuid,
    #[serde(default = "default_reason")]
    pub reason: DeclineReason,
}

fn default_reason() -> DeclineReason {
    DeclineReason::Other
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Allocation>, AppError> {
    let allocation = offers::accept_offer(&state, id, payload.worker_id).await?;
    Ok(Json(allocation))
}

async fn decline_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeclineRequest>,
) -> Result<Json<TaskOffer>, AppError> {
    let offer = offers::decline_offer(&state, id, payload.worker_id, payload.reason).await?;
    Ok(Json(offer))
}
