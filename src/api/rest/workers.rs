use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::availability::{self, NearbyWorker};
use crate::engine::intake::{self, NewWorker};
use crate::engine::scorecard;
use crate::error::AppError;
use crate::models::earning::Earning;
use crate::models::offer::TaskOffer;
use crate::models::worker::{GeoPoint, Worker, WorkerStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workers", post(create_worker).get(list_workers))
        .route("/workers/nearby", get(nearby_workers))
        .route("/workers/:id", get(get_worker))
        .route("/workers/:id/status", patch(update_worker_status))
        .route("/workers/:id/location", patch(update_worker_location))
        .route("/workers/:id/active", patch(update_worker_active))
        .route("/workers/:id/rating", post(rate_worker))
        .route("/workers/:id/offers", get(pending_offers))
        .route("/workers/:id/earnings", get(list_earnings))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: WorkerStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct UpdateLocationResponse {
    pub applied: bool,
    pub worker: Worker,
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: Decimal,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn create_worker(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewWorker>,
) -> Result<Json<Worker>, AppError> {
    let worker = intake::register_worker(&state, payload).await?;
    Ok(Json(worker))
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Worker>>, AppError> {
    Ok(Json(state.workers.list().await?))
}

async fn get_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worker>, AppError> {
    Ok(Json(state.workers.get(id).await?))
}

async fn update_worker_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker = availability::set_status(&state, id, payload.status).await?;
    Ok(Json(worker))
}

async fn update_worker_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    let applied =
        availability::update_location(&state, id, payload.location, payload.recorded_at).await?;
    let worker = state.workers.get(id).await?;
    Ok(Json(UpdateLocationResponse { applied, worker }))
}

async fn update_worker_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker = availability::set_active(&state, id, payload.is_active).await?;
    Ok(Json(worker))
}

async fn rate_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker = scorecard::submit_rating(&state, id, payload.rating).await?;
    Ok(Json(worker))
}

async fn pending_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskOffer>>, AppError> {
    state.workers.get(id).await?;
    Ok(Json(state.offers.find_pending_for_worker(id).await?))
}

async fn list_earnings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Earning>>, AppError> {
    state.workers.get(id).await?;
    Ok(Json(state.earnings.list_for_worker(id).await?))
}

async fn nearby_workers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyWorker>>, AppError> {
    let radius_km = query
        .radius_km
        .unwrap_or(state.settings.search_radius_km);
    let limit = query.limit.unwrap_or(state.settings.candidate_limit);

    let found =
        availability::nearby(&state, GeoPoint::new(query.lat, query.lng), radius_km, limit).await?;
    Ok(Json(found))
}
