use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::error::ApiError;
use crate::middleware::Holder;
use crate::models::{SeatId, SeatView, Show, ShowId};
use crate::reservation::HoldGrant;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{id}", get(get_show))
        .route("/shows/{id}/seats", get(get_seats))
        .route("/shows/{id}/lock-seats", post(lock_seats))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LockSeatsRequest {
    #[validate(length(min = 1, message = "seatIds не может быть пустым"))]
    pub seat_ids: Vec<SeatId>,
}

// GET /api/shows/{id}
async fn get_show(
    State(state): State<Arc<AppState>>,
    show_id: Result<Path<ShowId>, PathRejection>,
) -> Result<Json<Show>, ApiError> {
    let Path(show_id) = show_id?;
    let show = state.coordinator.show(show_id).await?;
    Ok(Json(show))
}

// GET /api/shows/{id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    show_id: Result<Path<ShowId>, PathRejection>,
) -> Result<Json<Vec<SeatView>>, ApiError> {
    let Path(show_id) = show_id?;
    let map = state.coordinator.seat_map(show_id).await?;
    Ok(Json(map.seats))
}

// POST /api/shows/{id}/lock-seats
async fn lock_seats(
    State(state): State<Arc<AppState>>,
    Holder(holder_id): Holder,
    show_id: Result<Path<ShowId>, PathRejection>,
    payload: Result<Json<LockSeatsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HoldGrant>), ApiError> {
    let Path(show_id) = show_id?;
    let Json(req) = payload?;
    req.validate()?;

    let grant = state.coordinator.request_hold(show_id, &req.seat_ids, &holder_id).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}
