use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::error::ApiError;
use crate::middleware::Holder;
use crate::models::Booking;
use crate::reservation::HoldGrant;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/holds/{token}", delete(cancel_hold))
        .route("/holds/{token}/extend", post(extend_hold))
        .route("/holds/{token}/confirm", post(confirm_hold))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmHoldRequest {
    #[validate(length(min = 1, max = 512, message = "paymentProof должен быть от 1 до 512 символов"))]
    pub payment_proof: String,
}

// POST /api/holds/{token}/extend
async fn extend_hold(
    State(state): State<Arc<AppState>>,
    Holder(holder_id): Holder,
    token: Result<Path<String>, PathRejection>,
) -> Result<Json<HoldGrant>, ApiError> {
    let Path(token) = token?;
    let grant = state.coordinator.extend_hold(&token, &holder_id).await?;
    Ok(Json(grant))
}

// POST /api/holds/{token}/confirm
async fn confirm_hold(
    State(state): State<Arc<AppState>>,
    Holder(holder_id): Holder,
    token: Result<Path<String>, PathRejection>,
    payload: Result<Json<ConfirmHoldRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Path(token) = token?;
    let Json(req) = payload?;
    req.validate()?;

    let booking = state.coordinator.confirm_hold(&token, &holder_id, &req.payment_proof).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// DELETE /api/holds/{token}
async fn cancel_hold(
    State(state): State<Arc<AppState>>,
    Holder(holder_id): Holder,
    token: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(token) = token?;
    state.coordinator.cancel_hold(&token, &holder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
