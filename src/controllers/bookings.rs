use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::controllers::error::ApiError;
use crate::middleware::Holder;
use crate::models::Booking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/bookings", get(list_bookings))
}

// GET /api/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Holder(holder_id): Holder,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.coordinator.bookings_for(&holder_id).await?;
    Ok(Json(bookings))
}
