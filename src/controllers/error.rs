use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use validator::ValidationErrors;

use crate::error::ReservationError;
use crate::models::SeatId;

/// Ошибка HTTP-слоя. Тело всегда одной формы:
/// `{"success": false, "kind": "...", "message": "...", "seatIds": [...]}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub seat_ids: Option<Vec<SeatId>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    success: bool,
    kind: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seat_ids: Option<&'a [SeatId]>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into(), seat_ids: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            kind: self.kind,
            message: &self.message,
            seat_ids: self.seat_ids.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        let status = match &e {
            ReservationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ReservationError::SeatUnavailable { .. } => StatusCode::CONFLICT,
            ReservationError::HoldExpired => StatusCode::GONE,
            ReservationError::NotOwner => StatusCode::FORBIDDEN,
            ReservationError::ShowNotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::Storage(_) | ReservationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Детали внутренних ошибок только в лог
        let message = if status.is_server_error() {
            error!("Request failed: {}", e);
            "внутренняя ошибка сервера".to_string()
        } else {
            e.to_string()
        };

        let seat_ids = match &e {
            ReservationError::SeatUnavailable { seat_ids } => Some(seat_ids.clone()),
            _ => None,
        };

        Self { status, kind: e.kind(), message, seat_ids }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::invalid(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::invalid(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::invalid(e.body_text())
    }
}
