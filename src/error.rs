use thiserror::Error;

use crate::models::{SeatId, ShowId};

/// Ошибки хранилища (Postgres или in-memory).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Доменные ошибки резервирования. Каждая ошибка доходит до клиента
/// с машинно-читаемым `kind`, повторы инициирует только клиент.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("некорректный запрос: {0}")]
    InvalidRequest(String),

    #[error("места недоступны: {seat_ids:?}")]
    SeatUnavailable { seat_ids: Vec<SeatId> },

    #[error("время удержания мест истекло")]
    HoldExpired,

    #[error("удержание принадлежит другой сессии")]
    NotOwner,

    #[error("сеанс {0} не найден")]
    ShowNotFound(ShowId),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("внутренняя ошибка: {0}")]
    Internal(String),
}

impl ReservationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationError::InvalidRequest(_) => "InvalidRequest",
            ReservationError::SeatUnavailable { .. } => "SeatUnavailable",
            ReservationError::HoldExpired => "HoldExpired",
            ReservationError::NotOwner => "NotOwner",
            ReservationError::ShowNotFound(_) => "NotFound",
            ReservationError::Storage(_) | ReservationError::Internal(_) => "Internal",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ReservationError::InvalidRequest(message.into())
    }
}
