use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ScreenId, ShowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowStatus {
    Available,
    Full,
    Cancelled,
}

impl FromStr for ShowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(ShowStatus::Available),
            "FULL" => Ok(ShowStatus::Full),
            "CANCELLED" => Ok(ShowStatus::Cancelled),
            other => Err(format!("unknown show status '{}'", other)),
        }
    }
}

/// Сеанс. После планирования меняются только `available_seats` и `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: ShowId,
    pub movie_id: i64,
    pub screen_id: ScreenId,
    pub show_time: DateTime<Utc>,
    pub base_price: i64,
    pub available_seats: i32,
    pub status: ShowStatus,
}

impl Show {
    pub fn apply(&mut self, availability: ShowAvailability) {
        self.available_seats = availability.available_seats;
        self.status = availability.status;
    }
}

/// Агрегаты сеанса после фиксации бронирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowAvailability {
    pub available_seats: i32,
    pub status: ShowStatus,
}

impl ShowAvailability {
    pub fn of(show: &Show) -> Self {
        Self { available_seats: show.available_seats, status: show.status }
    }

    /// Пересчёт агрегатов после продажи `booked` мест.
    pub fn after_booking(show: &Show, booked: usize) -> Self {
        let available_seats = show.available_seats - booked as i32;
        let status = if show.status == ShowStatus::Cancelled {
            ShowStatus::Cancelled
        } else if available_seats <= 0 {
            ShowStatus::Full
        } else {
            show.status
        };
        Self { available_seats: available_seats.max(0), status }
    }
}
