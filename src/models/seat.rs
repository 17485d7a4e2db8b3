use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ScreenId, SeatId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    Standard,
    Premium,
    Vip,
    Recliner,
}

impl FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(SeatType::Standard),
            "PREMIUM" => Ok(SeatType::Premium),
            "VIP" => Ok(SeatType::Vip),
            "RECLINER" => Ok(SeatType::Recliner),
            other => Err(format!("unknown seat type '{}'", other)),
        }
    }
}

/// Физическое место в зале. Статус здесь не хранится: он существует
/// только в паре (сеанс, место).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: SeatId,
    pub screen_id: ScreenId,
    pub row_number: String,
    pub seat_number: String,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    pub price: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Booked,
}

/// Место вместе со статусом на конкретный сеанс (ответ `GET /shows/{id}/seats`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub id: SeatId,
    pub row_number: String,
    pub seat_number: String,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    pub price: i64,
    pub status: SeatStatus,
}

impl SeatView {
    pub fn new(seat: &Seat, status: SeatStatus) -> Self {
        Self {
            id: seat.id,
            row_number: seat.row_number.clone(),
            seat_number: seat.seat_number.clone(),
            seat_type: seat.seat_type,
            price: seat.price,
            status,
        }
    }
}
