use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, HoldId, HolderId, SeatId, ShowId};

/// Подтверждённое бронирование. Неизменяемо после создания.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub reference: String,
    pub show_id: ShowId,
    pub holder_id: HolderId,
    pub hold_id: HoldId,
    pub seat_ids: Vec<SeatId>,
    pub total_price: i64,
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Короткий код брони для клиента, например `BK-3F9A12C0`.
    pub fn reference_for(id: BookingId) -> String {
        let simple = id.as_uuid().simple().to_string();
        format!("BK-{}", simple[..8].to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_short_uppercase_code() {
        let reference = Booking::reference_for(BookingId::generate());
        assert!(reference.starts_with("BK-"));
        assert_eq!(reference.len(), 11);
        assert_eq!(reference, reference.to_uppercase());
    }
}
