//! Долговременное хранилище сеансов, мест и бронирований.
//!
//! Блокировки сюда не попадают: они эфемерны и живут в `LockTable`.
//! Хранилище отвечает только за то, что должно пережить перезапуск.

pub mod memory;
pub mod postgres;

pub use memory::MemorySeatStore;
pub use postgres::PgSeatStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Booking, BookingId, HoldId, HolderId, ScreenId, Seat, SeatId, Show, ShowAvailability, ShowId};

#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn find_show(&self, show_id: ShowId) -> Result<Option<Show>, StoreError>;

    /// Все места зала, упорядоченные по ряду и номеру.
    async fn screen_seats(&self, screen_id: ScreenId) -> Result<Vec<Seat>, StoreError>;

    /// Проданные места сеанса с бронированием, которому они принадлежат.
    async fn booked_seats(&self, show_id: ShowId) -> Result<Vec<(SeatId, BookingId)>, StoreError>;

    /// Атомарно: запись брони, её места и уменьшение `available_seats`.
    /// Либо всё, либо ничего.
    async fn insert_booking(&self, booking: &Booking) -> Result<ShowAvailability, StoreError>;

    async fn find_booking_by_hold(&self, hold_id: HoldId) -> Result<Option<Booking>, StoreError>;

    async fn bookings_for_holder(&self, holder_id: &HolderId) -> Result<Vec<Booking>, StoreError>;
}
