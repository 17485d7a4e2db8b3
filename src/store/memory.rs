use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{
    Booking, BookingId, HoldId, HolderId, ScreenId, Seat, SeatId, Show, ShowAvailability, ShowId, ShowStatus,
};
use crate::store::SeatStore;

#[derive(Default)]
struct MemoryState {
    shows: HashMap<ShowId, Show>,
    screens: HashMap<ScreenId, Vec<Seat>>,
    bookings: Vec<Booking>,
    booked: HashMap<(ShowId, SeatId), BookingId>,
}

/// Хранилище в памяти для тестов и локального запуска без Postgres.
/// Повторяет гарантии `PgSeatStore`: `insert_booking` атомарен.
#[derive(Default)]
pub struct MemorySeatStore {
    state: RwLock<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_screen(&self, screen_id: ScreenId, mut seats: Vec<Seat>) {
        seats.sort_by(|a, b| {
            (&a.row_number, &a.seat_number, a.id).cmp(&(&b.row_number, &b.seat_number, b.id))
        });
        self.state.write().await.screens.insert(screen_id, seats);
    }

    pub async fn insert_show(&self, show: Show) {
        self.state.write().await.shows.insert(show.id, show);
    }

    pub async fn set_show_status(&self, show_id: ShowId, status: ShowStatus) {
        if let Some(show) = self.state.write().await.shows.get_mut(&show_id) {
            show.status = status;
        }
    }

    /// Все последующие записи падают с `StoreError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn booking_count(&self) -> usize {
        self.state.read().await.bookings.len()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn find_show(&self, show_id: ShowId) -> Result<Option<Show>, StoreError> {
        Ok(self.state.read().await.shows.get(&show_id).cloned())
    }

    async fn screen_seats(&self, screen_id: ScreenId) -> Result<Vec<Seat>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .screens
            .get(&screen_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn booked_seats(&self, show_id: ShowId) -> Result<Vec<(SeatId, BookingId)>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .booked
            .iter()
            .filter(|((sid, _), _)| *sid == show_id)
            .map(|((_, seat_id), booking_id)| (*seat_id, *booking_id))
            .collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<ShowAvailability, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }

        let mut state = self.state.write().await;

        let show = state
            .shows
            .get(&booking.show_id)
            .ok_or_else(|| StoreError::Conflict(format!("show {} does not exist", booking.show_id)))?;
        let seat_count = booking.seat_ids.len() as i32;
        if show.status == ShowStatus::Cancelled || show.available_seats < seat_count {
            return Err(StoreError::Conflict(format!(
                "show {} cannot take {} more bookings",
                booking.show_id, seat_count
            )));
        }

        if state.bookings.iter().any(|b| b.hold_id == booking.hold_id) {
            return Err(StoreError::Conflict(format!("hold {} already booked", booking.hold_id)));
        }

        if let Some(seat_id) = booking
            .seat_ids
            .iter()
            .find(|seat_id| state.booked.contains_key(&(booking.show_id, **seat_id)))
        {
            return Err(StoreError::Conflict(format!(
                "seat {} already booked for show {}",
                seat_id, booking.show_id
            )));
        }

        let availability = ShowAvailability::after_booking(show, booking.seat_ids.len());
        if let Some(show) = state.shows.get_mut(&booking.show_id) {
            show.apply(availability);
        }
        for seat_id in &booking.seat_ids {
            state.booked.insert((booking.show_id, *seat_id), booking.id);
        }
        state.bookings.push(booking.clone());

        Ok(availability)
    }

    async fn find_booking_by_hold(&self, hold_id: HoldId) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .bookings
            .iter()
            .find(|b| b.hold_id == hold_id)
            .cloned())
    }

    async fn bookings_for_holder(&self, holder_id: &HolderId) -> Result<Vec<Booking>, StoreError> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| &b.holder_id == holder_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}
