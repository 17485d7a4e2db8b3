#![allow(dead_code)]

use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use seat_reservation::cache::CacheService;
use seat_reservation::config::Config;
use seat_reservation::models::{HolderId, ScreenId, Seat, SeatStatus, SeatType, Show, ShowId, ShowStatus};
use seat_reservation::reservation::{ManualClock, ReservationCoordinator};
use seat_reservation::store::{MemorySeatStore, SeatStore};
use seat_reservation::{app, AppState};

pub const SHOW: ShowId = 1;
pub const SCREEN: ScreenId = 10;
pub const SEAT_PRICE: i64 = 1000;
pub const TOKEN_SECRET: &str = "integration-test-secret-0123456789";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()
}

pub fn holder(name: &str) -> HolderId {
    HolderId::new(name)
}

pub fn test_config() -> Config {
    Config::from_builder(
        Config::defaults()
            .unwrap()
            .set_override("database.url", "postgres://unused")
            .unwrap()
            .set_override("reservation.token_secret", TOKEN_SECRET)
            .unwrap(),
    )
    .unwrap()
}

pub fn seat(id: i64) -> Seat {
    Seat {
        id,
        screen_id: SCREEN,
        row_number: "A".to_string(),
        seat_number: format!("{:02}", id),
        seat_type: SeatType::Standard,
        price: SEAT_PRICE,
        active: true,
    }
}

/// Сервис поверх хранилища в памяти с ручными часами.
pub struct Harness {
    pub store: Arc<MemorySeatStore>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
}

impl Harness {
    /// Один сеанс `SHOW` в зале `SCREEN` с местами `1..=seats`.
    pub async fn with_seats(seats: i64) -> Self {
        Self::with_layout((1..=seats).map(seat).collect()).await
    }

    pub async fn with_layout(layout: Vec<Seat>) -> Self {
        Self::build(layout, |store| store as Arc<dyn SeatStore>).await
    }

    /// Сервис поверх обёртки хранилища; `store` остаётся доступен для
    /// наполнения и проверок в обход обёртки.
    pub async fn wrapping<F>(seats: i64, wrap: F) -> Self
    where
        F: FnOnce(Arc<MemorySeatStore>) -> Arc<dyn SeatStore>,
    {
        Self::build((1..=seats).map(seat).collect(), wrap).await
    }

    async fn build<F>(layout: Vec<Seat>, wrap: F) -> Self
    where
        F: FnOnce(Arc<MemorySeatStore>) -> Arc<dyn SeatStore>,
    {
        let store = Arc::new(MemorySeatStore::new());
        let active = layout.iter().filter(|s| s.active).count() as i32;
        store.insert_screen(SCREEN, layout).await;
        store
            .insert_show(Show {
                id: SHOW,
                movie_id: 100,
                screen_id: SCREEN,
                show_time: t0() + Duration::hours(3),
                base_price: SEAT_PRICE,
                available_seats: active,
                status: ShowStatus::Available,
            })
            .await;

        let clock = Arc::new(ManualClock::new(t0()));
        let service = wrap(store.clone());
        let cache = CacheService::disabled(service.clone());
        let state = AppState::from_parts(test_config(), service, cache, clock.clone());

        Self { store, clock, state }
    }

    pub fn coordinator(&self) -> &ReservationCoordinator {
        &self.state.coordinator
    }

    pub fn app(&self) -> Router {
        app(self.state.clone())
    }

    pub async fn status_of(&self, seat_id: i64) -> SeatStatus {
        let map = self.coordinator().seat_map(SHOW).await.unwrap();
        map.seats
            .iter()
            .find(|s| s.id == seat_id)
            .map(|s| s.status)
            .expect("seat present in layout")
    }
}
