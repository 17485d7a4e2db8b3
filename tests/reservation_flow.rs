mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seat_reservation::error::{ReservationError, StoreError};
use seat_reservation::models::{
    Booking, BookingId, HoldId, HolderId, ScreenId, Seat, SeatId, SeatStatus, Show, ShowAvailability, ShowId,
    ShowStatus,
};
use seat_reservation::store::{MemorySeatStore, SeatStore};

/// Фиксирует бронь, но один раз отвечает ошибкой, как при потерянном
/// ответе на COMMIT.
struct LostCommitAck {
    inner: Arc<MemorySeatStore>,
    armed: AtomicBool,
}

#[async_trait]
impl SeatStore for LostCommitAck {
    async fn find_show(&self, show_id: ShowId) -> Result<Option<Show>, StoreError> {
        self.inner.find_show(show_id).await
    }

    async fn screen_seats(&self, screen_id: ScreenId) -> Result<Vec<Seat>, StoreError> {
        self.inner.screen_seats(screen_id).await
    }

    async fn booked_seats(&self, show_id: ShowId) -> Result<Vec<(SeatId, BookingId)>, StoreError> {
        self.inner.booked_seats(show_id).await
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<ShowAvailability, StoreError> {
        let availability = self.inner.insert_booking(booking).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset after commit".to_string()));
        }
        Ok(availability)
    }

    async fn find_booking_by_hold(&self, hold_id: HoldId) -> Result<Option<Booking>, StoreError> {
        self.inner.find_booking_by_hold(hold_id).await
    }

    async fn bookings_for_holder(&self, holder_id: &HolderId) -> Result<Vec<Booking>, StoreError> {
        self.inner.bookings_for_holder(holder_id).await
    }
}

/// Бронь, записанная в хранилище в обход сервиса.
fn stored_booking(hold_id: HoldId, holder_id: HolderId, seat_ids: Vec<SeatId>) -> Booking {
    let id = BookingId::generate();
    Booking {
        id,
        reference: Booking::reference_for(id),
        show_id: SHOW,
        holder_id,
        hold_id,
        total_price: SEAT_PRICE * seat_ids.len() as i64,
        seat_ids,
        payment_reference: "pay".to_string(),
        created_at: t0(),
    }
}

#[tokio::test]
async fn hold_then_confirm_books_seats() {
    let h = Harness::with_seats(10).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[2, 1], &alice).await.unwrap();
    assert_eq!(grant.seat_ids, vec![1, 2]);
    assert_eq!(grant.expires_at, t0() + Duration::minutes(10));
    assert_eq!(grant.ttl_seconds, 600);
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);
    assert_eq!(h.status_of(3).await, SeatStatus::Available);

    let booking = h.coordinator().confirm_hold(&grant.token, &alice, "pay-001").await.unwrap();
    assert_eq!(booking.seat_ids, vec![1, 2]);
    assert_eq!(booking.total_price, 2 * SEAT_PRICE);
    assert_eq!(booking.hold_id, grant.hold_id);
    assert_eq!(booking.payment_reference, "pay-001");
    assert!(booking.reference.starts_with("BK-"));

    assert_eq!(h.status_of(1).await, SeatStatus::Booked);
    assert_eq!(h.status_of(2).await, SeatStatus::Booked);

    let show = h.coordinator().show(SHOW).await.unwrap();
    assert_eq!(show.available_seats, 8);
    assert_eq!(show.status, ShowStatus::Available);

    let bookings = h.coordinator().bookings_for(&alice).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].id, booking.id);
    assert!(h.coordinator().bookings_for(&holder("bob")).await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_hold_releases_seats_to_other_sessions() {
    let h = Harness::with_seats(5).await;
    let alice = holder("alice");
    let bob = holder("bob");

    let first = h.coordinator().request_hold(SHOW, &[3], &alice).await.unwrap();
    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[3], &bob).await,
        Err(ReservationError::SeatUnavailable { .. })
    ));

    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.status_of(3).await, SeatStatus::Available);

    let second = h.coordinator().request_hold(SHOW, &[3], &bob).await.unwrap();
    assert_eq!(second.seat_ids, vec![3]);

    assert!(matches!(
        h.coordinator().confirm_hold(&first.token, &alice, "late").await,
        Err(ReservationError::HoldExpired)
    ));
    h.coordinator().confirm_hold(&second.token, &bob, "pay").await.unwrap();
    assert_eq!(h.status_of(3).await, SeatStatus::Booked);
}

#[tokio::test]
async fn lock_expires_exactly_at_ttl() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");
    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();

    h.clock.advance(Duration::minutes(10) - Duration::seconds(1));
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);

    h.clock.advance(Duration::seconds(1));
    assert_eq!(h.status_of(1).await, SeatStatus::Available);
    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &alice, "pay").await,
        Err(ReservationError::HoldExpired)
    ));
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let h = Harness::with_seats(5).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1, 2], &alice).await.unwrap();
    assert_eq!(h.coordinator().cancel_hold(&grant.token, &alice).await.unwrap(), 2);
    assert_eq!(h.coordinator().cancel_hold(&grant.token, &alice).await.unwrap(), 0);
    assert_eq!(h.status_of(1).await, SeatStatus::Available);

    // истёкшее удержание снимается без ошибки
    let expired = h.coordinator().request_hold(SHOW, &[3], &alice).await.unwrap();
    h.clock.advance(Duration::minutes(20));
    assert!(h.coordinator().cancel_hold(&expired.token, &alice).await.is_ok());

    // отмена после подтверждения не трогает проданные места
    let confirmed = h.coordinator().request_hold(SHOW, &[4], &alice).await.unwrap();
    h.coordinator().confirm_hold(&confirmed.token, &alice, "pay").await.unwrap();
    assert_eq!(h.coordinator().cancel_hold(&confirmed.token, &alice).await.unwrap(), 0);
    assert_eq!(h.status_of(4).await, SeatStatus::Booked);
}

#[tokio::test]
async fn cancelled_hold_cannot_be_confirmed() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();
    h.coordinator().cancel_hold(&grant.token, &alice).await.unwrap();

    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &alice, "pay").await,
        Err(ReservationError::HoldExpired)
    ));
    assert_eq!(h.store.booking_count().await, 0);
}

#[tokio::test]
async fn storage_failure_keeps_seats_locked_and_writes_nothing() {
    let h = Harness::with_seats(5).await;
    let alice = holder("alice");
    let grant = h.coordinator().request_hold(SHOW, &[1, 2], &alice).await.unwrap();

    h.store.fail_writes(true);
    let err = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap_err();
    assert!(matches!(err, ReservationError::Storage(_)));
    assert_eq!(err.kind(), "Internal");

    assert_eq!(h.store.booking_count().await, 0);
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);
    assert_eq!(h.status_of(2).await, SeatStatus::Locked);
    assert_eq!(h.coordinator().show(SHOW).await.unwrap().available_seats, 5);
    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[2], &holder("bob")).await,
        Err(ReservationError::SeatUnavailable { .. })
    ));

    // повтор клиента после восстановления хранилища
    h.store.fail_writes(false);
    let booking = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();
    assert_eq!(booking.seat_ids, vec![1, 2]);
    assert_eq!(h.store.booking_count().await, 1);
}

#[tokio::test]
async fn commit_reported_as_failed_still_books_seats() {
    let h = Harness::wrapping(3, |inner| {
        Arc::new(LostCommitAck { inner, armed: AtomicBool::new(true) }) as Arc<dyn SeatStore>
    })
    .await;
    let alice = holder("alice");
    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();

    let booking = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();
    assert_eq!(booking.hold_id, grant.hold_id);
    assert_eq!(h.store.booking_count().await, 1);
    assert_eq!(h.status_of(1).await, SeatStatus::Booked);

    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.status_of(1).await, SeatStatus::Booked);
    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[1], &holder("bob")).await,
        Err(ReservationError::SeatUnavailable { seat_ids }) if seat_ids == vec![1]
    ));

    let again = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();
    assert_eq!(again.id, booking.id);
    assert_eq!(h.store.booking_count().await, 1);
    assert_eq!(h.coordinator().show(SHOW).await.unwrap().available_seats, 2);
}

#[tokio::test]
async fn late_retry_of_committed_hold_marks_seats_booked() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");
    let grant = h.coordinator().request_hold(SHOW, &[3], &alice).await.unwrap();

    // запись дошла до хранилища, но ответ клиенту потерян
    let committed = stored_booking(grant.hold_id, alice.clone(), vec![3]);
    h.store.insert_booking(&committed).await.unwrap();

    h.clock.advance(Duration::minutes(11));
    let booking = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();
    assert_eq!(booking.id, committed.id);

    assert_eq!(h.status_of(3).await, SeatStatus::Booked);
    assert_eq!(h.coordinator().show(SHOW).await.unwrap().available_seats, 2);
    assert!(h.coordinator().request_hold(SHOW, &[3], &holder("bob")).await.is_err());
}

#[tokio::test]
async fn seats_sold_behind_the_lock_table_are_reloaded_on_conflict() {
    let h = Harness::with_seats(4).await;
    assert_eq!(h.status_of(2).await, SeatStatus::Available);

    let sold = stored_booking(HoldId::generate(), holder("alice"), vec![2]);
    h.store.insert_booking(&sold).await.unwrap();

    let bob = holder("bob");
    let grant = h.coordinator().request_hold(SHOW, &[1, 2], &bob).await.unwrap();
    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &bob, "pay").await,
        Err(ReservationError::SeatUnavailable { seat_ids }) if seat_ids == vec![2]
    ));

    assert_eq!(h.store.booking_count().await, 1);
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);
    assert_eq!(h.status_of(2).await, SeatStatus::Booked);
    assert_eq!(h.coordinator().show(SHOW).await.unwrap().available_seats, 3);
    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[2], &holder("carol")).await,
        Err(ReservationError::SeatUnavailable { .. })
    ));
}

#[tokio::test]
async fn last_seats_mark_show_full() {
    let h = Harness::with_seats(2).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1, 2], &alice).await.unwrap();
    h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();

    let show = h.coordinator().show(SHOW).await.unwrap();
    assert_eq!(show.available_seats, 0);
    assert_eq!(show.status, ShowStatus::Full);
}

#[tokio::test]
async fn reconfirm_returns_the_same_booking() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();
    let first = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();
    let second = h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.reference, second.reference);
    assert_eq!(h.store.booking_count().await, 1);
}

#[tokio::test]
async fn foreign_or_forged_tokens_are_rejected() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");
    let bob = holder("bob");

    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();

    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &bob, "pay").await,
        Err(ReservationError::NotOwner)
    ));
    assert!(matches!(
        h.coordinator().cancel_hold(&grant.token, &bob).await,
        Err(ReservationError::NotOwner)
    ));
    assert!(matches!(
        h.coordinator().extend_hold(&grant.token, &bob).await,
        Err(ReservationError::NotOwner)
    ));
    assert!(matches!(
        h.coordinator().confirm_hold("forged.token", &alice, "pay").await,
        Err(ReservationError::NotOwner)
    ));

    let mut tampered = grant.token.clone();
    tampered.insert(0, 'x');
    assert!(matches!(
        h.coordinator().cancel_hold(&tampered, &alice).await,
        Err(ReservationError::NotOwner)
    ));

    assert_eq!(h.status_of(1).await, SeatStatus::Locked);
}

#[tokio::test]
async fn conflict_reports_exactly_the_taken_seats() {
    let h = Harness::with_seats(6).await;
    let alice = holder("alice");
    let bob = holder("bob");

    h.coordinator().request_hold(SHOW, &[4, 2], &alice).await.unwrap();

    match h.coordinator().request_hold(SHOW, &[1, 2, 3, 4], &bob).await {
        Err(ReservationError::SeatUnavailable { seat_ids }) => assert_eq!(seat_ids, vec![2, 4]),
        other => panic!("expected SeatUnavailable, got {:?}", other),
    }

    // неудачная попытка ничего не блокирует
    assert_eq!(h.status_of(1).await, SeatStatus::Available);
    assert_eq!(h.status_of(3).await, SeatStatus::Available);
}

#[tokio::test]
async fn booked_seats_conflict_forever() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();
    h.coordinator().confirm_hold(&grant.token, &alice, "pay").await.unwrap();

    h.clock.advance(Duration::days(7));
    match h.coordinator().request_hold(SHOW, &[1, 2], &holder("bob")).await {
        Err(ReservationError::SeatUnavailable { seat_ids }) => assert_eq!(seat_ids, vec![1]),
        other => panic!("expected SeatUnavailable, got {:?}", other),
    }
    // даже покупатель, купивший место, не может удержать его снова
    assert!(h.coordinator().request_hold(SHOW, &[1], &alice).await.is_err());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_locking() {
    let h = Harness::with_seats(12).await;
    let alice = holder("alice");

    let cases: Vec<Vec<i64>> = vec![
        vec![],
        vec![1, 1],
        (1..=11).collect(),
        vec![1, 999],
    ];
    for seats in cases {
        assert!(
            matches!(
                h.coordinator().request_hold(SHOW, &seats, &alice).await,
                Err(ReservationError::InvalidRequest(_))
            ),
            "seats {:?} should be rejected",
            seats
        );
    }

    assert!(matches!(
        h.coordinator().request_hold(777, &[1], &alice).await,
        Err(ReservationError::ShowNotFound(777))
    ));

    let map = h.coordinator().seat_map(SHOW).await.unwrap();
    assert!(map.seats.iter().all(|s| s.status == SeatStatus::Available));
}

#[tokio::test]
async fn max_seats_per_hold_is_allowed() {
    let h = Harness::with_seats(12).await;
    let seats: Vec<i64> = (1..=10).collect();
    let grant = h.coordinator().request_hold(SHOW, &seats, &holder("alice")).await.unwrap();
    assert_eq!(grant.seat_ids.len(), 10);
}

#[tokio::test]
async fn inactive_seats_cannot_be_held() {
    let mut layout: Vec<_> = (1..=3).map(seat).collect();
    layout[1].active = false;
    let h = Harness::with_layout(layout).await;

    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[1, 2], &holder("alice")).await,
        Err(ReservationError::InvalidRequest(_))
    ));
    assert_eq!(h.coordinator().show(SHOW).await.unwrap().available_seats, 2);
}

#[tokio::test]
async fn cancelled_show_rejects_holds() {
    let h = Harness::with_seats(3).await;
    h.store.set_show_status(SHOW, ShowStatus::Cancelled).await;

    assert!(matches!(
        h.coordinator().request_hold(SHOW, &[1], &holder("alice")).await,
        Err(ReservationError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn extend_moves_expiry_and_issues_new_token() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1, 2], &alice).await.unwrap();
    h.clock.advance(Duration::minutes(8));

    let extended = h.coordinator().extend_hold(&grant.token, &alice).await.unwrap();
    assert_eq!(extended.hold_id, grant.hold_id);
    assert_eq!(extended.expires_at, t0() + Duration::minutes(18));
    assert_ne!(extended.token, grant.token);

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);

    // старый токен уже истёк по собственному сроку
    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &alice, "pay").await,
        Err(ReservationError::HoldExpired)
    ));
    let booking = h.coordinator().confirm_hold(&extended.token, &alice, "pay").await.unwrap();
    assert_eq!(booking.seat_ids, vec![1, 2]);
}

#[tokio::test]
async fn expired_hold_cannot_be_extended() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");

    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();
    h.clock.advance(Duration::minutes(10));

    assert!(matches!(
        h.coordinator().extend_hold(&grant.token, &alice).await,
        Err(ReservationError::HoldExpired)
    ));
}

#[tokio::test]
async fn reselect_by_same_holder_moves_seats_to_new_hold() {
    let h = Harness::with_seats(4).await;
    let alice = holder("alice");

    let first = h.coordinator().request_hold(SHOW, &[1, 2], &alice).await.unwrap();
    let second = h.coordinator().request_hold(SHOW, &[2, 3], &alice).await.unwrap();

    // старое удержание потеряло место 2
    assert!(matches!(
        h.coordinator().confirm_hold(&first.token, &alice, "pay").await,
        Err(ReservationError::HoldExpired)
    ));
    assert_eq!(h.coordinator().cancel_hold(&first.token, &alice).await.unwrap(), 1);
    assert_eq!(h.status_of(1).await, SeatStatus::Available);

    let booking = h.coordinator().confirm_hold(&second.token, &alice, "pay").await.unwrap();
    assert_eq!(booking.seat_ids, vec![2, 3]);
}

#[tokio::test]
async fn blank_payment_proof_is_rejected() {
    let h = Harness::with_seats(3).await;
    let alice = holder("alice");
    let grant = h.coordinator().request_hold(SHOW, &[1], &alice).await.unwrap();

    assert!(matches!(
        h.coordinator().confirm_hold(&grant.token, &alice, "   ").await,
        Err(ReservationError::InvalidRequest(_))
    ));
    assert_eq!(h.status_of(1).await, SeatStatus::Locked);
}
