use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Booking, BookingId, HoldId, HolderId, ScreenId, Seat, SeatId, Show, ShowAvailability, ShowId, ShowStatus,
};
use crate::store::SeatStore;

#[derive(Clone)]
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Строки БД: enum'ы хранятся как TEXT и разбираются вручную.

#[derive(FromRow)]
struct ShowRow {
    id: i64,
    movie_id: i64,
    screen_id: i64,
    show_time: DateTime<Utc>,
    base_price_cents: i64,
    available_seats: i32,
    status: String,
}

impl TryFrom<ShowRow> for Show {
    type Error = StoreError;

    fn try_from(row: ShowRow) -> Result<Self, Self::Error> {
        Ok(Show {
            id: row.id,
            movie_id: row.movie_id,
            screen_id: row.screen_id,
            show_time: row.show_time,
            base_price: row.base_price_cents,
            available_seats: row.available_seats,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
        })
    }
}

#[derive(FromRow)]
struct SeatRow {
    id: i64,
    screen_id: i64,
    row_number: String,
    seat_number: String,
    seat_type: String,
    price_cents: i64,
    is_active: bool,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            screen_id: row.screen_id,
            row_number: row.row_number,
            seat_number: row.seat_number,
            seat_type: row.seat_type.parse().map_err(StoreError::Corrupt)?,
            price: row.price_cents,
            active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    show_id: i64,
    holder_id: String,
    hold_id: Uuid,
    seat_ids: Vec<i64>,
    total_cents: i64,
    payment_reference: String,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: BookingId::from_uuid(row.id),
            reference: row.reference,
            show_id: row.show_id,
            holder_id: HolderId::new(row.holder_id),
            hold_id: HoldId::from_uuid(row.hold_id),
            seat_ids: row.seat_ids,
            total_price: row.total_cents,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
        }
    }
}

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.reference, b.show_id, b.holder_id, b.hold_id,
           COALESCE(ARRAY_AGG(bs.seat_id ORDER BY bs.seat_id) FILTER (WHERE bs.seat_id IS NOT NULL), '{}') AS seat_ids,
           b.total_cents, b.payment_reference, b.created_at
    FROM bookings b
    LEFT JOIN booking_seats bs ON bs.booking_id = b.id
"#;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn find_show(&self, show_id: ShowId) -> Result<Option<Show>, StoreError> {
        let row = sqlx::query_as::<_, ShowRow>(
            "SELECT id, movie_id, screen_id, show_time, base_price_cents, available_seats, status
             FROM shows
             WHERE id = $1"
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Show::try_from).transpose()
    }

    async fn screen_seats(&self, screen_id: ScreenId) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT id, screen_id, row_number, seat_number, seat_type, price_cents, is_active
             FROM seats
             WHERE screen_id = $1
             ORDER BY row_number, seat_number, id"
        )
        .bind(screen_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn booked_seats(&self, show_id: ShowId) -> Result<Vec<(SeatId, BookingId)>, StoreError> {
        let rows: Vec<(i64, Uuid)> = sqlx::query_as(
            "SELECT seat_id, booking_id FROM booking_seats WHERE show_id = $1"
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(seat_id, booking_id)| (seat_id, BookingId::from_uuid(booking_id)))
            .collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<ShowAvailability, StoreError> {
        let seat_count = booking.seat_ids.len() as i32;
        let mut tx = self.pool.begin().await?;

        // 1) Уменьшаем счётчик свободных мест. Отменённый сеанс или
        //    недостаточный остаток дают 0 строк, и транзакция откатывается.
        let updated: Option<(i32, String)> = sqlx::query_as(
            r#"
            UPDATE shows
            SET available_seats = available_seats - $2,
                status = CASE WHEN available_seats - $2 <= 0 THEN 'FULL' ELSE status END
            WHERE id = $1 AND status <> 'CANCELLED' AND available_seats >= $2
            RETURNING available_seats, status
            "#
        )
        .bind(booking.show_id)
        .bind(seat_count)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((available_seats, status)) = updated else {
            let _ = tx.rollback().await;
            return Err(StoreError::Conflict(format!(
                "show {} cannot take {} more bookings",
                booking.show_id, seat_count
            )));
        };
        let status: ShowStatus = status.parse().map_err(StoreError::Corrupt)?;

        // 2) Сама бронь
        sqlx::query(
            "INSERT INTO bookings (id, reference, show_id, holder_id, hold_id, total_cents, payment_reference, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        )
        .bind(booking.id.as_uuid())
        .bind(&booking.reference)
        .bind(booking.show_id)
        .bind(booking.holder_id.as_str())
        .bind(booking.hold_id.as_uuid())
        .bind(booking.total_price)
        .bind(&booking.payment_reference)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        // 3) Места брони. PK (show_id, seat_id) не даст продать место дважды
        let seats_result = sqlx::query(
            "INSERT INTO booking_seats (booking_id, show_id, seat_id)
             SELECT $1, $2, UNNEST($3::BIGINT[])"
        )
        .bind(booking.id.as_uuid())
        .bind(booking.show_id)
        .bind(booking.seat_ids.as_slice())
        .execute(&mut *tx)
        .await;

        if let Err(e) = seats_result {
            let _ = tx.rollback().await;
            if is_unique_violation(&e) {
                error!("Seats of booking {} are already sold in show {}", booking.id, booking.show_id);
                return Err(StoreError::Conflict(format!(
                    "seats {:?} already booked for show {}",
                    booking.seat_ids, booking.show_id
                )));
            }
            return Err(e.into());
        }

        tx.commit().await?;
        info!("Booking {} stored: show={}, seats={}", booking.reference, booking.show_id, seat_count);

        Ok(ShowAvailability { available_seats, status })
    }

    async fn find_booking_by_hold(&self, hold_id: HoldId) -> Result<Option<Booking>, StoreError> {
        let query = format!("{} WHERE b.hold_id = $1 GROUP BY b.id", BOOKING_SELECT);
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(hold_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Booking::from))
    }

    async fn bookings_for_holder(&self, holder_id: &HolderId) -> Result<Vec<Booking>, StoreError> {
        let query = format!(
            "{} WHERE b.holder_id = $1 GROUP BY b.id ORDER BY b.created_at DESC",
            BOOKING_SELECT
        );
        let rows = sqlx::query_as::<_, BookingRow>(&query)
            .bind(holder_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Booking::from).collect())
    }
}
