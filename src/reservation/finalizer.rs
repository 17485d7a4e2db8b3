use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ReservationError, StoreError};
use crate::models::{Booking, BookingId, SeatId, SeatStatus, ShowId, ShowStatus};
use crate::reservation::lock_table::{HoldOwner, LockTable, PartitionGuard, ShowPartition};
use crate::reservation::token::HoldClaims;
use crate::store::SeatStore;

/// Превращает удержание в бронирование.
///
/// Вся операция выполняется под мьютексом партиции сеанса: проверка
/// блокировок, запись в хранилище и перевод мест в `Booked`. Пока мьютекс
/// удерживается, ни один читатель не увидит промежуточного состояния, а
/// sweeper не сможет освободить места посреди фиксации.
///
/// Запись и перевод мест выполняются в отдельной задаче: обрыв запроса
/// клиента не разделяет их. Если хранилище вернуло ошибку после фактической
/// фиксации, бронь находится по удержанию и партиция догоняет хранилище.
pub struct BookingFinalizer {
    lock_table: Arc<LockTable>,
    store: Arc<dyn SeatStore>,
}

impl BookingFinalizer {
    pub fn new(lock_table: Arc<LockTable>, store: Arc<dyn SeatStore>) -> Self {
        Self { lock_table, store }
    }

    pub async fn finalize(&self, claims: &HoldClaims, payment_reference: &str) -> Result<Booking, ReservationError> {
        let mut partition = self.lock_table.lock_show(claims.show_id).await?;
        let now = self.lock_table.clock().now();

        let owner = HoldOwner {
            holder_id: claims.holder_id.clone(),
            hold_id: claims.hold_id,
        };

        let verified = if claims.is_expired(now) {
            Err(ReservationError::HoldExpired)
        } else {
            partition
                .verify_held(&claims.seat_ids, &owner, now)
                .map_err(|_| ReservationError::HoldExpired)
        };

        if let Err(e) = verified {
            // Повторное подтверждение уже оформленного удержания возвращает
            // ту же бронь, а не ошибку.
            if let Some(existing) = self.store.find_booking_by_hold(claims.hold_id).await? {
                if existing.holder_id == claims.holder_id {
                    sync_partition(self.store.as_ref(), &mut partition, claims.show_id).await?;
                    info!("Hold {} already confirmed as {}", claims.hold_id, existing.reference);
                    return Ok(existing);
                }
            }
            warn!("Hold {} on show {} can no longer be confirmed", claims.hold_id, claims.show_id);
            return Err(e);
        }

        if partition.show().status == ShowStatus::Cancelled {
            return Err(ReservationError::invalid("сеанс отменён"));
        }

        let id = BookingId::generate();
        let mut seat_ids = claims.seat_ids.clone();
        seat_ids.sort_unstable();

        let booking = Booking {
            id,
            reference: Booking::reference_for(id),
            show_id: claims.show_id,
            holder_id: claims.holder_id.clone(),
            hold_id: claims.hold_id,
            total_price: partition.price_of(&seat_ids),
            seat_ids,
            payment_reference: payment_reference.to_string(),
            created_at: now,
        };

        tokio::spawn(commit(self.store.clone(), partition, booking))
            .await
            .map_err(|e| ReservationError::Internal(format!("booking commit task failed: {}", e)))?
    }
}

async fn commit(
    store: Arc<dyn SeatStore>,
    mut partition: PartitionGuard,
    booking: Booking,
) -> Result<Booking, ReservationError> {
    let failure = match store.insert_booking(&booking).await {
        Ok(availability) => {
            partition.mark_booked(&booking.seat_ids, booking.id, availability);
            info!(
                "Booking {} confirmed: show={}, seats={:?}, total={}",
                booking.reference, booking.show_id, booking.seat_ids, booking.total_price
            );
            return Ok(booking);
        }
        Err(e) => e,
    };

    warn!("Booking write for hold {} failed: {}", booking.hold_id, failure);

    // Ошибка могла прийти уже после фиксации транзакции.
    if let Some(existing) = store.find_booking_by_hold(booking.hold_id).await? {
        if existing.holder_id == booking.holder_id {
            sync_partition(store.as_ref(), &mut partition, booking.show_id).await?;
            info!("Booking {} found after failed write, recovered", existing.reference);
            return Ok(existing);
        }
    }

    if let StoreError::Conflict(_) = failure {
        sync_partition(store.as_ref(), &mut partition, booking.show_id).await?;
        let lost: Vec<SeatId> = booking
            .seat_ids
            .iter()
            .copied()
            .filter(|&seat_id| partition.status(seat_id, booking.created_at) == SeatStatus::Booked)
            .collect();
        if !lost.is_empty() {
            error!("Seats {:?} of show {} were sold outside of the lock table", lost, booking.show_id);
            return Err(ReservationError::SeatUnavailable { seat_ids: lost });
        }
    }

    // Места остаются заблокированными за этим удержанием.
    Err(failure.into())
}

/// Переносит в партицию всё, что хранилище знает о проданных местах сеанса.
async fn sync_partition(store: &dyn SeatStore, partition: &mut ShowPartition, show_id: ShowId) -> Result<(), StoreError> {
    let booked = store.booked_seats(show_id).await?;
    let show = store.find_show(show_id).await?;
    let changed = partition.sync_booked(&booked, show.as_ref());
    if !changed.is_empty() {
        warn!("Show {}: seats {:?} reloaded as booked from storage", show_id, changed);
    }
    Ok(())
}
