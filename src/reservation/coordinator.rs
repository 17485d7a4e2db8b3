//! coordinator.rs
//!
//! Координатор резервирования: единая точка входа для HTTP-слоя.
//!
//! 1.  **request_hold**: проверка запроса и пачечная блокировка мест на TTL.
//! 2.  **extend_hold**: продление живого удержания, выдаётся новый токен.
//! 3.  **cancel_hold**: идемпотентное снятие удержания.
//! 4.  **confirm_hold**: оформление брони через `BookingFinalizer`.
//! 5.  Чтение: схема зала со статусами, сеанс, брони покупателя.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReservationConfig;
use crate::error::ReservationError;
use crate::models::{Booking, HoldId, HolderId, SeatId, SeatView, Show, ShowId, ShowStatus};
use crate::reservation::finalizer::BookingFinalizer;
use crate::reservation::lock_table::{HoldOwner, LockTable, ShowPartition};
use crate::reservation::token::{HoldClaims, HoldTokenCodec};
use crate::store::SeatStore;

/// Политика удержаний. Значения приходят из конфигурации.
#[derive(Debug, Clone, Copy)]
pub struct HoldPolicy {
    pub ttl: Duration,
    pub max_seats: usize,
}

impl HoldPolicy {
    pub fn from_config(config: &ReservationConfig) -> Self {
        Self {
            ttl: config.hold_ttl(),
            max_seats: config.max_seats_per_hold,
        }
    }
}

/// Ответ на успешное удержание: токен и время истечения для таймера в UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldGrant {
    pub token: String,
    pub hold_id: HoldId,
    pub show_id: ShowId,
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    pub show: Show,
    pub seats: Vec<SeatView>,
}

pub struct ReservationCoordinator {
    lock_table: Arc<LockTable>,
    finalizer: BookingFinalizer,
    store: Arc<dyn SeatStore>,
    codec: HoldTokenCodec,
    policy: HoldPolicy,
}

impl ReservationCoordinator {
    pub fn new(
        lock_table: Arc<LockTable>,
        store: Arc<dyn SeatStore>,
        codec: HoldTokenCodec,
        policy: HoldPolicy,
    ) -> Self {
        let finalizer = BookingFinalizer::new(lock_table.clone(), store.clone());
        Self { lock_table, finalizer, store, codec, policy }
    }

    pub async fn request_hold(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        holder_id: &HolderId,
    ) -> Result<HoldGrant, ReservationError> {
        self.check_seat_set(seat_ids)?;

        let mut partition = self.lock_table.lock_show(show_id).await?;
        check_selection(&partition, seat_ids)?;

        let now = self.lock_table.clock().now();
        let owner = HoldOwner { holder_id: holder_id.clone(), hold_id: HoldId::generate() };

        let lock_set = partition
            .acquire(seat_ids, &owner, self.policy.ttl, now)
            .map_err(|e| {
                debug!("Hold on show {} by {} rejected: {}", show_id, holder_id, e);
                ReservationError::from(e)
            })?;
        drop(partition);

        let claims = HoldClaims {
            hold_id: lock_set.hold_id,
            show_id,
            seat_ids: lock_set.seat_ids,
            holder_id: holder_id.clone(),
            expires_at: lock_set.expires_at,
        };
        let grant = self.grant(claims, now)?;

        info!(
            "Hold {} granted: show={}, holder={}, seats={:?}, expires_at={}",
            grant.hold_id, show_id, holder_id, grant.seat_ids, grant.expires_at
        );
        Ok(grant)
    }

    /// Продлевает удержание ещё на один TTL от текущего момента.
    pub async fn extend_hold(&self, token: &str, holder_id: &HolderId) -> Result<HoldGrant, ReservationError> {
        let claims = self.claims_for(token, holder_id)?;
        let now = self.lock_table.clock().now();
        if claims.is_expired(now) {
            return Err(ReservationError::HoldExpired);
        }

        let Some(mut partition) = self.lock_table.lock_existing(claims.show_id).await else {
            return Err(ReservationError::NotOwner);
        };
        let now = self.lock_table.clock().now();
        let owner = HoldOwner { holder_id: claims.holder_id.clone(), hold_id: claims.hold_id };
        let expires_at = partition.extend(&claims.seat_ids, &owner, self.policy.ttl, now)?;
        drop(partition);

        info!("Hold {} extended until {}", claims.hold_id, expires_at);
        self.grant(HoldClaims { expires_at, ..claims }, now)
    }

    /// Идемпотентно: повтор, истёкшее или уже оформленное удержание не
    /// дают ошибки. Возвращает число освобождённых мест.
    pub async fn cancel_hold(&self, token: &str, holder_id: &HolderId) -> Result<usize, ReservationError> {
        let claims = self.claims_for(token, holder_id)?;

        // Нет партиции, значит нет и блокировок
        let Some(mut partition) = self.lock_table.lock_existing(claims.show_id).await else {
            return Ok(0);
        };
        let owner = HoldOwner { holder_id: claims.holder_id.clone(), hold_id: claims.hold_id };
        let released = partition.release(&claims.seat_ids, &owner);

        if released.is_empty() {
            debug!("Cancel of hold {} was a no-op", claims.hold_id);
        } else {
            info!("Hold {} cancelled, {} seats released", claims.hold_id, released.len());
        }
        Ok(released.len())
    }

    pub async fn confirm_hold(
        &self,
        token: &str,
        holder_id: &HolderId,
        payment_proof: &str,
    ) -> Result<Booking, ReservationError> {
        let claims = self.claims_for(token, holder_id)?;
        let payment_proof = payment_proof.trim();
        if payment_proof.is_empty() {
            return Err(ReservationError::invalid("paymentProof не может быть пустым"));
        }

        self.finalizer.finalize(&claims, payment_proof).await
    }

    pub async fn seat_map(&self, show_id: ShowId) -> Result<SeatMap, ReservationError> {
        let partition = self.lock_table.lock_show(show_id).await?;
        let now = self.lock_table.clock().now();
        Ok(SeatMap {
            show: partition.show().clone(),
            seats: partition.snapshot(now),
        })
    }

    pub async fn show(&self, show_id: ShowId) -> Result<Show, ReservationError> {
        let partition = self.lock_table.lock_show(show_id).await?;
        Ok(partition.show().clone())
    }

    pub async fn bookings_for(&self, holder_id: &HolderId) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.store.bookings_for_holder(holder_id).await?)
    }

    fn grant(&self, claims: HoldClaims, now: DateTime<Utc>) -> Result<HoldGrant, ReservationError> {
        let token = self.codec.issue(&claims).map_err(|e| {
            warn!("Failed to sign hold token: {}", e);
            ReservationError::Internal("не удалось выпустить токен удержания".to_string())
        })?;

        Ok(HoldGrant {
            token,
            hold_id: claims.hold_id,
            show_id: claims.show_id,
            seat_ids: claims.seat_ids,
            expires_at: claims.expires_at,
            ttl_seconds: (claims.expires_at - now).num_seconds(),
        })
    }

    /// Подделанный токен или токен чужой сессии - `NotOwner`.
    fn claims_for(&self, token: &str, holder_id: &HolderId) -> Result<HoldClaims, ReservationError> {
        let claims = self.codec.verify(token).map_err(|e| {
            warn!("Rejected hold token from {}: {}", holder_id, e);
            ReservationError::NotOwner
        })?;

        if &claims.holder_id != holder_id {
            warn!("Holder {} presented hold {} of another session", holder_id, claims.hold_id);
            return Err(ReservationError::NotOwner);
        }
        Ok(claims)
    }

    fn check_seat_set(&self, seat_ids: &[SeatId]) -> Result<(), ReservationError> {
        if seat_ids.is_empty() {
            return Err(ReservationError::invalid("список мест пуст"));
        }
        if seat_ids.len() > self.policy.max_seats {
            return Err(ReservationError::invalid(format!(
                "нельзя удержать больше {} мест за раз",
                self.policy.max_seats
            )));
        }

        let mut seen = HashSet::with_capacity(seat_ids.len());
        let mut duplicates: Vec<SeatId> = seat_ids.iter().copied().filter(|id| !seen.insert(*id)).collect();
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            return Err(ReservationError::invalid(format!("повторяющиеся места: {:?}", duplicates)));
        }
        Ok(())
    }
}

/// Места должны принадлежать залу сеанса и быть активными; сам сеанс не
/// должен быть отменён.
fn check_selection(partition: &ShowPartition, seat_ids: &[SeatId]) -> Result<(), ReservationError> {
    let show = partition.show();
    if show.status == ShowStatus::Cancelled {
        return Err(ReservationError::invalid(format!("сеанс {} отменён", show.id)));
    }

    let mut foreign: Vec<SeatId> = seat_ids
        .iter()
        .copied()
        .filter(|&id| partition.seat(id).is_none())
        .collect();
    if !foreign.is_empty() {
        foreign.sort_unstable();
        return Err(ReservationError::invalid(format!(
            "места {:?} не относятся к сеансу {}",
            foreign, show.id
        )));
    }

    let mut inactive: Vec<SeatId> = seat_ids
        .iter()
        .copied()
        .filter(|&id| partition.seat(id).is_some_and(|seat| !seat.active))
        .collect();
    if !inactive.is_empty() {
        inactive.sort_unstable();
        return Err(ReservationError::invalid(format!("места {:?} недоступны для продажи", inactive)));
    }
    Ok(())
}
