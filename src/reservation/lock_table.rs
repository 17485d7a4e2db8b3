//! lock_table.rs
//!
//! Таблица блокировок мест: для каждой пары (сеанс, место) не более одной
//! активной блокировки или одной брони.
//!
//! Состояние разбито на партиции по сеансам. Каждая партиция живёт за своим
//! `tokio::sync::Mutex`, поэтому разные сеансы не блокируют друг друга, а все
//! изменения внутри одного сеанса строго упорядочены. Карта партиций защищена
//! `RwLock` и удерживается только на время поиска/вставки.
//!
//! Партиция поднимается из хранилища при первом обращении: сеанс, схема зала
//! (через кеш) и уже проданные места. Блокировки в хранилище не пишутся.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::cache::CacheService;
use crate::error::ReservationError;
use crate::models::{
    BookingId, HoldId, HolderId, Seat, SeatId, SeatStatus, SeatView, Show, ShowAvailability, ShowId,
};
use crate::reservation::clock::Clock;
use crate::store::SeatStore;

/// Владелец блокировки: сессия покупателя и конкретное удержание.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldOwner {
    pub holder_id: HolderId,
    pub hold_id: HoldId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub show_id: ShowId,
    pub seat_id: SeatId,
    pub holder_id: HolderId,
    pub hold_id: HoldId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_owned_by(&self, owner: &HoldOwner) -> bool {
        self.holder_id == owner.holder_id && self.hold_id == owner.hold_id
    }
}

/// Состояние пары (сеанс, место). Отсутствие записи означает «свободно».
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatState {
    Locked(Lock),
    Booked(BookingId),
}

/// Результат успешного `acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSet {
    pub show_id: ShowId,
    pub hold_id: HoldId,
    pub seat_ids: Vec<SeatId>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("seats unavailable: {0:?}")]
    SeatUnavailable(Vec<SeatId>),

    #[error("seats not held by caller: {0:?}")]
    NotOwner(Vec<SeatId>),
}

impl From<LockError> for ReservationError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::SeatUnavailable(seat_ids) => ReservationError::SeatUnavailable { seat_ids },
            LockError::NotOwner(_) => ReservationError::NotOwner,
        }
    }
}

/// Всё состояние одного сеанса.
#[derive(Debug)]
pub struct ShowPartition {
    show: Show,
    layout: Vec<Seat>,
    index: HashMap<SeatId, usize>,
    states: HashMap<SeatId, SeatState>,
    touched_at: DateTime<Utc>,
}

impl ShowPartition {
    pub fn new(show: Show, layout: Vec<Seat>, booked: Vec<(SeatId, BookingId)>, now: DateTime<Utc>) -> Self {
        let index = layout.iter().enumerate().map(|(i, seat)| (seat.id, i)).collect();
        let states = booked
            .into_iter()
            .map(|(seat_id, booking_id)| (seat_id, SeatState::Booked(booking_id)))
            .collect();

        Self { show, layout, index, states, touched_at: now }
    }

    pub fn show(&self) -> &Show {
        &self.show
    }

    pub fn seat(&self, seat_id: SeatId) -> Option<&Seat> {
        self.index.get(&seat_id).map(|&i| &self.layout[i])
    }

    pub fn lock_of(&self, seat_id: SeatId) -> Option<&Lock> {
        match self.states.get(&seat_id) {
            Some(SeatState::Locked(lock)) => Some(lock),
            _ => None,
        }
    }

    pub fn status(&self, seat_id: SeatId, now: DateTime<Utc>) -> SeatStatus {
        match self.states.get(&seat_id) {
            Some(SeatState::Booked(_)) => SeatStatus::Booked,
            Some(SeatState::Locked(lock)) if lock.is_live(now) => SeatStatus::Locked,
            _ => SeatStatus::Available,
        }
    }

    /// Блокирует все места пачкой либо ни одного.
    ///
    /// Место конфликтует, если оно продано или удерживается живой блокировкой
    /// другого покупателя. Собственная живая блокировка покупателя переходит
    /// к новому удержанию. Места должны принадлежать залу сеанса (проверяет
    /// координатор).
    pub fn acquire(
        &mut self,
        seat_ids: &[SeatId],
        owner: &HoldOwner,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockSet, LockError> {
        let mut conflicts: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|seat_id| match self.states.get(seat_id) {
                Some(SeatState::Booked(_)) => true,
                Some(SeatState::Locked(lock)) => lock.is_live(now) && lock.holder_id != owner.holder_id,
                None => false,
            })
            .collect();

        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            conflicts.dedup();
            return Err(LockError::SeatUnavailable(conflicts));
        }

        let expires_at = now + ttl;
        for &seat_id in seat_ids {
            self.states.insert(
                seat_id,
                SeatState::Locked(Lock {
                    show_id: self.show.id,
                    seat_id,
                    holder_id: owner.holder_id.clone(),
                    hold_id: owner.hold_id,
                    acquired_at: now,
                    expires_at,
                }),
            );
        }

        let mut locked = seat_ids.to_vec();
        locked.sort_unstable();
        Ok(LockSet {
            show_id: self.show.id,
            hold_id: owner.hold_id,
            seat_ids: locked,
            acquired_at: now,
            expires_at,
        })
    }

    /// Снимает блокировки владельца. Чужие, проданные и уже свободные места
    /// пропускаются без ошибки.
    pub fn release(&mut self, seat_ids: &[SeatId], owner: &HoldOwner) -> Vec<SeatId> {
        seat_ids
            .iter()
            .filter_map(|&seat_id| self.remove_lock_where(seat_id, |lock| lock.is_owned_by(owner)))
            .map(|lock| lock.seat_id)
            .collect()
    }

    /// Продлевает живые блокировки владельца до `now + ttl`.
    pub fn extend(
        &mut self,
        seat_ids: &[SeatId],
        owner: &HoldOwner,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, LockError> {
        self.verify_held(seat_ids, owner, now)?;

        let expires_at = now + ttl;
        for seat_id in seat_ids {
            if let Some(SeatState::Locked(lock)) = self.states.get_mut(seat_id) {
                lock.expires_at = expires_at;
            }
        }
        Ok(expires_at)
    }

    /// Проверка перед финализацией: все места удерживаются этим владельцем
    /// и блокировки ещё не истекли.
    pub fn verify_held(&self, seat_ids: &[SeatId], owner: &HoldOwner, now: DateTime<Utc>) -> Result<(), LockError> {
        let lost: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|&seat_id| !matches!(
                self.states.get(&seat_id),
                Some(SeatState::Locked(lock)) if lock.is_owned_by(owner) && lock.is_live(now)
            ))
            .collect();

        if lost.is_empty() {
            Ok(())
        } else {
            Err(LockError::NotOwner(lost))
        }
    }

    /// Переводит места из `Locked` в `Booked`. Вызывается только после
    /// фиксации брони в хранилище и под тем же мьютексом, что и `verify_held`.
    pub fn mark_booked(&mut self, seat_ids: &[SeatId], booking_id: BookingId, availability: ShowAvailability) {
        for &seat_id in seat_ids {
            self.states.insert(seat_id, SeatState::Booked(booking_id));
        }
        self.show.apply(availability);
    }

    /// Подтягивает проданные места из хранилища поверх памяти: такие места
    /// становятся `Booked`, даже если в партиции на них висит блокировка.
    /// Возвращает места, состояние которых изменилось.
    pub fn sync_booked(&mut self, booked: &[(SeatId, BookingId)], show: Option<&Show>) -> Vec<SeatId> {
        let mut changed = Vec::new();
        for &(seat_id, booking_id) in booked {
            if !self.index.contains_key(&seat_id) {
                continue;
            }
            if !matches!(self.states.get(&seat_id), Some(SeatState::Booked(id)) if *id == booking_id) {
                self.states.insert(seat_id, SeatState::Booked(booking_id));
                changed.push(seat_id);
            }
        }
        if let Some(show) = show {
            self.show.apply(ShowAvailability::of(show));
        }
        changed
    }

    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<Lock> {
        let expired: Vec<SeatId> = self
            .states
            .iter()
            .filter_map(|(seat_id, state)| match state {
                SeatState::Locked(lock) if !lock.is_live(now) => Some(*seat_id),
                _ => None,
            })
            .collect();

        expired
            .into_iter()
            .filter_map(|seat_id| self.remove_lock_where(seat_id, |lock| !lock.is_live(now)))
            .collect()
    }

    pub fn live_locks(&self, now: DateTime<Utc>) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, SeatState::Locked(lock) if lock.is_live(now)))
            .count()
    }

    pub fn price_of(&self, seat_ids: &[SeatId]) -> i64 {
        seat_ids.iter().filter_map(|&id| self.seat(id)).map(|seat| seat.price).sum()
    }

    /// Согласованный снимок зала: истёкшие блокировки видны как свободные.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<SeatView> {
        self.layout
            .iter()
            .map(|seat| SeatView::new(seat, self.status(seat.id, now)))
            .collect()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.touched_at = self.touched_at.max(now);
    }

    // Единственный путь удаления блокировки: release и sweeper идут через него.
    fn remove_lock_where(&mut self, seat_id: SeatId, pred: impl Fn(&Lock) -> bool) -> Option<Lock> {
        match self.states.get(&seat_id) {
            Some(SeatState::Locked(lock)) if pred(lock) => {}
            _ => return None,
        }
        match self.states.remove(&seat_id) {
            Some(SeatState::Locked(lock)) => Some(lock),
            _ => None,
        }
    }
}

pub type PartitionGuard = OwnedMappedMutexGuard<Option<ShowPartition>, ShowPartition>;

type Slot = Arc<Mutex<Option<ShowPartition>>>;

pub struct LockTable {
    partitions: RwLock<HashMap<ShowId, Slot>>,
    store: Arc<dyn SeatStore>,
    cache: CacheService,
    clock: Arc<dyn Clock>,
}

impl LockTable {
    pub fn new(store: Arc<dyn SeatStore>, cache: CacheService, clock: Arc<dyn Clock>) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            store,
            cache,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Эксклюзивный доступ к партиции сеанса, при необходимости поднимая её
    /// из хранилища.
    pub async fn lock_show(&self, show_id: ShowId) -> Result<PartitionGuard, ReservationError> {
        let slot = self.slot(show_id).await;
        let mut guard = slot.lock_owned().await;

        if guard.is_none() {
            *guard = Some(self.hydrate(show_id).await?);
        }

        let now = self.clock.now();
        OwnedMutexGuard::try_map(guard, |slot| slot.as_mut())
            .map(|mut partition| {
                partition.touch(now);
                partition
            })
            .map_err(|_| ReservationError::ShowNotFound(show_id))
    }

    /// Партиция без подъёма из хранилища. `None` означает, что у сеанса
    /// заведомо нет ни одной блокировки.
    pub async fn lock_existing(&self, show_id: ShowId) -> Option<PartitionGuard> {
        let slot = self.partitions.read().await.get(&show_id).cloned()?;
        let guard = slot.lock_owned().await;
        OwnedMutexGuard::try_map(guard, |slot| slot.as_mut()).ok()
    }

    /// Удаляет истёкшие блокировки во всех партициях.
    pub async fn sweep_expired(&self) -> Vec<Lock> {
        let slots: Vec<Slot> = self.partitions.read().await.values().cloned().collect();

        let mut reclaimed = Vec::new();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(partition) = guard.as_mut() {
                reclaimed.extend(partition.sweep_expired(self.clock.now()));
            }
        }
        reclaimed
    }

    /// Выгружает партиции без живых блокировок, к которым давно не обращались
    /// и на которые сейчас никто не держит ссылку.
    pub async fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now();
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();

        partitions.retain(|show_id, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(guard) = slot.try_lock() else {
                return true;
            };
            let idle = match guard.as_ref() {
                None => true,
                Some(partition) => partition.live_locks(now) == 0 && partition.touched_at + idle_for <= now,
            };
            if idle {
                debug!("Evicting idle partition for show {}", show_id);
            }
            !idle
        });

        before - partitions.len()
    }

    pub async fn partition_count(&self) -> usize {
        self.partitions.read().await.len()
    }

    async fn slot(&self, show_id: ShowId) -> Slot {
        if let Some(slot) = self.partitions.read().await.get(&show_id) {
            return slot.clone();
        }
        self.partitions
            .write()
            .await
            .entry(show_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn hydrate(&self, show_id: ShowId) -> Result<ShowPartition, ReservationError> {
        let show = self
            .store
            .find_show(show_id)
            .await?
            .ok_or(ReservationError::ShowNotFound(show_id))?;
        let layout = self.cache.seat_layout(show.screen_id).await?;
        let booked = self.store.booked_seats(show_id).await?;

        info!(
            "Hydrated partition for show {}: {} seats, {} booked",
            show_id,
            layout.len(),
            booked.len()
        );
        Ok(ShowPartition::new(show, layout, booked, self.clock.now()))
    }
}
