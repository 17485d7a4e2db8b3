use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::reservation::LockTable;

/// Фоновая очистка таблицы блокировок.
///
/// Истёкшие блокировки и так считаются свободными при каждом чтении, sweeper
/// лишь физически удаляет их и выгружает простаивающие партиции сеансов.
pub struct ExpirySweeper {
    lock_table: Arc<LockTable>,
    interval: StdDuration,
    idle_after: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub evicted: usize,
}

impl ExpirySweeper {
    pub fn new(lock_table: Arc<LockTable>, interval: StdDuration, idle_after: Duration) -> Self {
        Self { lock_table, interval, idle_after }
    }

    /// Один проход: снять истёкшие блокировки, затем выгрузить простаивающие партиции.
    pub async fn sweep_once(&self) -> SweepReport {
        let reclaimed = self.lock_table.sweep_expired().await;
        for lock in &reclaimed {
            debug!(
                "Lock on seat {} of show {} (hold {}) expired",
                lock.seat_id, lock.show_id, lock.hold_id
            );
        }

        let evicted = self.lock_table.evict_idle(self.idle_after).await;

        SweepReport { reclaimed: reclaimed.len(), evicted }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🧹 Expiry sweeper started, interval {:?}", self.interval);
            loop {
                tokio::time::sleep(self.interval).await;

                let report = self.sweep_once().await;
                if report.reclaimed > 0 || report.evicted > 0 {
                    info!(
                        "🧹 Reclaimed {} expired locks, evicted {} idle partitions",
                        report.reclaimed, report.evicted
                    );
                }
            }
        })
    }
}
