use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{ScreenId, Seat};
use crate::redis_client::RedisClient;
use crate::store::SeatStore;

/// Read-through кеш схем залов.
///
/// Схема зала неизменна между сеансами, поэтому её можно держать в Redis
/// долго. Статусы мест сюда не попадают никогда. Redis необязателен: без
/// него и при любой его ошибке чтение идёт напрямую в хранилище.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
    store: Arc<dyn SeatStore>,
    layout_ttl_secs: u64,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>, store: Arc<dyn SeatStore>, layout_ttl_secs: u64) -> Self {
        Self { redis, store, layout_ttl_secs }
    }

    /// Кеш отключён, все чтения идут в хранилище.
    pub fn disabled(store: Arc<dyn SeatStore>) -> Self {
        Self::new(None, store, 0)
    }

    pub async fn seat_layout(&self, screen_id: ScreenId) -> Result<Vec<Seat>, StoreError> {
        if let Some(redis) = &self.redis {
            match get_layout(redis, screen_id).await {
                Ok(Some(seats)) => {
                    debug!("Seat layout for screen {} served from cache", screen_id);
                    return Ok(seats);
                }
                Ok(None) => {}
                Err(e) => warn!("Redis read for screen {} failed: {}", screen_id, e),
            }
        }

        let seats = self.store.screen_seats(screen_id).await?;

        if let Some(redis) = &self.redis {
            if let Err(e) = save_layout(redis, screen_id, &seats, self.layout_ttl_secs).await {
                warn!("Redis write for screen {} failed: {}", screen_id, e);
            }
        }
        Ok(seats)
    }
}

fn layout_key(screen_id: ScreenId) -> String {
    format!("screen:{}:seats", screen_id)
}

async fn get_layout(redis: &RedisClient, screen_id: ScreenId) -> Result<Option<Vec<Seat>>, redis::RedisError> {
    let mut conn = redis.conn.clone();
    let data: Option<String> = conn.get(layout_key(screen_id)).await?;
    match data {
        Some(data) => serde_json::from_str(&data)
            .map(Some)
            .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))),
        None => Ok(None),
    }
}

async fn save_layout(
    redis: &RedisClient,
    screen_id: ScreenId,
    seats: &[Seat],
    ttl_secs: u64,
) -> Result<(), redis::RedisError> {
    // Пустой зал не кешируем: скорее всего, места ещё не заведены
    if seats.is_empty() || ttl_secs == 0 {
        return Ok(());
    }
    let data = serde_json::to_string(seats)
        .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error")))?;
    let mut conn = redis.conn.clone();
    conn.set_ex(layout_key(screen_id), data, ttl_secs).await
}
