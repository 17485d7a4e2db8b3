pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod reservation;
pub mod services;
pub mod store;

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use cache::CacheService;
use reservation::{Clock, HoldPolicy, HoldTokenCodec, LockTable, ReservationCoordinator, SystemClock};
use services::sweeper::ExpirySweeper;
use store::{PgSeatStore, SeatStore};

// Shared state для всего приложения
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn SeatStore>,
    pub lock_table: Arc<LockTable>,
    pub coordinator: Arc<ReservationCoordinator>,
}

impl AppState {
    /// Боевой вариант: Postgres с миграциями и, если задан, Redis.
    pub async fn connect(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size)
            .await
            .context("failed to connect to database")?;
        info!("Database connected");

        db.run_migrations().await.context("failed to run migrations")?;

        let store: Arc<dyn SeatStore> = Arc::new(PgSeatStore::new(db.pool.clone()));

        let redis = match config.redis.url.as_deref() {
            Some(url) => match redis_client::RedisClient::new(url).await {
                Ok(redis) => {
                    info!("Redis connected");
                    Some(redis)
                }
                Err(e) => {
                    warn!("Redis unavailable, seat layout cache disabled: {}", e);
                    None
                }
            },
            None => None,
        };
        let cache = CacheService::new(redis, store.clone(), config.redis.layout_ttl_secs);

        Ok(Self::from_parts(config, store, cache, Arc::new(SystemClock)))
    }

    /// Сборка из готовых частей. Тесты подставляют сюда хранилище в памяти и ручные часы.
    pub fn from_parts(
        config: config::Config,
        store: Arc<dyn SeatStore>,
        cache: CacheService,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let lock_table = Arc::new(LockTable::new(store.clone(), cache, clock));
        let codec = HoldTokenCodec::new(config.reservation.token_secret.as_bytes());
        let policy = HoldPolicy::from_config(&config.reservation);
        let coordinator = Arc::new(ReservationCoordinator::new(
            lock_table.clone(),
            store.clone(),
            codec,
            policy,
        ));

        Arc::new(Self { config, store, lock_table, coordinator })
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.lock_table.clone(),
            self.config.reservation.sweep_interval(),
            self.config.reservation.partition_idle(),
        )
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
