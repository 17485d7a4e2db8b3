use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::env;
use std::time::Duration as StdDuration;

const MIN_TOKEN_SECRET_LEN: usize = 16;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `pretty` или `json`
    pub log_format: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis. Без url кеш схем залов отключён.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub layout_ttl_secs: u64,
}

// Настройки удержаний мест
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub hold_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub max_seats_per_hold: usize,
    pub token_secret: String,
    pub partition_idle_secs: i64,
}

impl ReservationConfig {
    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_ttl_secs)
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }

    pub fn partition_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.partition_idle_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_ttl_secs <= 0 {
            return Err(ConfigError::Message("reservation.hold_ttl_secs must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Message("reservation.sweep_interval_secs must be positive".into()));
        }
        if self.max_seats_per_hold == 0 {
            return Err(ConfigError::Message("reservation.max_seats_per_hold must be at least 1".into()));
        }
        if self.partition_idle_secs < 0 {
            return Err(ConfigError::Message("reservation.partition_idle_secs must not be negative".into()));
        }
        if self.token_secret.len() < MIN_TOKEN_SECRET_LEN {
            return Err(ConfigError::Message(format!(
                "reservation.token_secret must be at least {} bytes",
                MIN_TOKEN_SECRET_LEN
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Читает конфигурацию из окружения.
    ///
    /// Переменные вида `BOOKING_RESERVATION__HOLD_TTL_SECS`. Для совместимости
    /// с docker-compose также учитываются `PORT`, `DATABASE_URL`, `REDIS_URL`
    /// и `RUST_LOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(
                Environment::with_prefix("BOOKING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("app.port", env::var("PORT").ok())?
            .set_override_option("app.rust_log", env::var("RUST_LOG").ok())?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", env::var("REDIS_URL").ok())?;

        Self::from_builder(builder)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ::config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "seat_reservation=debug,tower_http=debug")?
            .set_default("app.log_format", "pretty")?
            .set_default("database.pool_size", 20)?
            .set_default("redis.layout_ttl_secs", 3600)?
            .set_default("reservation.hold_ttl_secs", 600)?
            .set_default("reservation.sweep_interval_secs", 5)?
            .set_default("reservation.max_seats_per_hold", 10)?
            .set_default("reservation.partition_idle_secs", 300)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.reservation.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}
