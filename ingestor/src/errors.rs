use std::time::Duration;
use thiserror::Error;

/// Failure of one of the backing stores (expiring cache, registry, telemetry table).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("device {0} is not registered")]
    UnregisteredDevice(String),

    #[error("Device registry error: {0}")]
    Registry(#[source] StoreError),

    #[error("Telemetry write failed: {0}")]
    StoreWrite(#[source] StoreError),

    #[error("Telemetry read failed: {0}")]
    StoreRead(#[source] StoreError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, Error>;
