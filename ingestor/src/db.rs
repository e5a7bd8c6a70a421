use crate::errors::{Error, Result, StoreError};
use crate::model::{Device, DeviceId, Payload, Reading};
use crate::store::{DeviceRegistry, TelemetryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::info;

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(Error::Migration)?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed device registry and telemetry table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    device_id: DeviceId,
    payload: Json<Payload>,
    ts: DateTime<Utc>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            id: row.id,
            device_id: row.device_id,
            payload: row.payload.0,
            timestamp: row.ts,
        }
    }
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn find_by_uid(&self, uid: &str) -> std::result::Result<Option<Device>, StoreError> {
        let device = sqlx::query_as::<_, Device>(
            "SELECT id, name, uid, active, created_at FROM devices WHERE uid = $1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn append(
        &self,
        device_id: DeviceId,
        payload: Payload,
    ) -> std::result::Result<Reading, StoreError> {
        let ts = Utc::now();
        let payload = Json(payload);

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO telemetry (device_id, payload, ts) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(device_id)
        .bind(&payload)
        .bind(ts)
        .fetch_one(&self.pool)
        .await?;

        Ok(Reading {
            id,
            device_id,
            payload: payload.0,
            timestamp: ts,
        })
    }

    async fn recent_window(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> std::result::Result<Vec<Reading>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, device_id, payload, ts
            FROM telemetry
            WHERE device_id = $1
            ORDER BY ts DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }
}
