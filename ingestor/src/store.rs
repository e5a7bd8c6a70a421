use crate::errors::StoreError;
use crate::model::{Device, DeviceId, Payload, Reading};
use async_trait::async_trait;

/// Durable source of truth for device identities.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<Device>, StoreError>;
}

/// Append-only per-device time series.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Stores one reading, stamping it with the current time.
    async fn append(&self, device_id: DeviceId, payload: Payload) -> Result<Reading, StoreError>;

    /// Up to `limit` most recent readings, newest first.
    async fn recent_window(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError>;
}
