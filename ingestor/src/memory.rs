//! In-process implementations of the store seams.
//!
//! Used by the test suites and for running the router without Postgres or
//! Redis. Expiry follows `tokio::time`, so paused-clock tests can advance TTLs.

use crate::cache::ExpiringStore;
use crate::errors::StoreError;
use crate::model::{Device, DeviceId, Payload, Reading};
use crate::store::{DeviceRegistry, TelemetryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

fn check_available(down: &AtomicBool, what: &str) -> Result<(), StoreError> {
    if down.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("{} is down", what)));
    }
    Ok(())
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    // Alive up to and including the deadline, like Redis.
    fn is_alive(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Expiring key-value store with lazy eviction.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    down: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of successful `set_ex` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Drops every entry, as a cache flush would.
    pub async fn flush(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_available(&self.down, "cache")?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if entry.is_alive(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        check_available(&self.down, "cache")?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Device registry with a lookup counter.
#[derive(Default)]
pub struct MemoryRegistry {
    devices: Mutex<HashMap<String, Device>>,
    next_id: AtomicI64,
    lookups: AtomicUsize,
    down: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `uid` and returns its new id. Re-registering returns the existing id.
    pub async fn register(&self, uid: &str) -> DeviceId {
        let mut devices = self.devices.lock().await;
        if let Some(device) = devices.get(uid) {
            return device.id;
        }
        let id = DeviceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        devices.insert(
            uid.to_string(),
            Device {
                id,
                name: uid.to_string(),
                uid: uid.to_string(),
                active: true,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Number of `find_by_uid` calls that reached the registry.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<Device>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        check_available(&self.down, "registry")?;
        Ok(self.devices.lock().await.get(uid).cloned())
    }
}

/// Append-only telemetry table.
#[derive(Default)]
pub struct MemoryTelemetry {
    readings: Mutex<Vec<Reading>>,
    next_id: AtomicI64,
    appends: AtomicUsize,
    down: AtomicBool,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a reading with an explicit timestamp, bypassing `append`'s clock.
    pub async fn insert_at(&self, device_id: DeviceId, payload: Payload, ts: DateTime<Utc>) {
        let reading = Reading {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            device_id,
            payload,
            timestamp: ts,
        };
        self.readings.lock().await.push(reading);
    }

    /// Number of successful `append` calls.
    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub async fn count_for(&self, device_id: DeviceId) -> usize {
        self.readings
            .lock()
            .await
            .iter()
            .filter(|r| r.device_id == device_id)
            .count()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetry {
    async fn append(&self, device_id: DeviceId, payload: Payload) -> Result<Reading, StoreError> {
        check_available(&self.down, "telemetry store")?;
        let reading = Reading {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            device_id,
            payload,
            timestamp: Utc::now(),
        };
        self.readings.lock().await.push(reading.clone());
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(reading)
    }

    async fn recent_window(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        check_available(&self.down, "telemetry store")?;
        let mut window: Vec<Reading> = self
            .readings
            .lock()
            .await
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect();
        // Newest first; ties broken by insertion id like `ORDER BY ts DESC, id DESC`.
        window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        window.truncate(limit);
        Ok(window)
    }
}
