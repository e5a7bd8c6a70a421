//! Device telemetry ingestion with cache-first identity resolution,
//! TTL-based liveness and windowed chart reads.

pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod ingest;
pub mod liveness;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod rest;
pub mod store;
pub mod validate;
pub mod window;

use cache::ExpiringStore;
use config::Config;
use identity::IdentityCache;
use ingest::Ingestion;
use liveness::LivenessTracker;
use rest::AppState;
use std::sync::Arc;
use store::{DeviceRegistry, TelemetryStore};
use window::WindowQuery;

/// Wires the core components over the given backends.
pub fn build_state(
    config: &Config,
    kv: Arc<dyn ExpiringStore>,
    registry: Arc<dyn DeviceRegistry>,
    telemetry: Arc<dyn TelemetryStore>,
) -> AppState {
    let identity = IdentityCache::new(kv.clone(), registry, config.identity_ttl);
    let liveness = LivenessTracker::new(kv, config.liveness_ttl);

    AppState {
        ingestion: Ingestion::new(
            identity.clone(),
            liveness.clone(),
            telemetry.clone(),
            config.store_timeout,
        ),
        window: WindowQuery::new(
            identity,
            telemetry,
            config.chart_field.clone(),
            config.store_timeout,
        ),
        liveness,
        default_uid: config.default_uid.clone(),
        chart_window: config.chart_window,
        chart_max_window: config.chart_max_window,
    }
}
