use crate::errors::{Error, Result, StoreError};
use crate::identity::IdentityCache;
use crate::liveness::LivenessTracker;
use crate::metrics::{
    ACCEPTED_REPORTS_TOTAL, APPEND_LATENCY_SECONDS, INVALID_REPORTS_TOTAL, REPORTS_TOTAL,
    STORE_FAILURES_TOTAL, UNREGISTERED_REPORTS_TOTAL,
};
use crate::model::{Ack, RawReport};
use crate::store::TelemetryStore;
use crate::validate::validate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};

/// Validate, resolve, mark alive, append. Each report is processed once; no retries.
#[derive(Clone)]
pub struct Ingestion {
    identity: IdentityCache,
    liveness: LivenessTracker,
    telemetry: Arc<dyn TelemetryStore>,
    store_timeout: Duration,
}

impl Ingestion {
    pub fn new(
        identity: IdentityCache,
        liveness: LivenessTracker,
        telemetry: Arc<dyn TelemetryStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            liveness,
            telemetry,
            store_timeout,
        }
    }

    pub async fn ingest(&self, report: RawReport) -> Result<Ack> {
        REPORTS_TOTAL.inc();

        let report = validate(report).inspect_err(|e| {
            INVALID_REPORTS_TOTAL.inc();
            debug!("Rejected report: {}", e);
        })?;
        let uid = report.uid;

        let device_id = match self.identity.resolve(&uid).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                UNREGISTERED_REPORTS_TOTAL.inc();
                warn!(uid = %uid, "Report from unregistered device");
                return Err(Error::UnregisteredDevice(uid));
            }
            Err(e) => {
                STORE_FAILURES_TOTAL.inc();
                error!(uid = %uid, "Device registry lookup failed: {}", e);
                return Err(Error::Registry(e));
            }
        };

        self.liveness.refresh(&uid).await;

        let start = Instant::now();
        let appended = timeout(self.store_timeout, self.telemetry.append(device_id, report.payload))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.store_timeout)));

        match appended {
            Ok(reading) => {
                APPEND_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
                ACCEPTED_REPORTS_TOTAL.inc();
                debug!(uid = %uid, device_id = %device_id, reading_id = reading.id, "Report stored");
                Ok(Ack::received(uid))
            }
            Err(e) => {
                STORE_FAILURES_TOTAL.inc();
                error!(uid = %uid, device_id = %device_id, "Failed to append telemetry: {}", e);
                Err(Error::StoreWrite(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{identity_key, liveness_key, ExpiringStore};
    use crate::memory::{MemoryRegistry, MemoryStore, MemoryTelemetry};
    use crate::model::{DeviceId, Payload, Reading};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Harness {
        kv: Arc<MemoryStore>,
        registry: Arc<MemoryRegistry>,
        telemetry: Arc<MemoryTelemetry>,
        ingestion: Ingestion,
    }

    fn harness() -> Harness {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let telemetry = Arc::new(MemoryTelemetry::new());
        let ingestion = Ingestion::new(
            IdentityCache::new(kv.clone(), registry.clone(), Duration::from_secs(3600)),
            LivenessTracker::new(kv.clone(), Duration::from_secs(60)),
            telemetry.clone(),
            Duration::from_secs(5),
        );
        Harness {
            kv,
            registry,
            telemetry,
            ingestion,
        }
    }

    fn report(body: Value) -> RawReport {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_registered_report_is_stored_once() {
        let h = harness();
        let id = h.registry.register("SIM001").await;

        let ack = h
            .ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 60}})))
            .await
            .unwrap();

        assert_eq!(ack, Ack::received("SIM001"));
        assert_eq!(h.telemetry.appends(), 1);
        assert_eq!(h.telemetry.count_for(id).await, 1);
        assert!(h.kv.exists(&liveness_key("SIM001")).await.unwrap());
        assert!(h.kv.exists(&identity_key("SIM001")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_report_has_no_side_effects() {
        let h = harness();

        let err = h
            .ingestion
            .ingest(report(json!({"uid": "GHOST", "data": {"temp": 60}})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnregisteredDevice(uid) if uid == "GHOST"));
        assert_eq!(h.telemetry.appends(), 0);
        assert_eq!(h.kv.writes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_report_touches_nothing() {
        let h = harness();
        h.registry.register("SIM001").await;

        for body in [
            json!({"data": {"temp": 60}}),
            json!({"uid": "SIM001"}),
            json!({"uid": "", "data": {"temp": 60}}),
            json!({"uid": "SIM001", "data": {}}),
        ] {
            let err = h.ingestion.ingest(report(body)).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        assert_eq!(h.registry.lookups(), 0);
        assert_eq!(h.kv.writes(), 0);
        assert_eq!(h.telemetry.appends(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_reports_are_stored_twice() {
        let h = harness();
        let id = h.registry.register("SIM001").await;
        let body = json!({"uid": "SIM001", "data": {"temp": 60}});

        h.ingestion.ingest(report(body.clone())).await.unwrap();
        h.ingestion.ingest(report(body)).await.unwrap();

        assert_eq!(h.telemetry.count_for(id).await, 2);
        assert_eq!(h.registry.lookups(), 1);
    }

    #[tokio::test]
    async fn test_liveness_outage_does_not_fail_ingestion() {
        let h = harness();
        let id = h.registry.register("SIM001").await;
        // Warm the identity cache, then take the expiring store down.
        h.ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 1}})))
            .await
            .unwrap();
        h.kv.set_unavailable(true);

        let ack = h
            .ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 2}})))
            .await;

        assert!(ack.is_ok());
        assert_eq!(h.telemetry.count_for(id).await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_acknowledged() {
        let h = harness();
        h.registry.register("SIM001").await;
        h.telemetry.set_unavailable(true);

        let err = h
            .ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 60}})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreWrite(_)));
    }

    #[tokio::test]
    async fn test_registry_failure_is_surfaced() {
        let h = harness();
        h.registry.set_unavailable(true);

        let err = h
            .ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 60}})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Registry(_)));
        assert_eq!(h.telemetry.appends(), 0);
    }

    struct StalledStore;

    #[async_trait]
    impl TelemetryStore for StalledStore {
        async fn append(&self, _: DeviceId, _: Payload) -> std::result::Result<Reading, StoreError> {
            std::future::pending().await
        }

        async fn recent_window(
            &self,
            _: DeviceId,
            _: usize,
        ) -> std::result::Result<Vec<Reading>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_timeout_is_a_store_failure() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("SIM001").await;
        let ingestion = Ingestion::new(
            IdentityCache::new(kv.clone(), registry, Duration::from_secs(3600)),
            LivenessTracker::new(kv, Duration::from_secs(60)),
            Arc::new(StalledStore),
            Duration::from_millis(250),
        );

        let err = ingestion
            .ingest(report(json!({"uid": "SIM001", "data": {"temp": 60}})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreWrite(StoreError::Timeout(_))));
    }
}
