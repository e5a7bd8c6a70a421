use crate::cache::{liveness_key, ExpiringStore};
use crate::metrics::LIVENESS_FAILURES_TOTAL;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const MARKER: &str = "online";

/// Presence-only liveness markers.
///
/// A device is online iff its marker exists. Nothing ever writes an offline
/// state: the marker simply expires in the backing store.
#[derive(Clone)]
pub struct LivenessTracker {
    kv: Arc<dyn ExpiringStore>,
    ttl: Duration,
}

impl LivenessTracker {
    pub fn new(kv: Arc<dyn ExpiringStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// (Re)sets the marker with a fresh TTL. Failures are logged and swallowed.
    pub async fn refresh(&self, uid: &str) {
        if let Err(e) = self.kv.set_ex(&liveness_key(uid), MARKER, self.ttl).await {
            LIVENESS_FAILURES_TOTAL.inc();
            warn!(uid, "Liveness refresh failed: {}", e);
        }
    }

    /// An unreachable store reads as offline.
    pub async fn is_online(&self, uid: &str) -> bool {
        match self.kv.exists(&liveness_key(uid)).await {
            Ok(online) => online,
            Err(e) => {
                warn!(uid, "Liveness lookup failed, reporting offline: {}", e);
                false
            }
        }
    }
}
