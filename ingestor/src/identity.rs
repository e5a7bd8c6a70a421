use crate::cache::{identity_key, ExpiringStore};
use crate::errors::StoreError;
use crate::metrics::{IDENTITY_CACHE_HITS_TOTAL, IDENTITY_CACHE_MISSES_TOTAL};
use crate::model::DeviceId;
use crate::store::DeviceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache-first `uid -> DeviceId` resolution.
///
/// The registry is authoritative. Cache read or write failures only cost a
/// registry round trip; negative results are never cached. Concurrent misses
/// for one uid may both hit the registry and both write the same entry.
#[derive(Clone)]
pub struct IdentityCache {
    kv: Arc<dyn ExpiringStore>,
    registry: Arc<dyn DeviceRegistry>,
    ttl: Duration,
}

impl IdentityCache {
    pub fn new(kv: Arc<dyn ExpiringStore>, registry: Arc<dyn DeviceRegistry>, ttl: Duration) -> Self {
        Self { kv, registry, ttl }
    }

    /// Returns `Ok(None)` for an unregistered uid.
    pub async fn resolve(&self, uid: &str) -> Result<Option<DeviceId>, StoreError> {
        let key = identity_key(uid);

        match self.kv.get(&key).await {
            Ok(Some(cached)) => match cached.parse::<DeviceId>() {
                Ok(id) => {
                    IDENTITY_CACHE_HITS_TOTAL.inc();
                    return Ok(Some(id));
                }
                Err(_) => warn!(uid, cached = %cached, "Ignoring unparseable identity cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(uid, "Identity cache read failed, falling back to registry: {}", e),
        }

        IDENTITY_CACHE_MISSES_TOTAL.inc();
        let Some(device) = self.registry.find_by_uid(uid).await? else {
            debug!(uid, "Device not found in registry");
            return Ok(None);
        };

        if let Err(e) = self.kv.set_ex(&key, &device.id.to_string(), self.ttl).await {
            warn!(uid, "Failed to populate identity cache: {}", e);
        }

        Ok(Some(device.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRegistry, MemoryStore};

    const TTL: Duration = Duration::from_secs(3600);

    fn cache(kv: &Arc<MemoryStore>, registry: &Arc<MemoryRegistry>) -> IdentityCache {
        IdentityCache::new(kv.clone(), registry.clone(), TTL)
    }

    #[tokio::test]
    async fn test_second_resolve_is_served_from_cache() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let id = registry.register("SIM001").await;
        let identity = cache(&kv, &registry);

        assert_eq!(identity.resolve("SIM001").await.unwrap(), Some(id));
        assert_eq!(identity.resolve("SIM001").await.unwrap(), Some(id));

        assert_eq!(registry.lookups(), 1);
        assert_eq!(
            kv.get(&identity_key("SIM001")).await.unwrap(),
            Some(id.to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_uid_is_not_cached() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let identity = cache(&kv, &registry);

        assert_eq!(identity.resolve("GHOST").await.unwrap(), None);
        assert_eq!(identity.resolve("GHOST").await.unwrap(), None);

        assert_eq!(registry.lookups(), 2);
        assert_eq!(kv.writes(), 0);
    }

    #[tokio::test]
    async fn test_device_registered_after_miss_resolves() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let identity = cache(&kv, &registry);

        assert_eq!(identity.resolve("LATE").await.unwrap(), None);
        let id = registry.register("LATE").await;

        assert_eq!(identity.resolve("LATE").await.unwrap(), Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_rereads_registry() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("SIM001").await;
        let identity = cache(&kv, &registry);

        identity.resolve("SIM001").await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        identity.resolve("SIM001").await.unwrap();

        assert_eq!(registry.lookups(), 2);
    }

    #[tokio::test]
    async fn test_flushed_cache_only_costs_a_lookup() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let id = registry.register("SIM001").await;
        let identity = cache(&kv, &registry);

        identity.resolve("SIM001").await.unwrap();
        kv.flush().await;

        assert_eq!(identity.resolve("SIM001").await.unwrap(), Some(id));
        assert_eq!(registry.lookups(), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_registry() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let id = registry.register("SIM001").await;
        kv.set_unavailable(true);
        let identity = cache(&kv, &registry);

        assert_eq!(identity.resolve("SIM001").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_treated_as_miss() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        let id = registry.register("SIM001").await;
        kv.set_ex(&identity_key("SIM001"), "garbage", TTL).await.unwrap();
        let identity = cache(&kv, &registry);

        assert_eq!(identity.resolve("SIM001").await.unwrap(), Some(id));
        assert_eq!(registry.lookups(), 1);
    }

    #[tokio::test]
    async fn test_registry_outage_is_an_error() {
        let kv = Arc::new(MemoryStore::new());
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_unavailable(true);
        let identity = cache(&kv, &registry);

        assert!(identity.resolve("SIM001").await.is_err());
    }
}
