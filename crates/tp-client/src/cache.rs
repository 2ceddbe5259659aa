//! Entity-type cache.
//!
//! Readers share a read lock and get an `Arc` snapshot. A refresh fetches without holding any
//! lock and takes the write lock only to swap the new snapshot in, so a slow upstream never
//! blocks readers.

use crate::entity::EntityType;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TYPE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct Snapshot {
    types: Arc<Vec<String>>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct EntityTypeCache {
    ttl: Duration,
    inner: RwLock<Option<Snapshot>>,
}

impl Default for EntityTypeCache {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE_CACHE_TTL)
    }
}

impl EntityTypeCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Current snapshot, if one exists and has not expired.
    #[must_use]
    pub fn fresh(&self) -> Option<Arc<Vec<String>>> {
        let guard = self.inner.read();
        let snap = guard.as_ref()?;
        (Instant::now() < snap.expires_at).then(|| snap.types.clone())
    }

    fn store(&self, types: Vec<String>) -> Arc<Vec<String>> {
        let types = Arc::new(types);
        let snapshot = Snapshot {
            types: types.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        *self.inner.write() = Some(snapshot);
        types
    }

    /// Return the cached type names, refreshing through `fetch` when the snapshot is missing or
    /// expired.
    ///
    /// Never fails: a fetch error or an empty result falls back to the built-in list, which is
    /// returned but not cached so the next lookup tries upstream again.
    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Arc<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, E>>,
        E: std::fmt::Display,
    {
        if let Some(types) = self.fresh() {
            return types;
        }

        match fetch().await {
            Ok(types) if !types.is_empty() => {
                debug!(count = types.len(), "entity type cache refreshed");
                self.store(types)
            }
            Ok(_) => {
                warn!("metadata listed no entity types; using built-in list");
                Arc::new(EntityType::static_names())
            }
            Err(e) => {
                warn!(error = %e, "entity type refresh failed; using built-in list");
                Arc::new(EntityType::static_names())
            }
        }
    }
}

/// Type names are the top-level keys of the metadata document.
#[must_use]
pub fn extract_entity_types(metadata: &serde_json::Value) -> Vec<String> {
    metadata
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &AtomicUsize,
        result: Result<Vec<String>, String>,
    ) -> impl Future<Output = Result<Vec<String>, String>> + '_ {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { result }
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_uses_cache() {
        let cache = EntityTypeCache::default();
        let calls = AtomicUsize::new(0);
        let fetched = vec!["Bug".to_string(), "Widget".to_string()];

        let first = cache
            .get_or_refresh(|| counting_fetch(&calls, Ok(fetched.clone())))
            .await;
        let second = cache
            .get_or_refresh(|| counting_fetch(&calls, Ok(vec!["Other".to_string()])))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first, fetched);
        assert_eq!(*second, fetched);
    }

    #[tokio::test]
    async fn expired_snapshot_is_refreshed_once() {
        let cache = EntityTypeCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        cache
            .get_or_refresh(|| counting_fetch(&calls, Ok(vec!["Bug".to_string()])))
            .await;
        let refreshed = cache
            .get_or_refresh(|| counting_fetch(&calls, Ok(vec!["Task".to_string()])))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*refreshed, vec!["Task".to_string()]);
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_builtin_list() {
        let cache = EntityTypeCache::default();
        let calls = AtomicUsize::new(0);

        let types = cache
            .get_or_refresh(|| counting_fetch(&calls, Err("upstream down".to_string())))
            .await;

        assert_eq!(*types, EntityType::static_names());
        assert!(cache.fresh().is_none());
    }

    #[tokio::test]
    async fn empty_metadata_falls_back_to_builtin_list() {
        let cache = EntityTypeCache::default();
        let calls = AtomicUsize::new(0);

        let types = cache
            .get_or_refresh(|| counting_fetch(&calls, Ok(Vec::new())))
            .await;

        assert_eq!(*types, EntityType::static_names());
    }

    #[test]
    fn extracts_top_level_keys() {
        let mut types = extract_entity_types(&json!({ "Bug": {}, "UserStory": {} }));
        types.sort();
        assert_eq!(types, vec!["Bug".to_string(), "UserStory".to_string()]);
        assert!(extract_entity_types(&json!(["Bug"])).is_empty());
    }
}
