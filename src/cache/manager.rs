//! Snapshot cache over the key-value store.
//!
//! Writes replace the whole snapshot for a scope and stamp `fetched_at`.
//! Writes are sequenced: a snapshot write that began before a newer one
//! committed is discarded on completion, so a late remote response can
//! never clobber fresher data.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::VisitDay;
use crate::storage::{KeyValueStore, StoreError};

use super::scope::{CacheScope, EntityKind, Partition};

/// Consider a snapshot stale after this long; preload refreshes regardless,
/// this only drives optional "data may be old" hints.
const CACHE_STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheEntry<T> {
    pub items: Vec<T>,
    pub fetched_at: DateTime<Utc>,
}

/// Borrowed twin of [`CacheEntry`] so writes can serialize without cloning
/// the item list.
#[derive(Serialize)]
struct CacheEntryRef<'a, T> {
    items: &'a [T],
    fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_minutes()
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

pub struct EntityCache<S> {
    store: Arc<S>,
    next_seq: AtomicU64,
    /// Highest committed write sequence per storage key. Held across the
    /// store write so commits serialize and stale completions are detected.
    committed: Mutex<HashMap<String, u64>>,
}

impl<S: KeyValueStore> EntityCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            next_seq: AtomicU64::new(0),
            committed: Mutex::new(HashMap::new()),
        }
    }

    /// Local-only read. A corrupt stored value is logged and treated as
    /// absent rather than failing the caller.
    pub async fn read<T: DeserializeOwned>(
        &self,
        scope: &CacheScope,
    ) -> Result<Option<CacheEntry<T>>, StoreError> {
        let key = scope.storage_key();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, treating as absent");
                Ok(None)
            }
        }
    }

    /// Replace the full snapshot for a scope.
    pub async fn write_all<T: Serialize>(
        &self,
        scope: &CacheScope,
        items: &[T],
    ) -> Result<(), StoreError> {
        let ticket = self.issue_ticket();
        self.write_with_ticket(scope, items, ticket).await
    }

    fn issue_ticket(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn write_with_ticket<T: Serialize>(
        &self,
        scope: &CacheScope,
        items: &[T],
        ticket: u64,
    ) -> Result<(), StoreError> {
        let key = scope.storage_key();
        let payload = serde_json::to_string(&CacheEntryRef {
            items,
            fetched_at: Utc::now(),
        })?;

        let mut committed = self.committed.lock().await;
        if committed.get(&key).is_some_and(|&newest| newest > ticket) {
            debug!(key, ticket, "discarding snapshot write superseded by a newer one");
            return Ok(());
        }
        self.store.set(&key, &payload).await?;
        committed.insert(key, ticket);
        Ok(())
    }

    /// Fetch through the remote and replace the snapshot on success.
    /// Fail-open: any fetch error leaves the existing snapshot untouched
    /// and is reported to the caller. A storage failure after a successful
    /// fetch is logged and the session continues with the in-memory result.
    pub async fn refresh_with<T, Fut>(
        &self,
        scope: &CacheScope,
        fetch: Fut,
    ) -> Result<usize, ApiError>
    where
        T: Serialize,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let items = fetch.await?;
        let count = items.len();
        if let Err(e) = self.write_all(scope, &items).await {
            warn!(key = scope.storage_key(), error = %e, "failed to persist refreshed snapshot");
        }
        debug!(key = scope.storage_key(), count, "snapshot refreshed");
        Ok(count)
    }

    /// Write day-partitioned entities: one aggregate snapshot plus one
    /// snapshot per weekday, so day-filtered and unfiltered reads both hit
    /// the cache without recomputation.
    pub async fn write_day_partitioned<T, D>(
        &self,
        user_id: &str,
        entity: EntityKind,
        items: &[T],
        day_of: D,
    ) -> Result<(), StoreError>
    where
        T: Serialize,
        D: Fn(&T) -> Option<VisitDay>,
    {
        let aggregate = CacheScope::new(user_id, entity);
        self.write_all(&aggregate, items).await?;

        for day in VisitDay::ALL {
            let subset: Vec<&T> = items.iter().filter(|item| day_of(item) == Some(day)).collect();
            let scope = CacheScope::with_partition(user_id, entity, Partition::Day(day));
            self.write_all(&scope, &subset).await?;
        }
        Ok(())
    }

    /// Drop one snapshot.
    pub async fn invalidate(&self, scope: &CacheScope) -> Result<(), StoreError> {
        self.store.remove(&scope.storage_key()).await
    }
}
