//! Short-lived persisted copy of the queue so a remounted rating view can
//! resume without a reload flash. Never authoritative.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use swipeduel_model::{Block, ImageRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    constants::snapshot,
    infra::{clock::Clock, storage::KeyValueStore},
};

/// Persisted queue layout: `{activeBlock, bufferBlock, currentIndex, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub active_block: Block,
    pub buffer_block: Block,
    pub current_index: usize,
    /// Epoch milliseconds at save time.
    pub timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    active_block: &'a [ImageRecord],
    buffer_block: &'a [ImageRecord],
    current_index: usize,
    timestamp: i64,
}

#[derive(Debug, Error)]
enum Rejection {
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("active block is empty")]
    EmptyActive,

    #[error("active block has odd length {0}")]
    OddActive(usize),

    #[error("buffer block has odd length {0}")]
    OddBuffer(usize),

    #[error("cursor {index} outside active block of {len}")]
    Cursor { index: usize, len: usize },

    #[error("snapshot expired ({age_ms} ms old)")]
    Expired { age_ms: i64 },

    #[error("snapshot timestamp lies in the future")]
    FromFuture,
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    key: String,
}

impl SnapshotCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            key: snapshot::STORAGE_KEY.to_string(),
        }
    }

    /// Best-effort write. Returns whether the snapshot reached storage.
    pub async fn save(
        &self,
        active: &[ImageRecord],
        buffer: &[ImageRecord],
        current_index: usize,
    ) -> bool {
        let payload = SnapshotRef {
            active_block: active,
            buffer_block: buffer,
            current_index,
            timestamp: self.clock.now_millis(),
        };

        let raw = match serde_json::to_string(&payload) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to encode queue snapshot");
                return false;
            }
        };

        match self.store.set(&self.key, &raw).await {
            Ok(()) => {
                debug!(
                    active = active.len(),
                    buffer = buffer.len(),
                    current_index,
                    "queue snapshot saved"
                );
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to persist queue snapshot");
                false
            }
        }
    }

    /// Load a snapshot that is present, well-formed and younger than the TTL.
    /// Anything else is purged and reported as `None`.
    pub async fn load(&self) -> Option<QueueSnapshot> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to read queue snapshot");
                return None;
            }
        };

        match self.validate(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(rejection) => {
                info!(reason = %rejection, "discarding persisted queue snapshot");
                self.clear().await;
                None
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.remove(&self.key).await {
            warn!(error = %err, "failed to remove queue snapshot");
        }
    }

    fn validate(&self, raw: &str) -> Result<QueueSnapshot, Rejection> {
        let snapshot: QueueSnapshot = serde_json::from_str(raw)?;

        let len = snapshot.active_block.len();
        if len == 0 {
            return Err(Rejection::EmptyActive);
        }
        if len % 2 != 0 {
            return Err(Rejection::OddActive(len));
        }
        if snapshot.buffer_block.len() % 2 != 0 {
            return Err(Rejection::OddBuffer(snapshot.buffer_block.len()));
        }
        let index = snapshot.current_index;
        if index % 2 != 0 || index + 2 > len {
            return Err(Rejection::Cursor { index, len });
        }

        let age_ms = self.clock.now_millis() - snapshot.timestamp;
        if age_ms < 0 {
            return Err(Rejection::FromFuture);
        }
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms >= ttl_ms {
            return Err(Rejection::Expired { age_ms });
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        storage::MemoryStore,
        testing::{ManualClock, fixture_block},
    };
    use swipeduel_model::Gender;

    fn cache() -> (SnapshotCache, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let cache = SnapshotCache::new(
            store.clone(),
            Arc::new(clock.clone()),
            snapshot::TTL,
        );
        (cache, store, clock)
    }

    #[tokio::test]
    async fn fresh_snapshot_is_adopted() {
        let (cache, _, clock) = cache();
        let active = fixture_block(Gender::Female, 0, 10);
        let buffer = fixture_block(Gender::Female, 10, 10);

        assert!(cache.save(&active, &buffer, 4).await);
        clock.advance(Duration::from_secs(59));

        let loaded = cache.load().await.expect("snapshot within TTL");
        assert_eq!(loaded.active_block, active);
        assert_eq!(loaded.buffer_block, buffer);
        assert_eq!(loaded.current_index, 4);
    }

    #[tokio::test]
    async fn expired_snapshot_is_purged() {
        let (cache, store, clock) = cache();
        let active = fixture_block(Gender::Male, 0, 10);

        assert!(cache.save(&active, &[], 0).await);
        clock.advance(snapshot::TTL);

        assert!(cache.load().await.is_none());
        assert!(store.raw(snapshot::STORAGE_KEY).is_none());
    }

    #[tokio::test]
    async fn malformed_and_inconsistent_snapshots_are_purged() {
        let (cache, store, clock) = cache();
        let now = clock.now_millis();

        store.insert_raw(snapshot::STORAGE_KEY, "{not json");
        assert!(cache.load().await.is_none());
        assert!(store.raw(snapshot::STORAGE_KEY).is_none());

        let odd_cursor = serde_json::to_string(&QueueSnapshot {
            active_block: fixture_block(Gender::Male, 0, 10),
            buffer_block: Vec::new(),
            current_index: 3,
            timestamp: now,
        })
        .unwrap();
        store.insert_raw(snapshot::STORAGE_KEY, odd_cursor);
        assert!(cache.load().await.is_none());
        assert!(store.raw(snapshot::STORAGE_KEY).is_none());

        let cursor_past_end = serde_json::to_string(&QueueSnapshot {
            active_block: fixture_block(Gender::Male, 0, 10),
            buffer_block: Vec::new(),
            current_index: 10,
            timestamp: now,
        })
        .unwrap();
        store.insert_raw(snapshot::STORAGE_KEY, cursor_past_end);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let (cache, store, _) = cache();
        store.reject_writes(true);

        let active = fixture_block(Gender::Male, 0, 10);
        assert!(!cache.save(&active, &[], 0).await);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn wire_layout_uses_camel_case_keys() {
        let (cache, store, _) = cache();
        let active = fixture_block(Gender::Male, 0, 2);
        cache.save(&active, &[], 0).await;

        let raw = store.raw(snapshot::STORAGE_KEY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in ["activeBlock", "bufferBlock", "currentIndex", "timestamp"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
