//! Leaderboard cache partitioned by [`LeaderboardKey`].

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use swipeduel_model::{LeaderboardEntry, LeaderboardKey};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheDomain, CacheEntry, CacheError, LeaderboardPolicy, ManagedCache},
    infra::{api::RatingApi, clock::Clock, image_loader::PreloadedImage},
    supply::preloader::Preloader,
};

#[derive(Debug)]
struct Slot {
    entry: CacheEntry<Vec<LeaderboardEntry>>,
    /// Bumped whenever the entry is replaced, so a slow preload for an older
    /// payload cannot mark a newer one ready.
    revision: u64,
    images_ready: bool,
    images: HashMap<String, PreloadedImage>,
}

#[derive(Debug)]
pub struct LeaderboardCache {
    api: Arc<dyn RatingApi>,
    preloader: Preloader,
    clock: Arc<dyn Clock>,
    policy: LeaderboardPolicy,
    slots: Mutex<HashMap<LeaderboardKey, Slot>>,
}

impl LeaderboardCache {
    pub fn new(
        api: Arc<dyn RatingApi>,
        preloader: Preloader,
        clock: Arc<dyn Clock>,
        policy: LeaderboardPolicy,
    ) -> Self {
        Self {
            api,
            preloader,
            clock,
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cached ranking for `key` if it is fresh and, under eager preload, its
    /// images are decoded.
    pub fn get(&self, key: LeaderboardKey) -> Option<Vec<LeaderboardEntry>> {
        let now = self.clock.now();
        let slots = self.slots.lock();
        let slot = slots.get(&key)?;
        if !slot.entry.is_fresh(now, self.policy.ttl) {
            return None;
        }
        if self.policy.preload_images && !slot.images_ready {
            return None;
        }
        Some(slot.entry.payload.clone())
    }

    /// Decoded leaderboard image, if eager preload produced one.
    pub fn preloaded_image(&self, url: &str) -> Option<PreloadedImage> {
        self.slots
            .lock()
            .values()
            .find_map(|slot| slot.images.get(url).cloned())
    }

    pub fn is_key_expired(&self, key: LeaderboardKey) -> bool {
        let now = self.clock.now();
        self.slots
            .lock()
            .get(&key)
            .is_none_or(|slot| !slot.entry.is_fresh(now, self.policy.ttl))
    }

    /// Fetch and store one leaderboard, then preload its images when the
    /// policy asks for it. Returns the number of entries stored.
    pub async fn refresh(&self, key: LeaderboardKey) -> Result<usize, CacheError> {
        let entries = self
            .api
            .fetch_leaderboard(key, self.policy.limit)
            .await?;
        let count = entries.len();
        let urls: Vec<String> =
            entries.iter().map(|entry| entry.image.url.clone()).collect();

        let revision = {
            let mut slots = self.slots.lock();
            let revision = slots.get(&key).map_or(0, |slot| slot.revision + 1);
            slots.insert(
                key,
                Slot {
                    entry: CacheEntry::new(entries, self.clock.now()),
                    revision,
                    images_ready: !self.policy.preload_images,
                    images: HashMap::new(),
                },
            );
            revision
        };
        debug!(%key, count, "leaderboard stored");

        if !self.policy.preload_images {
            return Ok(count);
        }

        let outcomes = self
            .preloader
            .preload_all(urls, self.policy.preload_concurrency)
            .await;
        let mut images = HashMap::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome.into_image() {
                Some(image) => {
                    images.insert(image.url().to_string(), image);
                }
                None => failed += 1,
            }
        }

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&key)
            && slot.revision == revision
        {
            slot.images = images;
            slot.images_ready = true;
        }
        if failed > 0 {
            warn!(%key, failed, "some leaderboard images failed to preload");
        }
        Ok(count)
    }

    /// Refresh every configured key. All keys are attempted even when some
    /// fail.
    pub async fn refresh_all(&self) -> Result<(), CacheError> {
        let keys = self.policy.keys.clone();
        let total = keys.len();
        let results =
            join_all(keys.iter().map(|key| self.refresh(*key))).await;

        let mut failed = 0usize;
        for (key, result) in keys.iter().zip(results) {
            if let Err(err) = result {
                warn!(%key, error = %err, "leaderboard refresh failed");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(CacheError::Partial { failed, total });
        }
        info!(keys = total, "leaderboards refreshed");
        Ok(())
    }

    pub fn clear_entries(&self) {
        self.slots.lock().clear();
    }
}

#[async_trait]
impl ManagedCache for LeaderboardCache {
    fn domain(&self) -> CacheDomain {
        CacheDomain::Leaderboard
    }

    /// Expired when any configured key is missing or stale.
    fn is_expired(&self) -> bool {
        self.policy.keys.iter().any(|key| self.is_key_expired(*key))
    }

    fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.slots
            .lock()
            .values()
            .map(|slot| slot.entry.age(now))
            .max()
    }

    async fn refresh(&self) -> Result<(), CacheError> {
        self.refresh_all().await
    }

    async fn clear(&self) {
        self.clear_entries();
    }
}
