//! Double-buffered image supply queue.
//!
//! The queue holds an active block being consumed pair by pair, a buffer
//! block fetched ahead of need, a cursor into the active block and the decoded
//! images of both blocks. Advancing past the end of the active block rotates
//! the buffer in, evicts the outgoing images and starts fetching the next
//! buffer. At most one block fetch is in flight at any time.

use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use swipeduel_model::{Block, Gender, ImagePair};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    constants::supply,
    infra::image_loader::PreloadedImage,
    supply::{
        fetcher::BlockFetcher,
        preloader::{PreloadOutcome, Preloader, ProgressivePreload},
        snapshot::{QueueSnapshot, SnapshotCache},
    },
};

/// Invoked once with the first renderable pair.
pub type FirstPairCallback = Box<dyn FnOnce(ImagePair) + Send + 'static>;

/// Failures surfaced by [`ImageSupplyQueue::initialize`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The first block fetch failed or returned no records.
    #[error("No images available for {gender}")]
    NoImagesAvailable {
        /// Filter the fetch was made for.
        gender: Gender,
    },

    /// A reset landed while the first block was being fetched.
    #[error("Queue was reset while initializing")]
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FetchState {
    #[default]
    Idle,
    /// A block request started under `generation` is outstanding.
    Fetching { generation: u64 },
}

#[derive(Debug, Default)]
struct QueueState {
    active_block: Block,
    buffer_block: Block,
    current_index: usize,
    preloaded: HashMap<String, PreloadedImage>,
    gender_filter: Option<Gender>,
    fetch: FetchState,
    /// Bumped on every reset; results tagged with an older generation are stale.
    generation: u64,
    rotations: u64,
    fetches_issued: u64,
}

impl QueueState {
    fn remaining_records(&self) -> usize {
        self.active_block.len().saturating_sub(self.current_index)
    }

    fn pair_at_cursor(&self) -> Option<ImagePair> {
        ImagePair::from_slice(&self.active_block, self.current_index)
    }

    fn holds_url(&self, url: &str) -> bool {
        self.active_block
            .iter()
            .chain(self.buffer_block.iter())
            .any(|record| record.url == url)
    }

    /// Promote the buffer, dropping decoded images only the outgoing block used.
    fn rotate(&mut self) {
        let outgoing = std::mem::take(&mut self.active_block);
        let incoming = std::mem::take(&mut self.buffer_block);

        let retained: HashSet<&str> =
            incoming.iter().map(|record| record.url.as_str()).collect();
        let mut evicted = 0usize;
        for record in &outgoing {
            if !retained.contains(record.url.as_str())
                && self.preloaded.remove(&record.url).is_some()
            {
                evicted += 1;
            }
        }

        debug!(
            outgoing = outgoing.len(),
            incoming = incoming.len(),
            evicted,
            "rotating supply queue"
        );

        self.active_block = incoming;
        self.current_index = 0;
        self.rotations += 1;
    }

    /// Reset everything but the generation counter, which moves forward.
    fn reset(&mut self, gender_filter: Option<Gender>) -> u64 {
        let generation = self.generation + 1;
        *self = QueueState {
            gender_filter,
            generation,
            ..QueueState::default()
        };
        generation
    }
}

/// Point-in-time view of the queue for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Records in the block being consumed.
    pub active_len: usize,
    /// Records fetched ahead of need.
    pub buffer_len: usize,
    /// Cursor into the active block. Always even.
    pub current_index: usize,
    /// Decoded images held in memory.
    pub preloaded: usize,
    /// Pixel bytes of the decoded images.
    pub resident_bytes: u64,
    pub fetch_in_flight: bool,
    /// Buffer promotions since construction or the last reset.
    pub rotations: u64,
    /// Block requests started, the initial one included.
    pub fetches_issued: u64,
}

#[derive(Debug)]
struct QueueInner {
    state: Mutex<QueueState>,
    fetcher: BlockFetcher,
    preloader: Preloader,
    snapshots: Option<SnapshotCache>,
}

/// Owned handle to the supply queue. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ImageSupplyQueue {
    inner: Arc<QueueInner>,
}

impl ImageSupplyQueue {
    /// Build a queue. Without a [`SnapshotCache`] the queue never restores or
    /// persists itself.
    pub fn new(
        fetcher: BlockFetcher,
        preloader: Preloader,
        snapshots: Option<SnapshotCache>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                fetcher,
                preloader,
                snapshots,
            }),
        }
    }

    /// Fill the queue for `gender`, resuming from a persisted snapshot when a
    /// valid one exists. `on_first_pair_ready` fires as soon as the first pair
    /// is renderable; the rest of the block keeps loading in the background.
    pub async fn initialize(
        &self,
        gender: Gender,
        on_first_pair_ready: Option<FirstPairCallback>,
    ) -> Result<(), QueueError> {
        if let Some(snapshot) = self.load_snapshot(gender).await {
            self.resume_from(gender, snapshot, on_first_pair_ready).await;
            return Ok(());
        }

        let generation = {
            let mut state = self.inner.state.lock();
            let generation = state.reset(Some(gender));
            state.fetch = FetchState::Fetching { generation };
            state.fetches_issued += 1;
            generation
        };

        let block = self.inner.fetcher.fetch_block(gender).await;

        let urls = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(%gender, "queue reset during initial fetch; discarding block");
                return Err(QueueError::Superseded);
            }
            state.fetch = FetchState::Idle;
            let Some(block) = block else {
                return Err(QueueError::NoImagesAvailable { gender });
            };
            let urls = block.iter().map(|record| record.url.clone()).collect();
            state.active_block = block;
            state.current_index = 0;
            urls
        };

        let mut preload = self.spawn_block_preload(urls, generation);
        let loaded = preload.first_pair_ready().await;
        info!(%gender, loaded, "first pair ready");

        if let Some(callback) = on_first_pair_ready
            && let Some(pair) = self.current_pair_for(generation)
        {
            callback(pair);
        }

        self.start_buffer_fetch();
        Ok(())
    }

    /// Advance to the next pair, rotating blocks when the active one runs
    /// out. `None` means no data is available right now.
    pub fn get_next_pair(&self) -> Option<ImagePair> {
        let (pair, rotated) = {
            let mut state = self.inner.state.lock();
            state.current_index += 2;

            let rotated = state.remaining_records() < 2;
            if rotated {
                state.rotate();
            }
            (state.pair_at_cursor(), rotated)
        };

        if rotated {
            self.start_buffer_fetch();
        }
        if pair.is_none() {
            debug!("supply queue exhausted; waiting for next block");
        }
        pair
    }

    pub fn get_current_pair(&self) -> Option<ImagePair> {
        self.inner.state.lock().pair_at_cursor()
    }

    /// The pair [`Self::get_next_pair`] would return, without advancing.
    /// Across a rotation boundary this is the head of the buffer block.
    pub fn peek_next_pair(&self) -> Option<ImagePair> {
        let state = self.inner.state.lock();
        let next = state.current_index + 2;
        if next + 2 <= state.active_block.len() {
            ImagePair::from_slice(&state.active_block, next)
        } else {
            ImagePair::from_slice(&state.buffer_block, 0)
        }
    }

    /// Decoded image for `url`, if it finished preloading.
    pub fn preloaded_image(&self, url: &str) -> Option<PreloadedImage> {
        self.inner.state.lock().preloaded.get(url).cloned()
    }

    /// Pairs left in the active block, counting the current one.
    pub fn remaining_pairs(&self) -> usize {
        self.inner.state.lock().remaining_records() / 2
    }

    pub fn gender_filter(&self) -> Option<Gender> {
        self.inner.state.lock().gender_filter
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            active_len: state.active_block.len(),
            buffer_len: state.buffer_block.len(),
            current_index: state.current_index,
            preloaded: state.preloaded.len(),
            resident_bytes: state
                .preloaded
                .values()
                .map(PreloadedImage::byte_len)
                .sum(),
            fetch_in_flight: matches!(state.fetch, FetchState::Fetching { .. }),
            rotations: state.rotations,
            fetches_issued: state.fetches_issued,
        }
    }

    /// Persist the current blocks and cursor. No-op without a snapshot cache
    /// or when there is nothing to resume.
    pub async fn save_queue_to_cache(&self) -> bool {
        let Some(snapshots) = &self.inner.snapshots else {
            return false;
        };
        let (active, buffer, index) = {
            let state = self.inner.state.lock();
            if state.pair_at_cursor().is_none() {
                debug!("nothing to persist; skipping queue snapshot");
                return false;
            }
            (
                state.active_block.clone(),
                state.buffer_block.clone(),
                state.current_index,
            )
        };
        snapshots.save(&active, &buffer, index).await
    }

    /// Drop all in-memory state. Persisted storage is left alone. Fetches
    /// still in flight resolve into the void.
    pub fn reset_queue(&self) {
        let generation = self.inner.state.lock().reset(None);
        debug!(generation, "supply queue reset");
    }

    /// Drop in-memory state and the persisted snapshot.
    pub async fn clear_queue_cache(&self) {
        self.reset_queue();
        if let Some(snapshots) = &self.inner.snapshots {
            snapshots.clear().await;
        }
    }

    async fn load_snapshot(&self, gender: Gender) -> Option<QueueSnapshot> {
        let snapshots = self.inner.snapshots.as_ref()?;
        let snapshot = snapshots.load().await?;

        let matches_filter = snapshot
            .active_block
            .iter()
            .chain(snapshot.buffer_block.iter())
            .all(|record| record.gender == gender);
        if !matches_filter {
            info!(%gender, "persisted queue belongs to another filter; discarding");
            snapshots.clear().await;
            return None;
        }
        Some(snapshot)
    }

    async fn resume_from(
        &self,
        gender: Gender,
        snapshot: QueueSnapshot,
        on_first_pair_ready: Option<FirstPairCallback>,
    ) {
        let QueueSnapshot {
            active_block,
            buffer_block,
            current_index,
            ..
        } = snapshot;

        let (generation, head, rest, near_exhaustion) = {
            let mut state = self.inner.state.lock();
            let generation = state.reset(Some(gender));
            state.active_block = active_block;
            state.buffer_block = buffer_block;
            state.current_index = current_index;

            let mut urls = state.active_block[current_index..]
                .iter()
                .chain(state.buffer_block.iter())
                .map(|record| record.url.clone());
            let head: Vec<String> = urls.by_ref().take(2).collect();
            let rest: Vec<String> = urls.collect();

            let near_exhaustion = state.buffer_block.is_empty()
                && state.remaining_records() / 2 <= supply::NEAR_EXHAUSTION_PAIRS;
            (generation, head, rest, near_exhaustion)
        };
        info!(
            %gender,
            current_index,
            remaining = rest.len() + head.len(),
            "resuming supply queue from snapshot"
        );

        for url in head {
            let outcome = self.inner.preloader.preload(&url).await;
            self.store_outcome(generation, outcome);
        }

        if let Some(callback) = on_first_pair_ready
            && let Some(pair) = self.current_pair_for(generation)
        {
            callback(pair);
        }

        if !rest.is_empty() {
            drop(self.spawn_block_preload(rest, generation));
        }
        if near_exhaustion {
            self.start_buffer_fetch();
        }
    }

    fn current_pair_for(&self, generation: u64) -> Option<ImagePair> {
        let state = self.inner.state.lock();
        if state.generation != generation {
            return None;
        }
        state.pair_at_cursor()
    }

    fn store_outcome(&self, generation: u64, outcome: PreloadOutcome) {
        let Some(image) = outcome.into_image() else {
            return;
        };
        let mut state = self.inner.state.lock();
        // Late results for a reset queue or an already rotated-out block
        // must not grow the map.
        if state.generation == generation && state.holds_url(image.url()) {
            state.preloaded.insert(image.url().to_string(), image);
        }
    }

    fn spawn_block_preload(
        &self,
        urls: Vec<String>,
        generation: u64,
    ) -> ProgressivePreload {
        let queue = self.clone();
        self.inner.preloader.spawn_sequential(
            urls,
            supply::FIRST_PAIR_READY_AFTER,
            move |outcome| queue.store_outcome(generation, outcome),
        )
    }

    /// Start fetching the next buffer block unless a fetch is already
    /// outstanding. Returns whether a request was issued.
    fn start_buffer_fetch(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; skipping buffer fetch");
            return false;
        };

        let (gender, generation) = {
            let mut state = self.inner.state.lock();
            if let FetchState::Fetching { .. } = state.fetch {
                debug!("block fetch already in flight");
                return false;
            }
            if !state.buffer_block.is_empty() {
                return false;
            }
            let Some(gender) = state.gender_filter else {
                return false;
            };
            let generation = state.generation;
            state.fetch = FetchState::Fetching { generation };
            state.fetches_issued += 1;
            (gender, generation)
        };

        let queue = self.clone();
        runtime.spawn(async move {
            queue.complete_buffer_fetch(gender, generation).await;
        });
        true
    }

    async fn complete_buffer_fetch(&self, gender: Gender, generation: u64) {
        let block = self.inner.fetcher.fetch_block(gender).await;

        let urls = {
            let mut state = self.inner.state.lock();
            if state.fetch == (FetchState::Fetching { generation }) {
                state.fetch = FetchState::Idle;
            }
            if state.generation != generation {
                debug!(%gender, "queue reset during buffer fetch; discarding block");
                return;
            }
            // Failure leaves the queue untouched; the next rotation retries.
            let Some(block) = block else {
                return;
            };
            if !state.buffer_block.is_empty() {
                return;
            }
            let urls: Vec<String> =
                block.iter().map(|record| record.url.clone()).collect();
            state.buffer_block = block;
            urls
        };

        debug!(%gender, len = urls.len(), "buffer block ready");
        drop(self.spawn_block_preload(urls, generation));
    }

    #[cfg(test)]
    fn install_blocks(&self, gender: Gender, active: Block, buffer: Block) {
        let mut state = self.inner.state.lock();
        state.reset(Some(gender));
        state.active_block = active;
        state.buffer_block = buffer;
    }

    #[cfg(test)]
    fn active_block(&self) -> Block {
        self.inner.state.lock().active_block.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        infra::testing::{StubApi, StubImageLoader, fixture_block},
        supply::preloader::RetryPolicy,
    };
    use std::time::Duration;

    fn queue(api: Arc<StubApi>) -> ImageSupplyQueue {
        ImageSupplyQueue::new(
            BlockFetcher::new(api, 10),
            Preloader::new(Arc::new(StubImageLoader::new()), RetryPolicy::default()),
            None,
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_evicts_only_outgoing_images() {
        let api = Arc::new(StubApi::new());
        let queue = queue(api);
        let active = fixture_block(Gender::Male, 0, 4);
        let mut buffer = fixture_block(Gender::Male, 4, 4);
        // Same image reappearing in the next block keeps its decoded copy.
        buffer[0] = active[1].clone();
        queue.install_blocks(Gender::Male, active.clone(), buffer.clone());

        let urls: Vec<String> = active
            .iter()
            .chain(buffer.iter())
            .map(|r| r.url.clone())
            .collect();
        let generation = queue.inner.state.lock().generation;
        queue.spawn_block_preload(urls, generation).finished().await;
        assert_eq!(queue.stats().preloaded, 7);

        queue.get_next_pair();
        let pair = queue.get_next_pair().expect("rotated into buffer");
        assert_eq!(pair.first, active[1]);

        assert!(queue.preloaded_image(&active[0].url).is_none());
        assert!(queue.preloaded_image(&active[1].url).is_some());
        assert!(queue.preloaded_image(&buffer[1].url).is_some());
        assert_eq!(queue.stats().rotations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_preload_for_rotated_block_is_dropped() {
        let api = Arc::new(StubApi::new());
        let queue = queue(api);
        let active = fixture_block(Gender::Male, 0, 2);
        queue.install_blocks(Gender::Male, active.clone(), fixture_block(Gender::Male, 2, 2));
        let generation = queue.inner.state.lock().generation;

        queue.get_next_pair();
        queue.store_outcome(
            generation,
            PreloadOutcome::Loaded(PreloadedImage::from_rgba(
                active[0].url.as_str(),
                image::RgbaImage::new(1, 1),
            )),
        );
        assert!(queue.preloaded_image(&active[0].url).is_none());
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_buffer_fetch_leaves_state_unchanged() {
        let api = Arc::new(StubApi::new());
        api.push_block_failure();
        let queue = queue(api.clone());
        let active = fixture_block(Gender::Female, 0, 2);
        queue.install_blocks(Gender::Female, active, Vec::new());

        assert!(queue.get_next_pair().is_none());
        settle().await;

        let stats = queue.stats();
        assert_eq!(api.block_requests(), 1);
        assert_eq!((stats.active_len, stats.buffer_len), (0, 0));
        assert!(!stats.fetch_in_flight);

        // Next advance retries and lands on the new block.
        assert!(queue.get_next_pair().is_none());
        settle().await;
        assert_eq!(queue.stats().buffer_len, 10);
        assert!(queue.get_next_pair().is_some());
        assert_eq!(queue.active_block().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_stale_fetch() {
        let api = Arc::new(StubApi::new());
        api.hold_blocks();
        let queue = queue(api.clone());
        queue.install_blocks(Gender::Female, fixture_block(Gender::Female, 0, 2), Vec::new());

        assert!(queue.get_next_pair().is_none());
        assert!(queue.stats().fetch_in_flight);

        queue.reset_queue();
        api.release_blocks(1);
        settle().await;

        let stats = queue.stats();
        assert_eq!((stats.active_len, stats.buffer_len), (0, 0));
        assert!(!stats.fetch_in_flight);
        assert!(queue.gender_filter().is_none());
    }

    #[test]
    fn advancing_without_runtime_does_not_panic() {
        let api = Arc::new(StubApi::new());
        let queue = queue(api.clone());
        queue.install_blocks(Gender::Male, fixture_block(Gender::Male, 0, 2), Vec::new());

        assert!(queue.get_next_pair().is_none());
        assert_eq!(api.block_requests(), 0);
        assert!(!queue.stats().fetch_in_flight);
    }
}
