//! Deterministic collaborators for tests.
//!
//! Scripted API and image loader implementations that count calls and can be
//! held back with a gate to simulate slow networks, plus a manually advanced
//! clock for TTL checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use swipeduel_model::{
    Block, Gender, ImageId, ImageRecord, LeaderboardEntry, LeaderboardKey,
    RatingRequest, UserId, UserProfile,
};
use tokio::sync::Semaphore;

use crate::infra::{
    api::{ApiError, ApiResult, RatingApi},
    clock::Clock,
    image_loader::{ImageLoadError, ImageLoader, PreloadedImage},
};

/// Block of `len` records numbered from `start`.
pub fn fixture_block(gender: Gender, start: usize, len: usize) -> Block {
    (start..start + len)
        .map(|n| {
            ImageRecord::new(
                format!("img-{n}"),
                format!("owner-{n}"),
                format!("https://cdn.test/{gender}/{n}.jpg"),
                gender,
            )
        })
        .collect()
}

/// Gate that holds async calls until permits are released.
#[derive(Debug, Clone)]
struct Gate(Arc<Semaphore>);

impl Gate {
    fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    async fn pass(&self) {
        if let Ok(permit) = self.0.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug)]
enum ScriptedBlock {
    Records(Block),
    Failure,
}

/// Scripted [`RatingApi`].
///
/// Unscripted block requests are answered with fresh fixture records so ids
/// never repeat across blocks.
#[derive(Debug, Default)]
pub struct StubApi {
    scripted_blocks: Mutex<VecDeque<ScriptedBlock>>,
    block_gate: Mutex<Option<Gate>>,
    block_requests: AtomicUsize,
    next_record: AtomicUsize,
    leaderboards: Mutex<HashMap<LeaderboardKey, Block>>,
    leaderboard_requests: AtomicUsize,
    fail_leaderboards: AtomicBool,
    user: Mutex<Option<UserProfile>>,
    user_requests: AtomicUsize,
    ratings: Mutex<Vec<RatingRequest>>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&self, block: Block) {
        self.scripted_blocks
            .lock()
            .push_back(ScriptedBlock::Records(block));
    }

    pub fn push_block_failure(&self) {
        self.scripted_blocks.lock().push_back(ScriptedBlock::Failure);
    }

    /// Hold every subsequent block request until [`Self::release_blocks`].
    pub fn hold_blocks(&self) {
        *self.block_gate.lock() = Some(Gate::closed());
    }

    pub fn release_blocks(&self, count: usize) {
        if let Some(gate) = self.block_gate.lock().as_ref() {
            gate.0.add_permits(count);
        }
    }

    pub fn block_requests(&self) -> usize {
        self.block_requests.load(Ordering::SeqCst)
    }

    pub fn set_leaderboard(&self, key: LeaderboardKey, records: Block) {
        self.leaderboards.lock().insert(key, records);
    }

    pub fn fail_leaderboards(&self, fail: bool) {
        self.fail_leaderboards.store(fail, Ordering::SeqCst);
    }

    pub fn leaderboard_requests(&self) -> usize {
        self.leaderboard_requests.load(Ordering::SeqCst)
    }

    pub fn set_user(&self, user: Option<UserProfile>) {
        *self.user.lock() = user;
    }

    pub fn user_requests(&self) -> usize {
        self.user_requests.load(Ordering::SeqCst)
    }

    pub fn ratings(&self) -> Vec<RatingRequest> {
        self.ratings.lock().clone()
    }

    pub fn sample_user() -> UserProfile {
        UserProfile {
            id: UserId::new("user-1"),
            username: "rater".to_string(),
            email: Some("rater@example.test".to_string()),
            gender: Some(Gender::Female),
            created_at: None,
        }
    }
}

#[async_trait]
impl RatingApi for StubApi {
    async fn fetch_block(
        &self,
        gender: Gender,
        count: usize,
    ) -> ApiResult<Block> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        let gate = self.block_gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let scripted = self.scripted_blocks.lock().pop_front();
        match scripted {
            Some(ScriptedBlock::Records(block)) => Ok(block),
            Some(ScriptedBlock::Failure) => Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            None => {
                let start = self.next_record.fetch_add(count, Ordering::SeqCst);
                Ok(fixture_block(gender, start, count))
            }
        }
    }

    async fn fetch_leaderboard(
        &self,
        key: LeaderboardKey,
        limit: usize,
    ) -> ApiResult<Vec<LeaderboardEntry>> {
        self.leaderboard_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_leaderboards.load(Ordering::SeqCst) {
            return Err(ApiError::Unsuccessful("images/leaderboard"));
        }
        let records = self
            .leaderboards
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| fixture_block(key.gender(), 1000, limit));
        Ok(LeaderboardEntry::rank_all(
            records.into_iter().take(limit).collect(),
        ))
    }

    async fn fetch_current_user(&self) -> ApiResult<UserProfile> {
        self.user_requests.fetch_add(1, Ordering::SeqCst);
        self.user.lock().clone().ok_or(ApiError::Unauthorized)
    }

    async fn submit_rating(
        &self,
        winner: &ImageId,
        loser: &ImageId,
    ) -> ApiResult<()> {
        self.ratings.lock().push(RatingRequest {
            winner_id: winner.clone(),
            loser_id: loser.clone(),
        });
        Ok(())
    }
}

/// Scripted [`ImageLoader`] producing 1x1 images.
#[derive(Debug, Default)]
pub struct StubImageLoader {
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<(String, tokio::time::Instant)>>,
    gate: Mutex<Option<(usize, Gate)>>,
    calls: AtomicUsize,
    successes: AtomicUsize,
}

impl StubImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load of `url` fails.
    pub fn fail_url(&self, url: impl Into<String>) {
        self.failing.lock().insert(url.into());
    }

    /// Let the first `passing` loads through immediately and hold the rest
    /// until [`Self::release`].
    pub fn hold_after(&self, passing: usize) {
        *self.gate.lock() = Some((passing, Gate::closed()));
    }

    pub fn release(&self, count: usize) {
        if let Some((_, gate)) = self.gate.lock().as_ref() {
            gate.0.add_permits(count);
        }
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    /// Attempt timestamps (tokio time) for one URL.
    pub fn attempts_for(&self, url: &str) -> Vec<tokio::time::Instant> {
        self.attempts
            .lock()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl ImageLoader for StubImageLoader {
    async fn load(&self, url: &str) -> Result<PreloadedImage, ImageLoadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempts
            .lock()
            .push((url.to_string(), tokio::time::Instant::now()));

        let gate = self
            .gate
            .lock()
            .as_ref()
            .filter(|(passing, _)| call >= *passing)
            .map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            gate.pass().await;
        }

        if self.failing.lock().contains(url) {
            return Err(ImageLoadError::Status(404));
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(PreloadedImage::from_rgba(url, RgbaImage::new(1, 1)))
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
