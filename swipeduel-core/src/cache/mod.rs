//! Auxiliary TTL caches and the orchestrator that refreshes them in the
//! background.
//!
//! Each cache domain implements [`ManagedCache`] so the orchestrator can scan
//! expiry and refresh domains uniformly. Policies (TTL, keys, eager image
//! preload) come from a [`CachePolicyTable`].

pub mod leaderboard;
pub mod orchestrator;
pub mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt, time::Duration};
use swipeduel_model::LeaderboardKey;
use thiserror::Error;

use crate::{
    constants::{cache, preload},
    infra::api::ApiError,
};

/// Identifies one auxiliary cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheDomain {
    Leaderboard,
    UserProfile,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 2] =
        [CacheDomain::Leaderboard, CacheDomain::UserProfile];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheDomain::Leaderboard => "leaderboard",
            CacheDomain::UserProfile => "user_profile",
        }
    }
}

impl fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refresh failures of an auxiliary cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend request failed.
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    /// The domain needs a signed-in user.
    #[error("Not signed in")]
    Unauthenticated,

    /// Some keys of a keyed cache failed; the rest were refreshed.
    #[error("{failed} of {total} keys failed to refresh")]
    Partial {
        /// Keys that failed.
        failed: usize,
        /// Keys attempted.
        total: usize,
    },
}

/// Stored payload with the instant it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, stored_at: DateTime<Utc>) -> Self {
        Self { payload, stored_at }
    }

    /// Age at `now`. Entries stamped in the future count as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// TTL policy for a single-entry domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardPolicy {
    pub ttl: Duration,
    /// Keys that must all be fresh for the domain to count as unexpired.
    pub keys: Vec<LeaderboardKey>,
    /// Entries only count as hits once their images are decoded.
    pub preload_images: bool,
    pub limit: usize,
    pub preload_concurrency: usize,
}

impl Default for LeaderboardPolicy {
    fn default() -> Self {
        Self {
            ttl: cache::LEADERBOARD_TTL,
            keys: LeaderboardKey::all(),
            preload_images: true,
            limit: cache::LEADERBOARD_LIMIT,
            preload_concurrency: preload::BULK_CONCURRENCY,
        }
    }
}

/// Per-domain policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicyTable {
    pub leaderboard: LeaderboardPolicy,
    pub user_profile: CachePolicy,
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self {
            leaderboard: LeaderboardPolicy::default(),
            user_profile: CachePolicy {
                ttl: cache::USER_PROFILE_TTL,
            },
        }
    }
}

/// Expiry and age of one domain, as reported by
/// [`orchestrator::CacheOrchestrator::cache_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatus {
    pub domain: CacheDomain,
    pub expired: bool,
    /// Age of the oldest entry, `None` when nothing is cached.
    pub age: Option<Duration>,
}

/// A cache the orchestrator can scan and refresh.
#[async_trait]
pub trait ManagedCache: Send + Sync + fmt::Debug {
    fn domain(&self) -> CacheDomain;

    fn is_expired(&self) -> bool;

    fn age(&self) -> Option<Duration>;

    async fn refresh(&self) -> Result<(), CacheError>;

    async fn clear(&self);

    fn status(&self) -> CacheStatus {
        CacheStatus {
            domain: self.domain(),
            expired: self.is_expired(),
            age: self.age(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_age_and_freshness() {
        let stored = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry::new((), stored);

        let later = stored + chrono::Duration::seconds(599);
        assert_eq!(entry.age(later), Duration::from_secs(599));
        assert!(entry.is_fresh(later, cache::LEADERBOARD_TTL));

        let expired = stored + chrono::Duration::seconds(600);
        assert!(!entry.is_fresh(expired, cache::LEADERBOARD_TTL));

        let earlier = stored - chrono::Duration::seconds(5);
        assert_eq!(entry.age(earlier), Duration::ZERO);
    }

    #[test]
    fn default_policies_cover_both_genders() {
        let table = CachePolicyTable::default();
        assert_eq!(table.leaderboard.keys.len(), 2);
        assert!(table.leaderboard.preload_images);
        assert_eq!(table.user_profile.ttl, Duration::from_secs(7200));
    }
}
