//! Compiled defaults. [`crate::config::ClientConfig`] overrides most of them.

pub mod supply {
    /// Records per fetched block. Must stay even.
    pub const DEFAULT_BLOCK_SIZE: usize = 10;

    /// A restored queue without a buffer starts fetching once this many pairs
    /// (including the current one) are left in the active block.
    pub const NEAR_EXHAUSTION_PAIRS: usize = 2;

    /// Successful image loads required before the first pair is announced.
    pub const FIRST_PAIR_READY_AFTER: usize = 2;
}

pub mod preload {
    use std::time::Duration;

    /// Attempts per image before giving up.
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Exponential backoff base: `delay = BACKOFF_BASE^attempt * BACKOFF_UNIT`.
    pub const BACKOFF_BASE: u32 = 2;

    pub const BACKOFF_UNIT: Duration = Duration::from_millis(100);

    /// Parallel loads for non-latency-critical bulk preloading.
    pub const BULK_CONCURRENCY: usize = 4;
}

pub mod snapshot {
    use std::time::Duration;

    /// Fixed storage key of the persisted queue snapshot.
    pub const STORAGE_KEY: &str = "swipeduel.queue.snapshot.v1";

    pub const TTL: Duration = Duration::from_secs(60);
}

pub mod cache {
    use std::time::Duration;

    pub const LEADERBOARD_TTL: Duration = Duration::from_secs(10 * 60);

    pub const LEADERBOARD_LIMIT: usize = 20;

    pub const USER_PROFILE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

    /// Delay between orchestrator startup and its first background refresh.
    pub const STARTUP_REFRESH_DELAY: Duration = Duration::from_secs(2);
}

pub mod http {
    use std::time::Duration;

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}
