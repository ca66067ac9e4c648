//! Media supply and cache orchestration for the swipeduel rating client.
//!
//! The crate keeps a stream of image pairs ready for a swipe-based rating
//! view: a double-buffered block queue with progressive preloading, a short
//! lived persisted snapshot for instant resume, and a cache orchestrator that
//! refreshes auxiliary caches (leaderboard, user profile) in the background
//! without competing with the rating path.
//!
//! Notes
//! - Everything is explicitly owned: build one [`ServiceRegistry`] at startup
//!   and hand out clones of the handles it contains.
//! - All network and storage I/O is async and expects a tokio runtime.
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod constants;
pub mod infra;
pub mod service_registry;
pub mod supply;

pub use cache::{
    CacheDomain, CacheError, leaderboard::LeaderboardCache,
    orchestrator::CacheOrchestrator, user::UserCache,
};
pub use config::{ClientConfig, ConfigSource};
pub use infra::{
    api::{ApiError, ApiResult, RatingApi},
    api_client::ApiClient,
    clock::{Clock, SystemClock},
    image_loader::{HttpImageLoader, ImageLoadError, ImageLoader, PreloadedImage},
    storage::{FileStore, KeyValueStore, MemoryStore, StoreError},
};
pub use service_registry::ServiceRegistry;
pub use supply::{
    fetcher::BlockFetcher,
    preloader::{PreloadOutcome, Preloader, RetryPolicy},
    queue::{FirstPairCallback, ImageSupplyQueue, QueueError, QueueStats},
    snapshot::{QueueSnapshot, SnapshotCache},
};
