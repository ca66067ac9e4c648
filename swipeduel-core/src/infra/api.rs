//! API service trait for the rating backend.
//!
//! The supply queue and the auxiliary caches only talk to the backend through
//! [`RatingApi`], so tests can swap in scripted implementations.

use async_trait::async_trait;
use std::fmt::Debug;
use swipeduel_model::{
    Block, Gender, ImageId, LeaderboardEntry, LeaderboardKey, UserProfile,
};
use thiserror::Error;

/// Errors returned by [`RatingApi`] implementations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS or timeout failure.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response other than 401.
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },

    /// 401, or an authenticated endpoint called without a token.
    #[error("Unauthorized - please login again")]
    Unauthorized,

    /// 2xx response carrying `success: false` for the named endpoint.
    #[error("Server reported failure for {0}")]
    Unsuccessful(&'static str),

    /// Body did not match the expected envelope.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("Client setup failed: {0}")]
    Setup(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait RatingApi: Send + Sync + Debug {
    /// Fetch `count` image records for the given gender filter.
    async fn fetch_block(&self, gender: Gender, count: usize)
    -> ApiResult<Block>;

    /// Fetch the ranked leaderboard for `key`, best first.
    async fn fetch_leaderboard(
        &self,
        key: LeaderboardKey,
        limit: usize,
    ) -> ApiResult<Vec<LeaderboardEntry>>;

    /// Fetch the signed-in user's profile.
    async fn fetch_current_user(&self) -> ApiResult<UserProfile>;

    /// Record a vote. Rating maths happens server-side.
    async fn submit_rating(
        &self,
        winner: &ImageId,
        loser: &ImageId,
    ) -> ApiResult<()>;
}
