//! Core data model definitions shared across swipeduel crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod api;
pub mod error;
pub mod gender;
pub mod ids;
pub mod image;
pub mod leaderboard;
pub mod user;

pub use api::{
    BlockResponse, LeaderboardResponse, RatingRequest, RatingResponse,
    UserResponse,
};
pub use error::{ModelError, Result as ModelResult};
pub use gender::Gender;
pub use ids::{ImageId, UserId};
pub use image::{
    BattleStats, Block, ImagePair, ImageRecord, ImageStatus, RatingState,
};
pub use leaderboard::{LeaderboardEntry, LeaderboardKey};
pub use user::UserProfile;
