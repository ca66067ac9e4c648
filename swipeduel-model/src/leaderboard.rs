use std::fmt;

use crate::{gender::Gender, image::ImageRecord};

/// Identity of one leaderboard (a demographic partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LeaderboardKey(pub Gender);

impl LeaderboardKey {
    /// One key per gender partition.
    pub fn all() -> Vec<Self> {
        Gender::ALL.into_iter().map(Self).collect()
    }

    pub fn gender(self) -> Gender {
        self.0
    }
}

impl From<Gender> for LeaderboardKey {
    fn from(gender: Gender) -> Self {
        Self(gender)
    }
}

impl fmt::Display for LeaderboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaderboard:{}", self.0)
    }
}

/// Ranked position of an image on a leaderboard.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: u32,
    pub image: ImageRecord,
}

impl LeaderboardEntry {
    /// Rank records in the order the backend returned them (best first).
    pub fn rank_all(records: Vec<ImageRecord>) -> Vec<Self> {
        records
            .into_iter()
            .zip(1u32..)
            .map(|(image, rank)| Self { rank, image })
            .collect()
    }
}
