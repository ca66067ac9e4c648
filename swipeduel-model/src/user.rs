use chrono::{DateTime, Utc};

use crate::{gender::Gender, ids::UserId};

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UserProfile {
    #[cfg_attr(feature = "serde", serde(alias = "_id"))]
    pub id: UserId,
    pub username: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub email: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub gender: Option<Gender>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: Option<DateTime<Utc>>,
}
