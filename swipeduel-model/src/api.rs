//! Request and response envelopes exchanged with the rating backend.

use crate::{ids::ImageId, image::ImageRecord, user::UserProfile};

/// `GET /images/block` response.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockResponse {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub images: Vec<ImageRecord>,
}

/// `GET /images/leaderboard` response, best first.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeaderboardResponse {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub images: Vec<ImageRecord>,
}

/// `GET /users/me` response.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserResponse {
    pub success: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub user: Option<UserProfile>,
}

/// `POST /ratings` body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RatingRequest {
    pub winner_id: ImageId,
    pub loser_id: ImageId,
}

/// `POST /ratings` response.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingResponse {
    pub success: bool,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn rating_request_uses_camel_case() {
        let body = RatingRequest {
            winner_id: ImageId::new("a"),
            loser_id: ImageId::new("b"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"winnerId": "a", "loserId": "b"}));
    }

    #[test]
    fn failed_block_response_may_omit_images() {
        let parsed: BlockResponse =
            serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!parsed.success);
        assert!(parsed.images.is_empty());
    }
}
