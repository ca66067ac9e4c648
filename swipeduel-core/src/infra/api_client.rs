use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use swipeduel_model::{
    Block, BlockResponse, Gender, ImageId, LeaderboardEntry, LeaderboardKey,
    LeaderboardResponse, RatingRequest, RatingResponse, UserProfile,
    UserResponse,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::infra::api::{ApiError, ApiResult, RatingApi};

/// HTTP client for the rating backend with optional bearer authentication.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token_store: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field(
                "has_token",
                &self
                    .token_store
                    .try_read()
                    .map(|t| t.is_some())
                    .unwrap_or(false),
            )
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Setup(err.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(base_url = %base_url, "creating API client");

        Ok(Self {
            client,
            base_url,
            token_store: Arc::new(RwLock::new(None)),
        })
    }

    /// Underlying HTTP client, shared with the image loader.
    pub fn http(&self) -> Client {
        self.client.clone()
    }

    /// Build an absolute URL for an API path.
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let p = path.as_ref();
        if p.starts_with("http://") || p.starts_with("https://") {
            return p.to_string();
        }
        format!("{}/{}", self.base_url, p.trim_start_matches('/'))
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token_store.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token_store.read().await.is_some()
    }

    async fn build_request(&self, builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.token_store.read().await.as_ref() {
            builder.bearer_auth(token)
        } else {
            builder
        }
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> ApiResult<T> {
        let response = self.build_request(request).await.send().await?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                serde_json::from_slice(&bytes)
                    .map_err(|err| ApiError::InvalidResponse(err.to_string()))
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(ApiError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl RatingApi for ApiClient {
    async fn fetch_block(
        &self,
        gender: Gender,
        count: usize,
    ) -> ApiResult<Block> {
        let count = count.to_string();
        let request = self
            .client
            .get(self.build_url("images/block"))
            .query(&[("gender", gender.as_str()), ("count", count.as_str())]);

        let response: BlockResponse = self.execute_json(request).await?;
        if !response.success {
            return Err(ApiError::Unsuccessful("images/block"));
        }
        debug!(%gender, count = response.images.len(), "fetched image block");
        Ok(response.images)
    }

    async fn fetch_leaderboard(
        &self,
        key: LeaderboardKey,
        limit: usize,
    ) -> ApiResult<Vec<LeaderboardEntry>> {
        let limit = limit.to_string();
        let request = self
            .client
            .get(self.build_url("images/leaderboard"))
            .query(&[
                ("gender", key.gender().as_str()),
                ("limit", limit.as_str()),
            ]);

        let response: LeaderboardResponse = self.execute_json(request).await?;
        if !response.success {
            return Err(ApiError::Unsuccessful("images/leaderboard"));
        }
        Ok(LeaderboardEntry::rank_all(response.images))
    }

    async fn fetch_current_user(&self) -> ApiResult<UserProfile> {
        if !self.has_token().await {
            return Err(ApiError::Unauthorized);
        }
        let request = self.client.get(self.build_url("users/me"));
        let response: UserResponse = self.execute_json(request).await?;
        match response {
            UserResponse {
                success: true,
                user: Some(user),
            } => Ok(user),
            _ => Err(ApiError::Unsuccessful("users/me")),
        }
    }

    async fn submit_rating(
        &self,
        winner: &ImageId,
        loser: &ImageId,
    ) -> ApiResult<()> {
        let body = RatingRequest {
            winner_id: winner.clone(),
            loser_id: loser.clone(),
        };
        let request = self.client.post(self.build_url("ratings")).json(&body);
        let response: RatingResponse = self.execute_json(request).await?;
        if response.success {
            Ok(())
        } else {
            Err(ApiError::Unsuccessful("ratings"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_relative_paths() {
        let client =
            ApiClient::new("https://rate.example/api/", Duration::from_secs(5))
                .expect("client builds");
        assert_eq!(
            client.build_url("/images/block"),
            "https://rate.example/api/images/block"
        );
        assert_eq!(
            client.build_url("https://cdn.example/a.jpg"),
            "https://cdn.example/a.jpg"
        );
    }

    #[tokio::test]
    async fn current_user_requires_token() {
        let client =
            ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1))
                .expect("client builds");
        assert!(matches!(
            client.fetch_current_user().await,
            Err(ApiError::Unauthorized)
        ));
    }
}
