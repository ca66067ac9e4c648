//! Explicitly owned bundle of the client services.
//!
//! Build one registry at startup and pass clones of its handles to whoever
//! needs them. There is no process-wide instance.

use anyhow::Context;
use std::sync::Arc;

use crate::{
    cache::{
        ManagedCache, leaderboard::LeaderboardCache,
        orchestrator::CacheOrchestrator, user::UserCache,
    },
    config::ClientConfig,
    infra::{
        api::RatingApi,
        api_client::ApiClient,
        clock::{Clock, SystemClock},
        image_loader::{HttpImageLoader, ImageLoader},
        storage::{FileStore, KeyValueStore},
    },
    supply::{
        fetcher::BlockFetcher, preloader::Preloader, queue::ImageSupplyQueue,
        snapshot::SnapshotCache,
    },
};

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    pub api: Arc<dyn RatingApi>,
    pub queue: ImageSupplyQueue,
    pub leaderboards: Arc<LeaderboardCache>,
    pub user: Arc<UserCache>,
    pub orchestrator: CacheOrchestrator,
    pub snapshots: SnapshotCache,
}

impl ServiceRegistry {
    /// Wire production services: reqwest API client, HTTP image loader,
    /// file-backed snapshot store and the system clock.
    pub async fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = ApiClient::new(&config.server_url, config.request_timeout)
            .context("failed to build API client")?;
        client.set_token(config.auth_token.clone()).await;

        let loader = Arc::new(HttpImageLoader::new(client.http()));
        let store = match &config.storage_dir {
            Some(dir) => FileStore::new(dir),
            None => FileStore::try_default()
                .context("failed to resolve snapshot directory")?,
        };

        Ok(Self::assemble(
            config,
            Arc::new(client),
            loader,
            Arc::new(store),
            Arc::new(SystemClock),
        ))
    }

    /// Wire the services over arbitrary collaborators.
    pub fn assemble(
        config: &ClientConfig,
        api: Arc<dyn RatingApi>,
        loader: Arc<dyn ImageLoader>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policies = config.cache_policies();
        let preloader = Preloader::new(loader, config.retry_policy());

        let snapshots =
            SnapshotCache::new(store, clock.clone(), config.snapshot_ttl);
        let queue = ImageSupplyQueue::new(
            BlockFetcher::new(api.clone(), config.block_size),
            preloader.clone(),
            Some(snapshots.clone()),
        );

        let leaderboards = Arc::new(LeaderboardCache::new(
            api.clone(),
            preloader,
            clock.clone(),
            policies.leaderboard,
        ));
        let user = Arc::new(UserCache::new(
            api.clone(),
            clock.clone(),
            policies.user_profile,
        ));
        let orchestrator = CacheOrchestrator::new(
            vec![
                leaderboards.clone() as Arc<dyn ManagedCache>,
                user.clone() as Arc<dyn ManagedCache>,
            ],
            clock,
            config.startup_refresh_delay,
        );

        Self {
            api,
            queue,
            leaderboards,
            user,
            orchestrator,
            snapshots,
        }
    }
}
