//! Single-entry cache of the signed-in user's profile.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use swipeduel_model::UserProfile;
use tracing::debug;

use crate::{
    cache::{CacheDomain, CacheEntry, CacheError, CachePolicy, ManagedCache},
    infra::{
        api::{ApiError, RatingApi},
        clock::Clock,
    },
};

#[derive(Debug)]
pub struct UserCache {
    api: Arc<dyn RatingApi>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    entry: Mutex<Option<CacheEntry<UserProfile>>>,
}

impl UserCache {
    pub fn new(
        api: Arc<dyn RatingApi>,
        clock: Arc<dyn Clock>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            api,
            clock,
            policy,
            entry: Mutex::new(None),
        }
    }

    /// Cached profile while it is within the TTL.
    pub fn get(&self) -> Option<UserProfile> {
        let now = self.clock.now();
        self.entry
            .lock()
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.policy.ttl))
            .map(|entry| entry.payload.clone())
    }

    pub fn set(&self, profile: UserProfile) {
        *self.entry.lock() = Some(CacheEntry::new(profile, self.clock.now()));
    }

    /// Fetch the current user and store it.
    pub async fn refresh_profile(&self) -> Result<UserProfile, CacheError> {
        let profile = self
            .api
            .fetch_current_user()
            .await
            .map_err(|err| match err {
                ApiError::Unauthorized => CacheError::Unauthenticated,
                other => CacheError::Api(other),
            })?;
        debug!(user = %profile.id, "user profile refreshed");
        self.set(profile.clone());
        Ok(profile)
    }

    pub fn clear_entry(&self) {
        *self.entry.lock() = None;
    }
}

#[async_trait]
impl ManagedCache for UserCache {
    fn domain(&self) -> CacheDomain {
        CacheDomain::UserProfile
    }

    fn is_expired(&self) -> bool {
        self.get().is_none()
    }

    fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.entry.lock().as_ref().map(|entry| entry.age(now))
    }

    async fn refresh(&self) -> Result<(), CacheError> {
        self.refresh_profile().await.map(|_| ())
    }

    async fn clear(&self) {
        self.clear_entry();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::cache,
        infra::testing::{ManualClock, StubApi},
    };

    fn user_cache(api: Arc<StubApi>, clock: &ManualClock) -> UserCache {
        UserCache::new(
            api,
            Arc::new(clock.clone()),
            CachePolicy {
                ttl: cache::USER_PROFILE_TTL,
            },
        )
    }

    #[tokio::test]
    async fn refresh_then_expire() {
        let api = Arc::new(StubApi::new());
        api.set_user(Some(StubApi::sample_user()));
        let clock = ManualClock::default();
        let cache = user_cache(api.clone(), &clock);

        assert!(cache.is_expired());
        let profile = cache.refresh_profile().await.unwrap();
        assert_eq!(profile.username, "rater");
        assert_eq!(cache.get(), Some(profile));

        clock.advance(Duration::from_secs(2 * 60 * 60));
        assert!(cache.is_expired());
        assert_eq!(cache.age(), Some(Duration::from_secs(7200)));
        assert_eq!(api.user_requests(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_refresh_is_an_error() {
        let api = Arc::new(StubApi::new());
        let clock = ManualClock::default();
        let cache = user_cache(api, &clock);

        let err = cache.refresh_profile().await.unwrap_err();
        assert!(matches!(err, CacheError::Unauthenticated));
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn clear_drops_entry() {
        let api = Arc::new(StubApi::new());
        let clock = ManualClock::default();
        let cache = user_cache(api, &clock);
        cache.set(StubApi::sample_user());
        assert!(!cache.is_expired());

        ManagedCache::clear(&cache).await;
        assert!(cache.get().is_none());
        assert_eq!(cache.age(), None);
    }
}
