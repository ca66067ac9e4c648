use std::{sync::Arc, time::Duration};
use swipeduel_core::{
    CacheDomain, ClientConfig, MemoryStore, ServiceRegistry,
    infra::testing::{ManualClock, StubApi, StubImageLoader},
};
use swipeduel_model::{Gender, LeaderboardKey};

struct Harness {
    api: Arc<StubApi>,
    loader: Arc<StubImageLoader>,
    clock: ManualClock,
    services: ServiceRegistry,
}

fn harness() -> Harness {
    let api = Arc::new(StubApi::new());
    let loader = Arc::new(StubImageLoader::new());
    let clock = ManualClock::default();
    let services = ServiceRegistry::assemble(
        &ClientConfig::default(),
        api.clone(),
        loader.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
    );
    Harness {
        api,
        loader,
        clock,
        services,
    }
}

#[tokio::test(start_paused = true)]
async fn fresh_caches_issue_no_refresh() {
    let h = harness();
    h.api.set_user(Some(StubApi::sample_user()));
    h.services.leaderboards.refresh_all().await.unwrap();
    h.services.user.refresh_profile().await.unwrap();
    let requests = (h.api.leaderboard_requests(), h.api.user_requests());

    h.services.orchestrator.initialize();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!h.services.orchestrator.state().background_refresh_in_progress);
    assert_eq!(
        (h.api.leaderboard_requests(), h.api.user_requests()),
        requests
    );
}

#[tokio::test(start_paused = true)]
async fn startup_refresh_fills_expired_caches() {
    let h = harness();
    h.api.set_user(Some(StubApi::sample_user()));
    let orchestrator = &h.services.orchestrator;

    orchestrator.initialize();
    assert_eq!(orchestrator.state().pending.len(), 2);
    assert_eq!(h.api.leaderboard_requests(), 0);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(h.api.leaderboard_requests(), 2);
    assert_eq!(h.api.user_requests(), 1);

    let male = h.services.leaderboards.get(LeaderboardKey(Gender::Male));
    assert_eq!(male.map(|entries| entries.len()), Some(20));
    assert!(h.services.user.get().is_some());
    assert!(orchestrator.cache_status().iter().all(|s| !s.expired));
}

#[tokio::test(start_paused = true)]
async fn rating_page_priority_holds_refresh_until_first_pair() {
    let h = harness();
    let orchestrator = &h.services.orchestrator;

    orchestrator.set_rating_page_priority(true);
    orchestrator.initialize();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.api.leaderboard_requests(), 0);

    h.services
        .queue
        .initialize(Gender::Female, None)
        .await
        .unwrap();
    orchestrator.on_first_pair_displayed();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.api.leaderboard_requests(), 2);
    assert!(!orchestrator.state().rating_page_priority);
}

#[tokio::test]
async fn unauthenticated_profile_does_not_block_leaderboards() {
    let h = harness();
    let report = h
        .services
        .orchestrator
        .refresh_caches(&CacheDomain::ALL)
        .await;

    assert_eq!(report.succeeded(), vec![CacheDomain::Leaderboard]);
    assert_eq!(report.failed(), vec![CacheDomain::UserProfile]);
    assert!(h.services.leaderboards.get(LeaderboardKey(Gender::Female)).is_some());
}

#[tokio::test]
async fn expiry_rescan_after_ttl() {
    let h = harness();
    h.api.set_user(Some(StubApi::sample_user()));
    h.services
        .orchestrator
        .refresh_caches(&CacheDomain::ALL)
        .await;

    h.clock.advance(Duration::from_secs(10 * 60));
    let status = h.services.orchestrator.cache_status();
    let board = status
        .iter()
        .find(|s| s.domain == CacheDomain::Leaderboard)
        .unwrap();
    let user = status
        .iter()
        .find(|s| s.domain == CacheDomain::UserProfile)
        .unwrap();
    assert!(board.expired);
    assert!(!user.expired);
    assert_eq!(user.age, Some(Duration::from_secs(600)));

    h.services.orchestrator.clear_all_caches().await;
    assert!(h.services.user.get().is_none());
}

#[tokio::test(start_paused = true)]
async fn direct_refresh_does_not_overlap_a_running_cycle() {
    let h = harness();
    h.api.set_user(Some(StubApi::sample_user()));
    h.loader.hold_after(0);
    let orchestrator = &h.services.orchestrator;

    orchestrator.initialize();
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(orchestrator.state().background_refresh_in_progress);
    assert_eq!(h.api.leaderboard_requests(), 2);

    let report = orchestrator.refresh_caches(&CacheDomain::ALL).await;
    assert!(report.skipped);
    assert!(report.outcomes.is_empty());
    assert!(!report.is_clean());
    assert_eq!(h.api.leaderboard_requests(), 2);
    assert_eq!(h.api.user_requests(), 1);

    h.loader.release(1_000);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!orchestrator.state().background_refresh_in_progress);

    let report = orchestrator.refresh_caches(&CacheDomain::ALL).await;
    assert!(report.is_clean());
    assert_eq!(h.api.leaderboard_requests(), 4);
    assert_eq!(h.api.user_requests(), 2);
    assert!(!orchestrator.state().background_refresh_in_progress);
}
