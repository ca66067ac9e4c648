//! Background refresh scheduling for the auxiliary caches.
//!
//! The orchestrator scans the registered caches for expiry, queues expired
//! domains as pending and refreshes them on a spawned task after a startup
//! delay. While the rating page has priority, scheduled cycles are deferred;
//! they resume as soon as priority is released. Cycles never overlap and each
//! pending domain is refreshed once per cycle that drained it.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheDomain, CacheStatus, ManagedCache},
    infra::clock::Clock,
};

/// Scheduling flags, cloned out by [`CacheOrchestrator::state`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    /// [`CacheOrchestrator::initialize`] already ran.
    pub initialized: bool,
    /// While set, scheduled cycles are deferred.
    pub rating_page_priority: bool,
    /// A refresh cycle is running; no other cycle may start.
    pub background_refresh_in_progress: bool,
    /// Expired domains waiting for the next cycle.
    pub pending: BTreeSet<CacheDomain>,
    /// Completion time of the last cycle.
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Per-domain result of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// One entry per refreshed domain; errors are rendered to strings.
    pub outcomes: Vec<(CacheDomain, Result<(), String>)>,
    /// Another cycle was running; nothing was refreshed.
    pub skipped: bool,
}

impl RefreshReport {
    pub fn succeeded(&self) -> Vec<CacheDomain> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(domain, _)| *domain)
            .collect()
    }

    pub fn failed(&self) -> Vec<CacheDomain> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(domain, _)| *domain)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.outcomes.iter().all(|(_, result)| result.is_ok())
    }

    fn skipped() -> Self {
        Self {
            outcomes: Vec::new(),
            skipped: true,
        }
    }
}

#[derive(Debug)]
struct OrchestratorInner {
    caches: Vec<Arc<dyn ManagedCache>>,
    clock: Arc<dyn Clock>,
    startup_delay: Duration,
    state: Mutex<OrchestratorState>,
}

/// Cheaply clonable handle; clones drive the same schedule.
#[derive(Debug, Clone)]
pub struct CacheOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl CacheOrchestrator {
    pub fn new(
        caches: Vec<Arc<dyn ManagedCache>>,
        clock: Arc<dyn Clock>,
        startup_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                caches,
                clock,
                startup_delay,
                state: Mutex::new(OrchestratorState::default()),
            }),
        }
    }

    /// Scan for expired domains and schedule a delayed background refresh if
    /// any are found. Later calls are no-ops.
    pub fn initialize(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.initialized {
                return;
            }
            state.initialized = true;
        }

        let expired = self.expired_domains();
        if expired.is_empty() {
            debug!("all caches fresh; nothing to refresh");
            return;
        }

        info!(
            domains = ?expired,
            delay_ms = self.inner.startup_delay.as_millis() as u64,
            "scheduling background cache refresh"
        );
        self.inner.state.lock().pending.extend(expired);
        self.schedule(self.inner.startup_delay);
    }

    /// While enabled, scheduled refreshes wait. Disabling runs anything that
    /// was deferred.
    pub fn set_rating_page_priority(&self, enabled: bool) {
        let run_deferred = {
            let mut state = self.inner.state.lock();
            state.rating_page_priority = enabled;
            !enabled && !state.pending.is_empty()
        };
        debug!(enabled, "rating page priority changed");
        if run_deferred {
            self.schedule(Duration::ZERO);
        }
    }

    /// The rating view showed its first pair: pick up anything that expired
    /// meanwhile and let background work proceed.
    pub fn on_first_pair_displayed(&self) {
        let expired = self.expired_domains();
        if !expired.is_empty() {
            self.inner.state.lock().pending.extend(expired);
        }
        self.set_rating_page_priority(false);
    }

    /// Run one cycle over the pending set. Returns `None` when the cycle was
    /// deferred, already running or had nothing to do.
    pub async fn run_pending_refresh(&self) -> Option<RefreshReport> {
        let domains: Vec<CacheDomain> = {
            let mut state = self.inner.state.lock();
            if state.rating_page_priority {
                debug!("rating page has priority; deferring cache refresh");
                return None;
            }
            if state.background_refresh_in_progress || state.pending.is_empty() {
                return None;
            }
            state.background_refresh_in_progress = true;
            std::mem::take(&mut state.pending).into_iter().collect()
        };

        let report = self.refresh_domains(&domains).await;
        self.finish_cycle();
        Some(report)
    }

    /// Refresh the given domains now, as one cycle. Every domain is attempted;
    /// failures are logged and reported, never propagated. Returns a skipped
    /// report when another cycle is already running.
    pub async fn refresh_caches(&self, domains: &[CacheDomain]) -> RefreshReport {
        {
            let mut state = self.inner.state.lock();
            if state.background_refresh_in_progress {
                debug!("cache refresh already running; skipping");
                return RefreshReport::skipped();
            }
            state.background_refresh_in_progress = true;
            state.pending.retain(|domain| !domains.contains(domain));
        }

        let report = self.refresh_domains(domains).await;
        self.finish_cycle();
        report
    }

    fn finish_cycle(&self) {
        let reschedule = {
            let mut state = self.inner.state.lock();
            state.background_refresh_in_progress = false;
            state.last_refresh = Some(self.inner.clock.now());
            !state.pending.is_empty() && !state.rating_page_priority
        };
        if reschedule {
            self.schedule(Duration::ZERO);
        }
    }

    /// Concurrent fan-out. Callers hold the in-progress flag.
    async fn refresh_domains(&self, domains: &[CacheDomain]) -> RefreshReport {
        let targets: Vec<&Arc<dyn ManagedCache>> = self
            .inner
            .caches
            .iter()
            .filter(|cache| domains.contains(&cache.domain()))
            .collect();

        let results = join_all(targets.iter().map(|cache| cache.refresh())).await;

        let mut report = RefreshReport::default();
        for (cache, result) in targets.iter().zip(results) {
            let domain = cache.domain();
            match result {
                Ok(()) => {
                    debug!(%domain, "cache refreshed");
                    report.outcomes.push((domain, Ok(())));
                }
                Err(err) => {
                    warn!(%domain, error = %err, "cache refresh failed");
                    report.outcomes.push((domain, Err(err.to_string())));
                }
            }
        }
        info!(
            refreshed = report.succeeded().len(),
            failed = report.failed().len(),
            "cache refresh cycle finished"
        );
        report
    }

    pub async fn clear_all_caches(&self) {
        join_all(self.inner.caches.iter().map(|cache| cache.clear())).await;
        info!(caches = self.inner.caches.len(), "auxiliary caches cleared");
    }

    pub fn cache_status(&self) -> Vec<CacheStatus> {
        self.inner.caches.iter().map(|cache| cache.status()).collect()
    }

    pub fn state(&self) -> OrchestratorState {
        self.inner.state.lock().clone()
    }

    fn expired_domains(&self) -> Vec<CacheDomain> {
        self.inner
            .caches
            .iter()
            .filter(|cache| cache.is_expired())
            .map(|cache| cache.domain())
            .collect()
    }

    fn schedule(&self, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; cache refresh not scheduled");
            return;
        };
        let orchestrator = self.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            orchestrator.run_pending_refresh().await;
        });
    }
}
