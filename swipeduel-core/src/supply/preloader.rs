use futures::{StreamExt, stream};
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    constants::preload,
    infra::image_loader::{ImageLoader, PreloadedImage},
};

/// Bounded retry with exponential backoff for a single image load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per image, the first included.
    pub max_attempts: u32,
    /// Growth factor between successive delays.
    pub backoff_base: u32,
    /// Delay after the first failed attempt.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: preload::MAX_ATTEMPTS,
            backoff_base: preload::BACKOFF_BASE,
            backoff_unit: preload::BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the failed 0-based `attempt`:
    /// `backoff_base^attempt * backoff_unit`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }
}

/// Result of preloading one URL. Failure is a value, never an error.
#[derive(Debug, Clone)]
pub enum PreloadOutcome {
    Loaded(PreloadedImage),
    Failed {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl PreloadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Loaded(image) => image.url(),
            Self::Failed { url, .. } => url,
        }
    }

    pub fn into_image(self) -> Option<PreloadedImage> {
        match self {
            Self::Loaded(image) => Some(image),
            Self::Failed { .. } => None,
        }
    }
}

/// Handle to a sequential preload running in the background.
///
/// The task keeps loading after the first pair is announced; dropping the
/// handle detaches it.
#[derive(Debug)]
pub struct ProgressivePreload {
    ready: Option<oneshot::Receiver<usize>>,
    handle: JoinHandle<usize>,
}

impl ProgressivePreload {
    /// Wait until the first pair is ready (or the walk ended without it).
    /// Returns the number of successful loads at that point.
    pub async fn first_pair_ready(&mut self) -> usize {
        match self.ready.take() {
            Some(ready) => ready.await.unwrap_or(0),
            None => 0,
        }
    }

    /// Wait for the whole walk. Returns the number of successful loads.
    pub async fn finished(self) -> usize {
        self.handle.await.unwrap_or(0)
    }
}

/// Loads image resources with retry. Never fails: outcomes carry the result.
#[derive(Debug, Clone)]
pub struct Preloader {
    loader: Arc<dyn ImageLoader>,
    policy: RetryPolicy,
}

impl Preloader {
    pub fn new(loader: Arc<dyn ImageLoader>, policy: RetryPolicy) -> Self {
        Self { loader, policy }
    }

    /// Preload with the configured attempt budget.
    pub async fn preload(&self, url: &str) -> PreloadOutcome {
        self.preload_with_retry(url, self.policy.max_attempts).await
    }

    pub async fn preload_with_retry(
        &self,
        url: &str,
        max_attempts: u32,
    ) -> PreloadOutcome {
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.loader.load(url).await {
                Ok(image) => {
                    if attempt > 0 {
                        debug!(url, attempt = attempt + 1, "image loaded after retry");
                    }
                    return PreloadOutcome::Loaded(image);
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        debug!(
                            url,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "image load failed; backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(
            url,
            attempts = max_attempts,
            error = %last_error,
            "image preload exhausted retries"
        );
        PreloadOutcome::Failed {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        }
    }

    /// Preload many URLs with at most `concurrency` loads in flight.
    /// Outcomes arrive in completion order.
    pub async fn preload_all(
        &self,
        urls: Vec<String>,
        concurrency: usize,
    ) -> Vec<PreloadOutcome> {
        stream::iter(urls)
            .map(|url| async move { self.preload(&url).await })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Walk `urls` one at a time on a background task, handing each outcome
    /// to `on_outcome`. The returned handle signals once `ready_after` loads
    /// have succeeded, without waiting for the rest of the walk.
    pub fn spawn_sequential<F>(
        &self,
        urls: Vec<String>,
        ready_after: usize,
        mut on_outcome: F,
    ) -> ProgressivePreload
    where
        F: FnMut(PreloadOutcome) + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let preloader = self.clone();

        let handle = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut loaded = 0usize;

            for url in urls {
                let outcome = preloader.preload(&url).await;
                if outcome.is_loaded() {
                    loaded += 1;
                }
                on_outcome(outcome);

                if loaded >= ready_after
                    && let Some(tx) = ready_tx.take()
                {
                    let _ = tx.send(loaded);
                }
            }

            // Walk ended short of the threshold: release the waiter anyway.
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(loaded);
            }
            loaded
        });

        ProgressivePreload {
            ready: Some(ready_rx),
            handle,
        }
    }
}
