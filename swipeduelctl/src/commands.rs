use std::time::Duration;

use anyhow::Context;
use swipeduel_core::{
    CacheDomain, ClientConfig, FirstPairCallback, RatingApi, ServiceRegistry,
};
use swipeduel_model::{Gender, ImagePair};
use tracing::{info, warn};

/// Polls while the queue waits for its next block.
const EXHAUSTED_POLL: Duration = Duration::from_millis(250);
const EXHAUSTED_POLL_LIMIT: usize = 40;

pub async fn swipe(
    config: &ClientConfig,
    gender: Gender,
    pairs: usize,
    vote: bool,
) -> anyhow::Result<()> {
    let services = ServiceRegistry::from_config(config).await?;
    let orchestrator = services.orchestrator.clone();
    let queue = services.queue.clone();

    orchestrator.set_rating_page_priority(true);
    orchestrator.initialize();

    let on_ready: FirstPairCallback = Box::new(|pair| {
        info!(first = %pair.first.id, second = %pair.second.id, "first pair ready");
    });
    queue
        .initialize(gender, Some(on_ready))
        .await
        .with_context(|| format!("failed to initialize {gender} queue"))?;
    orchestrator.on_first_pair_displayed();

    let mut current = queue.get_current_pair();
    let mut walked = 0usize;
    while walked < pairs {
        let Some(pair) = current.take() else {
            break;
        };
        walked += 1;
        print_pair(walked, &pair, queue.preloaded_image(&pair.first.url).is_some());

        let [winner, loser] = pair.ids();
        if vote
            && let Err(err) = services.api.submit_rating(winner, loser).await
        {
            warn!(error = %err, "rating submission failed");
        }

        if walked < pairs {
            current = next_pair(&services).await;
        }
    }

    if walked < pairs {
        warn!(walked, requested = pairs, "queue ran dry");
    }

    let stats = queue.stats();
    info!(
        rotations = stats.rotations,
        fetches = stats.fetches_issued,
        preloaded = stats.preloaded,
        resident = %format_bytes(stats.resident_bytes),
        "swipe session finished"
    );

    if queue.save_queue_to_cache().await {
        info!("queue snapshot saved");
    }
    Ok(())
}

pub async fn status(config: &ClientConfig, refresh: bool) -> anyhow::Result<()> {
    let services = ServiceRegistry::from_config(config).await?;
    let orchestrator = &services.orchestrator;

    if refresh {
        let report = orchestrator.refresh_caches(&CacheDomain::ALL).await;
        if report.skipped {
            println!("refresh skipped: another cycle is running");
        }
        for (domain, result) in &report.outcomes {
            if let Err(err) = result {
                println!("{domain:<14} refresh failed: {err}");
            }
        }
    }

    for status in orchestrator.cache_status() {
        let age = status
            .age
            .map(|age| {
                humantime::format_duration(Duration::from_secs(age.as_secs()))
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        let state = if status.expired { "expired" } else { "fresh" };
        println!("{:<14} {state:<8} age {age}", status.domain.as_str());
    }

    match services.snapshots.load().await {
        Some(snapshot) => println!(
            "{:<14} present  cursor {} of {} (+{} buffered)",
            "queue",
            snapshot.current_index,
            snapshot.active_block.len(),
            snapshot.buffer_block.len()
        ),
        None => println!("{:<14} absent", "queue"),
    }
    Ok(())
}

pub async fn clear(config: &ClientConfig) -> anyhow::Result<()> {
    let services = ServiceRegistry::from_config(config).await?;
    services.queue.clear_queue_cache().await;
    services.orchestrator.clear_all_caches().await;
    println!("cleared queue snapshot and caches");
    Ok(())
}

/// Advance, waiting out a rotation that is still fetching its next block.
async fn next_pair(services: &ServiceRegistry) -> Option<ImagePair> {
    if let Some(pair) = services.queue.get_next_pair() {
        return Some(pair);
    }
    for _ in 0..EXHAUSTED_POLL_LIMIT {
        tokio::time::sleep(EXHAUSTED_POLL).await;
        if services.queue.stats().buffer_len > 0 {
            return services.queue.get_next_pair();
        }
    }
    None
}

fn print_pair(n: usize, pair: &ImagePair, decoded: bool) {
    let marker = if decoded { "*" } else { " " };
    println!(
        "{n:>4}{marker} {} vs {}  ({} | {})",
        pair.first.id, pair.second.id, pair.first.url, pair.second.url
    );
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
