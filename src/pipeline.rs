//! Streaming orchestration of the whole trace.
//!
//! One scanner driver per (language, domain) task feeds page references into
//! a bounded channel; a single dispatch loop drains the channel into a
//! worker pool capped at the shared budget. Completed page resolutions write
//! their link-usage row immediately, push newly admitted users onto the pool
//! backlog, and completed enrichments write their user rows the same way —
//! nothing buffers a full task's results. Backpressure is the pool plus the
//! channel bound; if the remote is slow, scanners stall instead of queueing
//! unbounded work in memory.
//!
//! Failures never cross unit boundaries: a failed page scan, resolution, or
//! enrichment is logged, counted, and skipped while everything else keeps
//! draining.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, FetchError};
use crate::dedup::DedupGate;
use crate::enrich::{enrich_user, EnrichedUser};
use crate::models::{DedupKey, LinkTask, LinkUsage, PageReference, UsageStatus};
use crate::resolver::{resolve_introducer, Resolution};
use crate::scanner::LinkUsageScanner;
use crate::sink::OutputSinks;
use crate::stats::RunStats;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_workers: usize,
    pub contrib_limit: u32,
    pub scan_depth: u32,
}

/// Cooperative cancellation flag. Triggering stops scanners at their next
/// page boundary; in-flight and already-queued work drains normally so the
/// output files stay record-complete.
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

enum UnitOutcome {
    Resolved {
        page: PageReference,
        result: Result<Resolution, FetchError>,
    },
    Enriched {
        key: DedupKey,
        user: EnrichedUser,
    },
}

pub async fn run_pipeline(
    client: Arc<ApiClient>,
    tasks: Vec<LinkTask>,
    sinks: Arc<OutputSinks>,
    gate: Arc<DedupGate>,
    stats: Arc<RunStats>,
    options: PipelineOptions,
    shutdown: Shutdown,
) -> Result<()> {
    let max_workers = options.max_workers.max(1);
    let (page_tx, mut page_rx) = mpsc::channel::<PageReference>(max_workers * 2);

    let mut scanners = Vec::new();
    for task in tasks {
        let client = client.clone();
        let tx = page_tx.clone();
        let stats = stats.clone();
        let shutdown = shutdown.clone();
        scanners.push(tokio::spawn(drive_scanner(client, task, tx, stats, shutdown)));
    }
    drop(page_tx);

    let pb = make_spinner();
    let mut in_flight: FuturesUnordered<JoinHandle<UnitOutcome>> = FuturesUnordered::new();
    let mut backlog: VecDeque<DedupKey> = VecDeque::new();
    let mut scanning = true;

    loop {
        // Admitted users wait here until a pool slot frees up
        while in_flight.len() < max_workers {
            let Some(key) = backlog.pop_front() else {
                break;
            };
            in_flight.push(spawn_enrich(
                client.clone(),
                key,
                options.contrib_limit,
            ));
        }

        tokio::select! {
            maybe_page = page_rx.recv(), if scanning && in_flight.len() < max_workers => {
                match maybe_page {
                    Some(page) => in_flight.push(spawn_resolve(
                        client.clone(),
                        page,
                        options.scan_depth,
                    )),
                    None => scanning = false,
                }
            }
            Some(joined) = in_flight.next() => {
                let outcome = joined.context("Worker task panicked")?;
                handle_outcome(outcome, &sinks, &gate, &stats, &mut backlog)?;
                pb.set_message(format!(
                    "{} pages · {} resolved · {} users enriched",
                    stats.pages(),
                    stats.resolved(),
                    stats.enriched(),
                ));
            }
        }

        if !scanning && in_flight.is_empty() && backlog.is_empty() {
            break;
        }
    }

    for handle in scanners {
        handle.await.context("Scanner task panicked")?;
    }

    pb.finish_with_message(format!(
        "{} pages · {} resolved · {} users enriched",
        stats.pages(),
        stats.resolved(),
        stats.enriched(),
    ));

    Ok(())
}

async fn drive_scanner(
    client: Arc<ApiClient>,
    task: LinkTask,
    tx: mpsc::Sender<PageReference>,
    stats: Arc<RunStats>,
    shutdown: Shutdown,
) {
    info!(lang = %task.lang, domain = %task.domain, "Scanning link usage");
    let mut scanner = LinkUsageScanner::new(&client, task.clone());

    loop {
        if shutdown.is_triggered() {
            debug!(lang = %task.lang, domain = %task.domain, "Scan stopped by shutdown");
            return;
        }
        match scanner.next_page().await {
            Ok(Some(pages)) => {
                for page in pages {
                    stats.inc_pages();
                    if tx.send(page).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {
                debug!(lang = %task.lang, domain = %task.domain, "Link usage scan complete");
                return;
            }
            Err(e) => {
                warn!(
                    lang = %task.lang,
                    domain = %task.domain,
                    error = %e,
                    "Link usage scan failed, skipping remainder of task"
                );
                stats.inc_tasks_failed();
                return;
            }
        }
    }
}

fn spawn_resolve(
    client: Arc<ApiClient>,
    page: PageReference,
    scan_depth: u32,
) -> JoinHandle<UnitOutcome> {
    tokio::spawn(async move {
        let result = resolve_introducer(&client, &page, scan_depth).await;
        UnitOutcome::Resolved { page, result }
    })
}

fn spawn_enrich(
    client: Arc<ApiClient>,
    key: DedupKey,
    contrib_limit: u32,
) -> JoinHandle<UnitOutcome> {
    tokio::spawn(async move {
        let user = enrich_user(&client, &key, contrib_limit).await;
        UnitOutcome::Enriched { key, user }
    })
}

fn handle_outcome(
    outcome: UnitOutcome,
    sinks: &OutputSinks,
    gate: &DedupGate,
    stats: &RunStats,
    backlog: &mut VecDeque<DedupKey>,
) -> Result<()> {
    match outcome {
        UnitOutcome::Resolved { page, result } => match result {
            Ok(resolution) => {
                let usage = usage_record(&page, &resolution);
                // The row lands before admission is even attempted
                sinks.write_usage(&usage)?;
                match usage.status {
                    UsageStatus::Resolved => stats.inc_resolved(),
                    UsageStatus::ScanTruncated => stats.inc_truncated(),
                    UsageStatus::LinkVanished => stats.inc_vanished(),
                }

                if let Some(user) = usage.introducer {
                    let key = DedupKey {
                        lang: page.lang.clone(),
                        user,
                    };
                    if gate.try_admit(&key)? {
                        stats.inc_admitted();
                        backlog.push_back(key);
                    } else {
                        stats.inc_suppressed();
                    }
                }
            }
            Err(e) => {
                warn!(
                    lang = %page.lang,
                    title = %page.title,
                    error = %e,
                    "Skipping page after fetch failure"
                );
                stats.inc_resolve_failures();
            }
        },
        UnitOutcome::Enriched { key, user } => {
            sinks.write_user(&user.info)?;
            for contribution in &user.contributions {
                sinks.write_contribution(contribution)?;
            }
            stats.inc_enriched();
            stats.add_contributions(user.contributions.len() as u64);
            if !user.profile_ok {
                stats.inc_profile_failures();
            }
            if !user.contribs_ok {
                stats.inc_contrib_failures();
            }
            debug!(lang = %key.lang, user = %key.user, "User enriched");
        }
    }
    Ok(())
}

fn usage_record(page: &PageReference, resolution: &Resolution) -> LinkUsage {
    let (introducer, rev_id, introduced_at, status) = match resolution {
        Resolution::Introduced {
            user,
            rev_id,
            timestamp,
        } => (
            user.clone(),
            Some(*rev_id),
            Some(timestamp.clone()),
            UsageStatus::Resolved,
        ),
        Resolution::Truncated { .. } => (None, None, None, UsageStatus::ScanTruncated),
        Resolution::Vanished => (None, None, None, UsageStatus::LinkVanished),
    };

    LinkUsage {
        lang: page.lang.clone(),
        domain: page.domain.clone(),
        url: page.url.clone(),
        title: page.title.clone(),
        page_id: page.page_id,
        introducer,
        rev_id,
        introduced_at,
        status,
    }
}

fn make_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
