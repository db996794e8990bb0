use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collected during a trace run
#[derive(Default)]
pub struct RunStats {
    pub pages_discovered: AtomicU64,
    pub links_resolved: AtomicU64,
    pub scans_truncated: AtomicU64,
    pub links_vanished: AtomicU64,
    pub resolve_failures: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub users_admitted: AtomicU64,
    pub users_suppressed: AtomicU64,
    pub users_enriched: AtomicU64,
    pub profile_failures: AtomicU64,
    pub contrib_failures: AtomicU64,
    pub contributions_written: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_pages(&self) {
        self.pages_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolved(&self) {
        self.links_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_truncated(&self) {
        self.scans_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_vanished(&self) {
        self.links_vanished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolve_failures(&self) {
        self.resolve_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admitted(&self) {
        self.users_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_suppressed(&self) {
        self.users_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enriched(&self) {
        self.users_enriched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_profile_failures(&self) {
        self.profile_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_contrib_failures(&self) {
        self.contrib_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_contributions(&self, count: u64) {
        self.contributions_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u64 {
        self.pages_discovered.load(Ordering::Relaxed)
    }

    pub fn resolved(&self) -> u64 {
        self.links_resolved.load(Ordering::Relaxed)
    }

    pub fn truncated(&self) -> u64 {
        self.scans_truncated.load(Ordering::Relaxed)
    }

    pub fn vanished(&self) -> u64 {
        self.links_vanished.load(Ordering::Relaxed)
    }

    pub fn resolve_failed(&self) -> u64 {
        self.resolve_failures.load(Ordering::Relaxed)
    }

    pub fn failed_tasks(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn admitted(&self) -> u64 {
        self.users_admitted.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.users_suppressed.load(Ordering::Relaxed)
    }

    pub fn enriched(&self) -> u64 {
        self.users_enriched.load(Ordering::Relaxed)
    }

    pub fn profile_failed(&self) -> u64 {
        self.profile_failures.load(Ordering::Relaxed)
    }

    pub fn contrib_failed(&self) -> u64 {
        self.contrib_failures.load(Ordering::Relaxed)
    }

    pub fn contributions(&self) -> u64 {
        self.contributions_written.load(Ordering::Relaxed)
    }

    /// Total units of work that were skipped or degraded by remote failures
    pub fn failure_total(&self) -> u64 {
        self.resolve_failed() + self.failed_tasks() + self.profile_failed() + self.contrib_failed()
    }
}
