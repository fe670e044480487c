use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collected over one pipeline run
#[derive(Default)]
pub struct RunStats {
    pub pages_seen: AtomicU64,
    pub revisions_read: AtomicU64,
    pub revisions_processed: AtomicU64,
    pub facts_emitted: AtomicU64,
    pub malformed_revisions: AtomicU64,
    pub truncated_pages: AtomicU64,
    pub deserialize_failures: AtomicU64,
    pub redirect_revisions: AtomicU64,
    pub unsupported_models: AtomicU64,
    pub registry_misses: AtomicU64,
    pub consistency_warnings: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_pages(&self) {
        self.pages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_revisions_read(&self) {
        self.revisions_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_revisions_processed(&self) {
        self.revisions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_facts(&self, count: u64) {
        self.facts_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_revisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_truncated(&self) {
        self.truncated_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deserialize_failures(&self) {
        self.deserialize_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_redirects(&self) {
        self.redirect_revisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unsupported_models(&self) {
        self.unsupported_models.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_registry_misses(&self, count: u64) {
        self.registry_misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_consistency_warnings(&self) {
        self.consistency_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u64 {
        self.pages_seen.load(Ordering::Relaxed)
    }

    pub fn revisions(&self) -> u64 {
        self.revisions_read.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.revisions_processed.load(Ordering::Relaxed)
    }

    pub fn facts(&self) -> u64 {
        self.facts_emitted.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed_revisions.load(Ordering::Relaxed)
    }

    pub fn truncated(&self) -> u64 {
        self.truncated_pages.load(Ordering::Relaxed)
    }

    pub fn deserialize_failures(&self) -> u64 {
        self.deserialize_failures.load(Ordering::Relaxed)
    }

    pub fn redirects(&self) -> u64 {
        self.redirect_revisions.load(Ordering::Relaxed)
    }

    pub fn unsupported(&self) -> u64 {
        self.unsupported_models.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.registry_misses.load(Ordering::Relaxed)
    }

    pub fn warnings(&self) -> u64 {
        self.consistency_warnings.load(Ordering::Relaxed)
    }

    /// Revisions skipped for any recoverable reason.
    pub fn skipped(&self) -> u64 {
        self.malformed()
            + self.deserialize_failures()
            + self.redirects()
            + self.unsupported()
            + self.warnings()
    }
}
