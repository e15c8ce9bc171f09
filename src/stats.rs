use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected during a batch extraction
#[derive(Default, Debug)]
pub struct ExtractionStats {
    pub requests: AtomicU64,
    pub articles_extracted: AtomicU64,
    pub unknown_titles: AtomicU64,
    pub failures: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_extracted(&self) {
        self.articles_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unknown(&self) {
        self.unknown_titles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn requested(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn extracted(&self) -> u64 {
        self.articles_extracted.load(Ordering::Relaxed)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown_titles.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
