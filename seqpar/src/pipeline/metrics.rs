use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the processor tasks while a run is live.
#[derive(Debug, Default)]
pub struct ProcessorMetricsStorage {
    jobs_created: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_flushed: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl ProcessorMetricsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job was allocated by the feeder.
    pub(crate) fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_flushed(&self) {
        self.jobs_flushed.fetch_add(1, Ordering::Relaxed);
    }

    /// A job's pending half was released, flushed or not.
    pub(crate) fn job_released(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self, total_duration_ms: u128) -> ProcessMetrics {
        ProcessMetrics {
            total_duration_ms,
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_flushed: self.jobs_flushed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time view of a processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessMetrics {
    pub total_duration_ms: u128,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_flushed: u64,
    /// Jobs allocated and not yet flushed or released.
    pub in_flight: u64,
    pub peak_in_flight: u64,
}
