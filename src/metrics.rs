//! Pipeline counters polled by the external health/metrics layer.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::error::RejectionReason;

/// Shared counters updated by the queue, tracker, and worker pool.
///
/// All updates are relaxed atomics; the snapshot is a point-in-time read, not
/// a consistent cut.
#[derive(Debug, Default)]
pub struct Metrics {
    queue_depth: AtomicUsize,
    busy_workers: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    worker_crashes: AtomicU64,
    rejected_payload_too_large: AtomicU64,
    rejected_unsupported_type: AtomicU64,
    rejected_rate_limited: AtomicU64,
    rejected_queue_full: AtomicU64,
    rejected_shutting_down: AtomicU64,
}

impl Metrics {
    pub fn incr_queue_depth(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_queue_depth(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn incr_busy_workers(&self) {
        self.busy_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_busy_workers(&self) {
        self.busy_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_crash(&self) {
        self.worker_crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: &RejectionReason) {
        let counter = match reason {
            RejectionReason::PayloadTooLarge { .. } => &self.rejected_payload_too_large,
            RejectionReason::UnsupportedType { .. } => &self.rejected_unsupported_type,
            RejectionReason::RateLimited { .. } => &self.rejected_rate_limited,
            RejectionReason::QueueFull => &self.rejected_queue_full,
            RejectionReason::ServiceShuttingDown => &self.rejected_shutting_down,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            busy_workers: self.busy_workers.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            worker_crashes: self.worker_crashes.load(Ordering::Relaxed),
            rejected_payload_too_large: self.rejected_payload_too_large.load(Ordering::Relaxed),
            rejected_unsupported_type: self.rejected_unsupported_type.load(Ordering::Relaxed),
            rejected_rate_limited: self.rejected_rate_limited.load(Ordering::Relaxed),
            rejected_queue_full: self.rejected_queue_full.load(Ordering::Relaxed),
            rejected_shutting_down: self.rejected_shutting_down.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline, serializable for a health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_depth: usize,
    pub busy_workers: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub worker_crashes: u64,
    pub rejected_payload_too_large: u64,
    pub rejected_unsupported_type: u64,
    pub rejected_rate_limited: u64,
    pub rejected_queue_full: u64,
    pub rejected_shutting_down: u64,
}
