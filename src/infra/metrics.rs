//! Lock-free bridge counters and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and never drive throttle decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector shared between the subscriber and publisher
#[derive(Default)]
pub struct Metrics {
    /// Inbound messages on the local topic (monotonic)
    received: AtomicU64,
    /// Payloads that were not valid text
    decode_failed: AtomicU64,
    /// Payloads without a usable integer value
    parse_failed: AtomicU64,
    /// Readings skipped by the sensor filter
    filtered: AtomicU64,
    /// Readings that advanced the throttle
    counted: AtomicU64,
    forwards_attempted: AtomicU64,
    forwards_succeeded: AtomicU64,
    forwards_failed: AtomicU64,
    /// Forwards handed to the worker queue (queued mode)
    forwards_enqueued: AtomicU64,
    /// Remote sessions run by the forward worker (queued mode)
    worker_succeeded: AtomicU64,
    worker_failed: AtomicU64,
    /// Max forward latency since last report (reset on report)
    forward_latency_max_us: AtomicU64,
    /// Local broker (re)connections
    local_connects: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failed(&self) {
        self.decode_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_failed(&self) {
        self.parse_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_counted(&self) {
        self.counted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_forward_attempt(&self) {
        self.forwards_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward_result(&self, ok: bool, latency_us: u64) {
        if ok {
            self.forwards_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.forwards_failed.fetch_add(1, Ordering::Relaxed);
        }
        update_atomic_max(&self.forward_latency_max_us, latency_us);
    }

    /// Forward accepted by the worker queue; latency is recorded by the worker
    #[inline]
    pub fn record_forward_enqueued(&self) {
        self.forwards_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Result of a remote session run by the forward worker
    pub fn record_worker_result(&self, ok: bool, latency_us: u64) {
        if ok {
            self.worker_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.worker_failed.fetch_add(1, Ordering::Relaxed);
        }
        update_atomic_max(&self.forward_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_local_connect(&self) {
        self.local_connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters; the latency max is reset
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            received: self.received.load(Ordering::Relaxed),
            decode_failed: self.decode_failed.load(Ordering::Relaxed),
            parse_failed: self.parse_failed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            counted: self.counted.load(Ordering::Relaxed),
            forwards_attempted: self.forwards_attempted.load(Ordering::Relaxed),
            forwards_succeeded: self.forwards_succeeded.load(Ordering::Relaxed),
            forwards_failed: self.forwards_failed.load(Ordering::Relaxed),
            forwards_enqueued: self.forwards_enqueued.load(Ordering::Relaxed),
            worker_succeeded: self.worker_succeeded.load(Ordering::Relaxed),
            worker_failed: self.worker_failed.load(Ordering::Relaxed),
            forward_latency_max_us: self.forward_latency_max_us.swap(0, Ordering::Relaxed),
            local_connects: self.local_connects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the bridge counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub received: u64,
    pub decode_failed: u64,
    pub parse_failed: u64,
    pub filtered: u64,
    pub counted: u64,
    pub forwards_attempted: u64,
    pub forwards_succeeded: u64,
    pub forwards_failed: u64,
    pub forwards_enqueued: u64,
    pub worker_succeeded: u64,
    pub worker_failed: u64,
    pub forward_latency_max_us: u64,
    pub local_connects: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            received = %self.received,
            decode_failed = %self.decode_failed,
            parse_failed = %self.parse_failed,
            filtered = %self.filtered,
            counted = %self.counted,
            forwards_attempted = %self.forwards_attempted,
            forwards_succeeded = %self.forwards_succeeded,
            forwards_failed = %self.forwards_failed,
            forwards_enqueued = %self.forwards_enqueued,
            worker_succeeded = %self.worker_succeeded,
            worker_failed = %self.worker_failed,
            forward_latency_max_us = %self.forward_latency_max_us,
            local_connects = %self.local_connects,
            "metrics"
        );
    }
}
