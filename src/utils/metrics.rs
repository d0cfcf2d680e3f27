//! Engine counters
//!
//! Atomic counters covering packet traffic, access decisions, resends and
//! the lifetime managers. Read them through [`Metrics::snapshot`] or emit
//! them with [`Metrics::log_metrics`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Engine-wide counters
#[derive(Debug)]
pub struct Metrics {
    /// Packets handed to the engine
    pub packets_received: AtomicU64,
    /// Packets handed to the device for transmission, resends included
    pub packets_sent: AtomicU64,
    /// Frames parsed with warnings
    pub parse_warnings: AtomicU64,
    /// Packets rejected by access control
    pub access_denied: AtomicU64,
    /// Packets no registered message matched
    pub unknown_messages: AtomicU64,
    /// Heads transmitted a second time after the resend timeout
    pub resends: AtomicU64,
    /// Message handlers that returned an error
    pub handler_errors: AtomicU64,
    /// Send queues created by the queue manager
    pub queues_created: AtomicU64,
    /// Send queues evicted after idling
    pub queues_expired: AtomicU64,
    /// Last-received packets evicted after idling
    pub packets_expired: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            parse_warnings: AtomicU64::new(0),
            access_denied: AtomicU64::new(0),
            unknown_messages: AtomicU64::new(0),
            resends: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            queues_created: AtomicU64::new(0),
            queues_expired: AtomicU64::new(0),
            packets_expired: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_warning(&self) {
        self.parse_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn access_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_message(&self) {
        self.unknown_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resend(&self) {
        self.resends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_created(&self) {
        self.queues_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_expired(&self) {
        self.queues_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_expired(&self) {
        self.packets_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            parse_warnings: self.parse_warnings.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            unknown_messages: self.unknown_messages.load(Ordering::Relaxed),
            resends: self.resends.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            queues_created: self.queues_created.load(Ordering::Relaxed),
            queues_expired: self.queues_expired.load(Ordering::Relaxed),
            packets_expired: self.packets_expired.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            parse_warnings = snapshot.parse_warnings,
            access_denied = snapshot.access_denied,
            unknown_messages = snapshot.unknown_messages,
            resends = snapshot.resends,
            handler_errors = snapshot.handler_errors,
            queues_created = snapshot.queues_created,
            queues_expired = snapshot.queues_expired,
            packets_expired = snapshot.packets_expired,
            uptime_seconds = snapshot.uptime_seconds,
            "Engine metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub parse_warnings: u64,
    pub access_denied: u64,
    pub unknown_messages: u64,
    pub resends: u64,
    pub handler_errors: u64,
    pub queues_created: u64,
    pub queues_expired: u64,
    pub packets_expired: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Logs how long an operation took when dropped.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            "Operation completed"
        );
    }
}
