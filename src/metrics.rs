//! Process-wide counters for tool invocations and upstream traffic.
//!
//! Created once at startup and shared by `Arc`. Handlers never touch the
//! atomics directly; everything goes through the `record_*` methods, and
//! readers get a consistent-enough copy from [`Metrics::snapshot`].

use crate::error::ErrorKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Metrics {
    tool_calls: AtomicU64,
    tool_failures: AtomicU64,
    invalid_args: AtomicU64,
    security_rejections: AtomicU64,
    upstream_errors: AtomicU64,
    timeouts: AtomicU64,
    partial_failures: AtomicU64,
    not_found: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_retries: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub invalid_args: u64,
    pub security_rejections: u64,
    pub upstream_errors: u64,
    pub timeouts: u64,
    pub partial_failures: u64,
    pub not_found: u64,
    pub upstream_calls: u64,
    pub upstream_retries: u64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one finished tool invocation.
    pub fn record_call(&self, failure: Option<ErrorKind>) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        let Some(kind) = failure else {
            return;
        };
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            ErrorKind::NotFound => &self.not_found,
            ErrorKind::InvalidArgs => &self.invalid_args,
            ErrorKind::SecurityError => &self.security_rejections,
            ErrorKind::UpstreamError => &self.upstream_errors,
            ErrorKind::Timeout => &self.timeouts,
            ErrorKind::PartialFailure => &self.partial_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_call(&self) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.upstream_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            invalid_args: self.invalid_args.load(Ordering::Relaxed),
            security_rejections: self.security_rejections.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_retries: self.upstream_retries.load(Ordering::Relaxed),
        }
    }
}
