// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for state-mirror.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `state_mirror_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: file, redis
//! - `operation`: upsert, upsert_streaming, apply, get, mget, get_all, scan
//! - `status`: success, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of a mirror operation
pub fn record_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "state_mirror_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record success/error for a finished operation result
pub fn record_result<T, E>(backend: &str, operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation(backend, operation, status);
}

/// Record operation latency
pub fn record_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "state_mirror_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record fields set (inserted or overwritten)
pub fn record_fields_written(backend: &str, count: usize) {
    counter!(
        "state_mirror_fields_written_total",
        "backend" => backend.to_string()
    )
    .increment(count as u64);
}

/// Record fields removed (stale, diff deletions, sweep)
pub fn record_fields_deleted(backend: &str, count: usize) {
    counter!(
        "state_mirror_fields_deleted_total",
        "backend" => backend.to_string()
    )
    .increment(count as u64);
}

/// Record one streaming batch flush
pub fn record_stream_flush(backend: &str) {
    counter!(
        "state_mirror_stream_flushes_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.backend, self.operation, self.start.elapsed());
    }
}
