//! Structured-log metrics for partition lifecycle commands.
//!
//! Metrics are emitted as `tracing` events carrying a `metric` field, with
//! process-wide counters for totals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

static BATCHES_APPLIED_TOTAL: AtomicU64 = AtomicU64::new(0);
static STATEMENT_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Records how long a lifecycle command took and how many statements it produced.
pub fn record_command_latency(command: &str, table: &str, duration: Duration, statements: usize) {
    info!(
        metric = "command_latency_ms",
        command,
        table,
        latency_ms = duration_ms(duration),
        statements
    );
}

/// Records a completed backfill batch and increments the batch counter.
pub fn record_batch_latency(table: &str, batch: u64, total: u64, duration: Duration) {
    let applied = BATCHES_APPLIED_TOTAL.fetch_add(1, Ordering::Relaxed) + 1;
    info!(
        metric = "fill_batch_latency_ms",
        table,
        batch,
        total,
        latency_ms = duration_ms(duration),
        batches_applied_total = applied
    );
}

/// Records a statement list the database rejected.
pub fn record_statement_failure(command: &str, error: &str) {
    let total = STATEMENT_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed) + 1;
    warn!(
        metric = "statement_failure",
        command,
        error,
        statement_failures_total = total
    );
}

/// Backfill batches applied by this process.
pub fn batches_applied_total() -> u64 {
    BATCHES_APPLIED_TOTAL.load(Ordering::Relaxed)
}

/// Statement failures seen by this process.
pub fn statement_failures_total() -> u64 {
    STATEMENT_FAILURES_TOTAL.load(Ordering::Relaxed)
}
