//! Prometheus metrics export.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in microseconds for cycle duration.
/// Converts to seconds: [0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]
const CYCLE_DURATION_BUCKETS_US: [u64; 7] = [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000];

/// Pipeline metrics with counters, gauges, and a cycle histogram.
///
/// One instance is shared by every stage of a run.
pub struct PipelineMetrics {
    // === COUNTERS ===
    /// Completed pipeline cycles (one per merge activation)
    cycles_total: AtomicU64,

    /// Records read from the primary stream
    primary_records_total: AtomicU64,

    /// Records read from the secondary stream
    secondary_records_total: AtomicU64,

    /// Primary records that found a match in the ring
    join_hits_total: AtomicU64,

    /// Primary records with no match in the ring
    join_misses_total: AtomicU64,

    /// Ring slots overwritten after the ring filled
    ring_evictions_total: AtomicU64,

    /// Evaluators that terminated with an error
    evaluator_errors_total: AtomicU64,

    // === GAUGES ===
    /// Occupied slots in the secondary ring
    ring_len: AtomicU64,

    // === HISTOGRAM: cycle_duration_seconds ===
    cycle_duration_sum_us: AtomicU64,
    cycle_duration_count: AtomicU64,
    /// Buckets: [0.0001s .. 0.1s, +Inf]
    cycle_duration_buckets: [AtomicU64; 8],
}

impl PipelineMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            primary_records_total: AtomicU64::new(0),
            secondary_records_total: AtomicU64::new(0),
            join_hits_total: AtomicU64::new(0),
            join_misses_total: AtomicU64::new(0),
            ring_evictions_total: AtomicU64::new(0),
            evaluator_errors_total: AtomicU64::new(0),
            ring_len: AtomicU64::new(0),
            cycle_duration_sum_us: AtomicU64::new(0),
            cycle_duration_count: AtomicU64::new(0),
            cycle_duration_buckets: Default::default(),
        }
    }

    // === COUNTER RECORDING ===

    /// Record a completed cycle.
    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record records pulled from the primary stream.
    pub fn record_primary_records(&self, count: u64) {
        self.primary_records_total
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record records pulled from the secondary stream.
    pub fn record_secondary_records(&self, count: u64) {
        self.secondary_records_total
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record the outcome of one merge pass.
    pub fn record_join(&self, hits: u64, misses: u64) {
        self.join_hits_total.fetch_add(hits, Ordering::Relaxed);
        self.join_misses_total.fetch_add(misses, Ordering::Relaxed);
    }

    /// Record ring evictions.
    pub fn record_evictions(&self, count: u64) {
        self.ring_evictions_total
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record an evaluator that ended with an error.
    pub fn record_evaluator_error(&self) {
        self.evaluator_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the wall time of one full cycle.
    pub fn record_cycle_duration(&self, duration: Duration) {
        let duration_us = duration.as_micros() as u64;
        self.cycle_duration_sum_us
            .fetch_add(duration_us, Ordering::Relaxed);
        self.cycle_duration_count.fetch_add(1, Ordering::Relaxed);

        // Cumulative buckets (le = less than or equal)
        for (i, &bucket_us) in CYCLE_DURATION_BUCKETS_US.iter().enumerate() {
            if duration_us <= bucket_us {
                self.cycle_duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.cycle_duration_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    // === GAUGE UPDATES ===

    /// Update the occupied slot count of the ring.
    pub fn set_ring_len(&self, len: u64) {
        self.ring_len.store(len, Ordering::Relaxed);
    }

    // === GETTERS ===

    /// Get completed cycles.
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    /// Get primary records read.
    pub fn primary_records_total(&self) -> u64 {
        self.primary_records_total.load(Ordering::Relaxed)
    }

    /// Get secondary records read.
    pub fn secondary_records_total(&self) -> u64 {
        self.secondary_records_total.load(Ordering::Relaxed)
    }

    /// Get join hits.
    pub fn join_hits_total(&self) -> u64 {
        self.join_hits_total.load(Ordering::Relaxed)
    }

    /// Get join misses.
    pub fn join_misses_total(&self) -> u64 {
        self.join_misses_total.load(Ordering::Relaxed)
    }

    /// Get ring evictions.
    pub fn ring_evictions_total(&self) -> u64 {
        self.ring_evictions_total.load(Ordering::Relaxed)
    }

    /// Get evaluator errors.
    pub fn evaluator_errors_total(&self) -> u64 {
        self.evaluator_errors_total.load(Ordering::Relaxed)
    }

    /// Get current ring occupancy.
    pub fn ring_len(&self) -> u64 {
        self.ring_len.load(Ordering::Relaxed)
    }

    /// Get cycle duration histogram data for Prometheus export.
    pub fn cycle_duration_histogram(&self) -> CycleDurationHistogram {
        let mut buckets = [(0.0, 0); 7];
        for (i, &bucket_us) in CYCLE_DURATION_BUCKETS_US.iter().enumerate() {
            buckets[i] = (
                bucket_us as f64 / 1_000_000.0,
                self.cycle_duration_buckets[i].load(Ordering::Relaxed),
            );
        }

        CycleDurationHistogram {
            sum_seconds: self.cycle_duration_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            count: self.cycle_duration_count.load(Ordering::Relaxed),
            buckets,
            inf_bucket: self.cycle_duration_buckets[7].load(Ordering::Relaxed),
        }
    }

    /// Export all metrics in Prometheus text format.
    ///
    /// # Example
    /// ```
    /// use lockstep_core::metrics::PipelineMetrics;
    ///
    /// let metrics = PipelineMetrics::new();
    /// metrics.record_cycle();
    /// let text = metrics.export_prometheus_text();
    /// assert!(text.contains("lockstep_cycles_total 1"));
    /// ```
    pub fn export_prometheus_text(&self) -> String {
        self.export_prometheus_text_with_prefix("lockstep")
    }

    /// Export metrics in Prometheus text format with custom prefix.
    pub fn export_prometheus_text_with_prefix(&self, prefix: &str) -> String {
        let mut output = String::with_capacity(2048);

        let counters = [
            ("cycles_total", "Completed pipeline cycles", self.cycles_total()),
            (
                "primary_records_total",
                "Records read from the primary stream",
                self.primary_records_total(),
            ),
            (
                "secondary_records_total",
                "Records read from the secondary stream",
                self.secondary_records_total(),
            ),
            (
                "join_hits_total",
                "Primary records joined against the ring",
                self.join_hits_total(),
            ),
            (
                "join_misses_total",
                "Primary records with no ring match",
                self.join_misses_total(),
            ),
            (
                "ring_evictions_total",
                "Ring slots overwritten after filling",
                self.ring_evictions_total(),
            ),
            (
                "evaluator_errors_total",
                "Evaluators that ended with an error",
                self.evaluator_errors_total(),
            ),
        ];

        // Writing to a String cannot fail
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {prefix}_{name} {help}");
            let _ = writeln!(output, "# TYPE {prefix}_{name} counter");
            let _ = writeln!(output, "{prefix}_{name} {value}");
            output.push('\n');
        }

        let _ = writeln!(output, "# HELP {prefix}_ring_len Occupied secondary ring slots");
        let _ = writeln!(output, "# TYPE {prefix}_ring_len gauge");
        let _ = writeln!(output, "{prefix}_ring_len {}", self.ring_len());
        output.push('\n');

        let hist = self.cycle_duration_histogram();
        let _ = writeln!(
            output,
            "# HELP {prefix}_cycle_duration_seconds Wall time of one pipeline cycle"
        );
        let _ = writeln!(output, "# TYPE {prefix}_cycle_duration_seconds histogram");
        for (le, count) in &hist.buckets {
            let _ = writeln!(
                output,
                "{prefix}_cycle_duration_seconds_bucket{{le=\"{le}\"}} {count}"
            );
        }
        let _ = writeln!(
            output,
            "{prefix}_cycle_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            hist.inf_bucket
        );
        let _ = writeln!(
            output,
            "{prefix}_cycle_duration_seconds_sum {}",
            hist.sum_seconds
        );
        let _ = writeln!(
            output,
            "{prefix}_cycle_duration_seconds_count {}",
            hist.count
        );

        output
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycle duration histogram data for export.
#[derive(Debug, Clone)]
pub struct CycleDurationHistogram {
    /// Sum of all observations in seconds
    pub sum_seconds: f64,
    /// Total count of observations
    pub count: u64,
    /// Bucket counts: (le_boundary_seconds, count)
    pub buckets: [(f64, u64); 7],
    /// +Inf bucket count
    pub inf_bucket: u64,
}
