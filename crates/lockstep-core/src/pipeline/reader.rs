//! Reader stages pulling bounded batches from the two input streams.

use super::stage::{Activation, Stage};
use super::state::PipelineState;
use crate::metrics::PipelineMetrics;
use crate::record::LogRecord;
use std::iter::Peekable;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A one-shot, ordered stream of records.
pub type RecordStream = Box<dyn Iterator<Item = LogRecord> + Send>;

/// Box any sendable record iterator as a [`RecordStream`].
pub fn record_stream<I>(records: I) -> RecordStream
where
    I: IntoIterator<Item = LogRecord>,
    I::IntoIter: Send + 'static,
{
    Box::new(records.into_iter())
}

/// Reads the primary stream into the main batch and detects its end.
pub struct PrimaryReader {
    source: Peekable<RecordStream>,
    metrics: Arc<PipelineMetrics>,
    last_activation: Option<Instant>,
    cycles: u64,
}

impl PrimaryReader {
    /// Create a reader over the primary stream.
    pub fn new(source: RecordStream, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            source: source.peekable(),
            metrics,
            last_activation: None,
            cycles: 0,
        }
    }
}

impl Stage for PrimaryReader {
    fn name(&self) -> &str {
        "primary-reader"
    }

    fn activate(&mut self, state: &PipelineState) -> Activation {
        let now = Instant::now();
        if let Some(previous) = self.last_activation.replace(now) {
            self.metrics.record_cycle_duration(now - previous);
        }
        self.cycles += 1;

        let mut main = state.main_mut();
        let read = main.fill_from(self.source.by_ref());

        // Exhaustion is checked after the fill so a stream ending exactly on
        // a batch boundary does not cost an extra empty cycle.
        let exhausted = self.source.peek().is_none();
        if exhausted {
            main.mark_end_of_stream();
        }

        self.metrics.record_primary_records(read as u64);
        debug!(
            stage = "primary-reader",
            cycle = self.cycles,
            records = read,
            end_of_stream = exhausted,
            "Primary batch read"
        );

        if exhausted {
            Activation::Retire
        } else {
            Activation::Continue
        }
    }
}

/// Reads the secondary stream into the keyed ring.
pub struct SecondaryReader {
    source: RecordStream,
    batch_size: usize,
    metrics: Arc<PipelineMetrics>,
}

impl SecondaryReader {
    /// Create a reader pulling up to `batch_size` records per cycle.
    pub fn new(source: RecordStream, batch_size: usize, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            source,
            batch_size,
            metrics,
        }
    }
}

impl Stage for SecondaryReader {
    fn name(&self) -> &str {
        "secondary-reader"
    }

    fn activate(&mut self, state: &PipelineState) -> Activation {
        let mut ring = state.secondary();
        let mut read = 0u64;
        let mut evicted = 0u64;

        for record in self.source.by_ref().take(self.batch_size) {
            if ring.push(record).is_some() {
                evicted += 1;
            }
            read += 1;
        }

        self.metrics.record_secondary_records(read);
        self.metrics.record_evictions(evicted);
        self.metrics.set_ring_len(ring.len() as u64);

        debug!(
            stage = "secondary-reader",
            records = read,
            evicted,
            ring_len = ring.len(),
            "Secondary batch read"
        );

        // Running dry is not terminating; only the primary stream ends a run.
        Activation::Continue
    }
}
