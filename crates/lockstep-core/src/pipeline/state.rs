//! State shared by every stage of a run.
//!
//! The barrier protocol hands the state to one stage group at a time, so the
//! locks below are never contended. Each stage takes its guard only for the
//! length of one activation.

use crate::buffer::KeyedRingBuffer;
use crate::config::PipelineConfig;
use crate::record::LogRecord;
use crate::Result;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Fixed-size batch filled by the primary reader each cycle.
#[derive(Debug)]
pub struct MainBatch {
    records: Box<[LogRecord]>,
    valid_count: usize,
    end_of_stream: bool,
}

impl MainBatch {
    fn new(capacity: usize) -> Self {
        Self {
            records: vec![LogRecord::default(); capacity].into_boxed_slice(),
            valid_count: 0,
            end_of_stream: false,
        }
    }

    /// Fixed slot count.
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Entries populated in the current cycle.
    ///
    /// May exceed [`capacity`](Self::capacity) if a stage misreported it;
    /// evaluators treat that as fatal.
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    /// Overwrite the populated count without touching the slots.
    pub fn set_valid_count(&mut self, count: usize) {
        self.valid_count = count;
    }

    /// Overwrite slots from the front with up to `capacity` records.
    /// Returns how many were written and sets the valid count to match.
    pub fn fill_from<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut written = 0;
        for (slot, record) in self.records.iter_mut().zip(records) {
            *slot = record;
            written += 1;
        }
        self.valid_count = written;
        written
    }

    /// The populated slots, clamped to the buffer size.
    pub fn valid(&self) -> &[LogRecord] {
        let end = self.valid_count.min(self.records.len());
        &self.records[..end]
    }

    /// Mutable view of the populated slots, clamped to the buffer size.
    pub fn valid_mut(&mut self) -> &mut [LogRecord] {
        let end = self.valid_count.min(self.records.len());
        &mut self.records[..end]
    }

    /// Whether the primary stream has been exhausted.
    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Flag the current cycle as the last one.
    pub fn mark_end_of_stream(&mut self) {
        self.end_of_stream = true;
    }
}

/// Pipeline state: main batch plus the secondary ring.
#[derive(Debug)]
pub struct PipelineState {
    main: RwLock<MainBatch>,
    secondary: Mutex<KeyedRingBuffer>,
}

impl PipelineState {
    /// Create state sized by the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            main: RwLock::new(MainBatch::new(config.batch_size)),
            secondary: Mutex::new(KeyedRingBuffer::new(config.secondary_capacity)?),
        })
    }

    /// Shared view of the main batch (evaluators).
    pub fn main(&self) -> RwLockReadGuard<'_, MainBatch> {
        self.main.read()
    }

    /// Exclusive view of the main batch (primary reader, merge).
    pub fn main_mut(&self) -> RwLockWriteGuard<'_, MainBatch> {
        self.main.write()
    }

    /// Exclusive view of the secondary ring.
    pub fn secondary(&self) -> MutexGuard<'_, KeyedRingBuffer> {
        self.secondary.lock()
    }

    /// Whether the primary stream has been exhausted.
    pub fn end_of_stream(&self) -> bool {
        self.main.read().end_of_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = PipelineState::new(&PipelineConfig::new(4)).unwrap();
        assert_eq!(state.main().capacity(), 4);
        assert_eq!(state.main().valid_count(), 0);
        assert!(!state.end_of_stream());
        assert!(state.secondary().is_empty());
        assert_eq!(state.secondary().capacity(), 4);
    }

    #[test]
    fn test_new_state_rejects_zero_batch() {
        assert!(PipelineState::new(&PipelineConfig::new(0)).is_err());
    }

    #[test]
    fn test_fill_from_stops_at_capacity() {
        let state = PipelineState::new(&PipelineConfig::new(2)).unwrap();
        let mut main = state.main_mut();

        let written = main.fill_from((0..5).map(|i| LogRecord::new(format!("k{i}"), i)));
        assert_eq!(written, 2);
        assert_eq!(main.valid_count(), 2);
        assert_eq!(main.valid()[1], LogRecord::new("k1", 1));
    }

    #[test]
    fn test_short_fill_keeps_stale_tail_out_of_view() {
        let state = PipelineState::new(&PipelineConfig::new(3)).unwrap();
        let mut main = state.main_mut();

        main.fill_from((0..3).map(|i| LogRecord::new(format!("k{i}"), i)));
        main.fill_from([LogRecord::new("x", 9)]);
        assert_eq!(main.valid(), &[LogRecord::new("x", 9)]);
    }

    #[test]
    fn test_valid_view_clamped_on_overclaim() {
        let state = PipelineState::new(&PipelineConfig::new(2)).unwrap();
        let mut main = state.main_mut();

        main.set_valid_count(5);
        assert_eq!(main.valid_count(), 5);
        assert_eq!(main.valid().len(), 2);
        assert_eq!(main.valid_mut().len(), 2);
    }

    #[test]
    fn test_end_of_stream_flag() {
        let state = PipelineState::new(&PipelineConfig::default()).unwrap();
        state.main_mut().mark_end_of_stream();
        assert!(state.end_of_stream());
    }
}
