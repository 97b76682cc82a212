//! Merge stage: sum-join of the main batch against the secondary ring.

use super::stage::{Activation, Stage};
use super::state::PipelineState;
use crate::buffer::KeyedRingBuffer;
use crate::metrics::PipelineMetrics;
use crate::record::LogRecord;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of joining one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Records whose key was found in the ring
    pub hits: usize,
    /// Keys with no match, in batch order
    pub missed_keys: Vec<String>,
}

impl JoinReport {
    /// Number of records left unjoined.
    pub fn misses(&self) -> usize {
        self.missed_keys.len()
    }
}

/// Join each record in `batch` against `ring`, summing values in place.
///
/// Records without a match are left unchanged and reported.
pub fn join_batch(batch: &mut [LogRecord], ring: &KeyedRingBuffer) -> JoinReport {
    let mut report = JoinReport::default();

    for record in batch.iter_mut() {
        match ring.get(&record.key) {
            Ok(matched) => {
                *record = record.sum_with(matched);
                report.hits += 1;
            }
            Err(_) => report.missed_keys.push(record.key.clone()),
        }
    }

    report
}

/// Joins the main batch against the secondary ring once per cycle.
pub struct MergeStage {
    metrics: Arc<PipelineMetrics>,
}

impl MergeStage {
    /// Create a merge stage.
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self { metrics }
    }
}

impl Stage for MergeStage {
    fn name(&self) -> &str {
        "merge"
    }

    fn activate(&mut self, state: &PipelineState) -> Activation {
        let mut main = state.main_mut();
        let ring = state.secondary();

        let report = join_batch(main.valid_mut(), &ring);

        // A miss is a reporting gap, never a pipeline failure
        for key in &report.missed_keys {
            warn!(stage = "merge", key = %key, "Could not find key in secondary buffer");
        }

        self.metrics
            .record_join(report.hits as u64, report.misses() as u64);
        self.metrics.record_cycle();

        debug!(
            stage = "merge",
            hits = report.hits,
            misses = report.misses(),
            "Batch joined"
        );

        Activation::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[test]
    fn test_join_sums_matching_key() {
        let mut ring = KeyedRingBuffer::new(4).unwrap();
        ring.add([LogRecord::new("a", 3)]);

        let mut batch = vec![LogRecord::new("a", 5)];
        let report = join_batch(&mut batch, &ring);

        assert_eq!(batch, vec![LogRecord::new("a", 8)]);
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses(), 0);
    }

    #[test]
    fn test_join_reports_missing_key() {
        let mut ring = KeyedRingBuffer::new(4).unwrap();
        ring.add([LogRecord::new("a", 3)]);

        let mut batch = vec![LogRecord::new("z", 1)];
        let report = join_batch(&mut batch, &ring);

        assert_eq!(batch, vec![LogRecord::new("z", 1)]);
        assert_eq!(report.hits, 0);
        assert_eq!(report.missed_keys, vec!["z".to_string()]);
    }

    #[test]
    fn test_join_overflowing_sum_wraps() {
        let mut ring = KeyedRingBuffer::new(2).unwrap();
        ring.add([LogRecord::new("a", 1)]);

        let mut batch = vec![LogRecord::new("a", i64::MAX)];
        let report = join_batch(&mut batch, &ring);

        assert_eq!(batch, vec![LogRecord::new("a", i64::MIN)]);
        assert_eq!(report.hits, 1);
    }

    #[test]
    fn test_join_does_not_consume_ring() {
        let mut ring = KeyedRingBuffer::new(4).unwrap();
        ring.add([LogRecord::new("a", 1)]);

        let mut batch = vec![LogRecord::new("a", 1), LogRecord::new("a", 2)];
        join_batch(&mut batch, &ring);

        assert_eq!(batch, vec![LogRecord::new("a", 2), LogRecord::new("a", 3)]);
        assert_eq!(ring.get("a").unwrap().value, 1);
    }

    #[test]
    fn test_merge_stage_only_touches_valid_entries() {
        let state = PipelineState::new(&PipelineConfig::new(3)).unwrap();
        let metrics = Arc::new(PipelineMetrics::new());

        state.secondary().add([LogRecord::new("a", 10), LogRecord::new("b", 20)]);
        {
            let mut main = state.main_mut();
            main.fill_from([
                LogRecord::new("a", 1),
                LogRecord::new("b", 2),
                LogRecord::new("c", 3),
            ]);
            main.set_valid_count(2);
        }

        let mut merge = MergeStage::new(metrics.clone());
        assert!(matches!(merge.activate(&state), Activation::Continue));

        let main = state.main();
        assert_eq!(
            main.valid(),
            &[LogRecord::new("a", 11), LogRecord::new("b", 22)]
        );
        assert_eq!(metrics.join_hits_total(), 2);
        assert_eq!(metrics.join_misses_total(), 0);
        assert_eq!(metrics.cycles_total(), 1);
    }
}
