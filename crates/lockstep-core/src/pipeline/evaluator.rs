//! Evaluator stage: accumulates joined batches until end of stream.

use super::stage::{Activation, Stage};
use super::state::PipelineState;
use crate::metrics::PipelineMetrics;
use crate::record::LogRecord;
use crate::PipelineError;
use std::sync::Arc;
use tracing::{error, info, trace};

/// Terminal result of one evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Index of the evaluator that produced this result
    pub evaluator: usize,
    /// Records accumulated before the evaluator stopped
    pub data: Vec<LogRecord>,
    /// Set when the evaluator stopped on a protocol violation
    pub error: Option<PipelineError>,
    /// Cycles the evaluator consumed
    pub cycles: u64,
}

impl EvaluationResult {
    /// A clean end-of-stream result.
    pub fn success(evaluator: usize, data: Vec<LogRecord>, cycles: u64) -> Self {
        Self {
            evaluator,
            data,
            error: None,
            cycles,
        }
    }

    /// A result cut short by an error.
    pub fn failure(
        evaluator: usize,
        data: Vec<LogRecord>,
        error: PipelineError,
        cycles: u64,
    ) -> Self {
        Self {
            evaluator,
            data,
            error: Some(error),
            cycles,
        }
    }

    /// Check if the evaluator finished without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into the accumulated data, or the error that stopped it.
    pub fn into_result(self) -> Result<Vec<LogRecord>, PipelineError> {
        match self.error {
            None => Ok(self.data),
            Some(err) => Err(err),
        }
    }
}

/// Collects every joined batch into a private accumulator.
pub struct Evaluator {
    index: usize,
    name: String,
    accumulator: Vec<LogRecord>,
    cycles: u64,
    metrics: Arc<PipelineMetrics>,
}

impl Evaluator {
    /// Create evaluator number `index`.
    pub fn new(index: usize, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            index,
            name: format!("evaluator-{index}"),
            accumulator: Vec::new(),
            cycles: 0,
            metrics,
        }
    }
}

impl Stage for Evaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&mut self, state: &PipelineState) -> Activation {
        let main = state.main();

        if main.valid_count() > main.capacity() {
            let err = PipelineError::CapacityExceeded {
                valid: main.valid_count(),
                capacity: main.capacity(),
            };
            error!(stage = %self.name, error = %err, "Evaluator stopping");
            self.metrics.record_evaluator_error();
            return Activation::Finish(EvaluationResult::failure(
                self.index,
                std::mem::take(&mut self.accumulator),
                err,
                self.cycles,
            ));
        }

        self.accumulator.extend_from_slice(main.valid());
        self.cycles += 1;

        trace!(
            stage = %self.name,
            cycle = self.cycles,
            batch = main.valid_count(),
            total = self.accumulator.len(),
            "Batch accumulated"
        );

        if main.end_of_stream() {
            info!(
                stage = %self.name,
                records = self.accumulator.len(),
                cycles = self.cycles,
                "End of stream reached"
            );
            return Activation::Finish(EvaluationResult::success(
                self.index,
                std::mem::take(&mut self.accumulator),
                self.cycles,
            ));
        }

        Activation::Continue
    }
}
