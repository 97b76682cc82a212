//! Join engine orchestration.
//!
//! Wires the pipeline for one run:
//! - Primary and secondary readers
//! - Merge stage joining against the keyed ring
//! - One or more evaluators collecting joined output
//! - Three barriers chaining the groups into a cycle
//!
//! The calling thread acts as the result sink: it blocks until every
//! evaluator has reported, then joins all worker threads.

use crate::config::PipelineConfig;
use crate::metrics::PipelineMetrics;
use crate::pipeline::{
    record_stream, signal_channel, signal_channels, spawn_stage, EvaluationResult, Evaluator,
    MergeStage, PipelineState, PrimaryReader, SecondaryReader, Stage, StageBarrier,
    StageChannels,
};
use crate::record::LogRecord;
use crate::{Error, PipelineError, Result};
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Results of one pipeline run.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// One result per evaluator, ordered by evaluator index
    pub results: Vec<EvaluationResult>,
    /// Cycles the pipeline completed (merge activations)
    pub cycles: u64,
}

impl JoinOutcome {
    /// Check if every evaluator finished without error.
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(EvaluationResult::is_ok)
    }

    /// Result of the first evaluator.
    pub fn first(&self) -> Option<&EvaluationResult> {
        self.results.first()
    }

    /// Data of the first evaluator, or the error that stopped it.
    pub fn into_data(self) -> Result<Vec<LogRecord>> {
        let first = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Pipeline(PipelineError::Disconnected("evaluator-0".into())))?;
        Ok(first.into_result()?)
    }
}

/// Stages for one run, before they are wired together.
pub struct StageSet {
    /// Reader stages; all run in parallel at the start of a cycle
    pub readers: Vec<Box<dyn Stage>>,
    /// The merge stage
    pub merge: Box<dyn Stage>,
    /// Evaluator stages; each reports exactly one result
    pub evaluators: Vec<Box<dyn Stage>>,
}

/// Stream-join engine.
pub struct StreamJoinEngine {
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
}

impl StreamJoinEngine {
    /// Create a new engine.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Share an existing metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get metrics.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Join `primary` against `secondary` and collect every evaluator's result.
    pub fn run<A, B>(&self, primary: A, secondary: B) -> Result<JoinOutcome>
    where
        A: IntoIterator<Item = LogRecord>,
        A::IntoIter: Send + 'static,
        B: IntoIterator<Item = LogRecord>,
        B::IntoIter: Send + 'static,
    {
        let readers: Vec<Box<dyn Stage>> = vec![
            Box::new(PrimaryReader::new(
                record_stream(primary),
                Arc::clone(&self.metrics),
            )),
            Box::new(SecondaryReader::new(
                record_stream(secondary),
                self.config.batch_size,
                Arc::clone(&self.metrics),
            )),
        ];

        let evaluators: Vec<Box<dyn Stage>> = (0..self.config.evaluators)
            .map(|i| Box::new(Evaluator::new(i, Arc::clone(&self.metrics))) as Box<dyn Stage>)
            .collect();

        self.run_stages(StageSet {
            readers,
            merge: Box::new(MergeStage::new(Arc::clone(&self.metrics))),
            evaluators,
        })
    }

    /// Wire arbitrary stages into the barrier ring and run them to completion.
    pub fn run_stages(&self, stages: StageSet) -> Result<JoinOutcome> {
        if stages.readers.is_empty() || stages.evaluators.is_empty() {
            return Err(Error::Config(
                "A pipeline needs at least one reader and one evaluator".into(),
            ));
        }

        let started = Instant::now();
        let state = Arc::new(PipelineState::new(&self.config)?);

        let (reader_start_tx, reader_start_rx) = signal_channels(stages.readers.len());
        let (reader_done_tx, reader_done_rx) = signal_channels(stages.readers.len());
        let (merge_start_tx, merge_start_rx) = signal_channel();
        let (merge_done_tx, merge_done_rx) = signal_channel();
        let (eval_start_tx, eval_start_rx) = signal_channels(stages.evaluators.len());
        let (eval_done_tx, eval_done_rx) = signal_channels(stages.evaluators.len());

        info!(
            readers = stages.readers.len(),
            evaluators = stages.evaluators.len(),
            batch_size = self.config.batch_size,
            secondary_capacity = self.config.secondary_capacity,
            "Starting join pipeline"
        );

        let mut workers: Vec<(String, JoinHandle<u64>)> = Vec::new();

        for (stage, (start, finished)) in stages
            .readers
            .into_iter()
            .zip(reader_start_rx.into_iter().zip(reader_done_tx))
        {
            let name = stage.name().to_string();
            let channels = StageChannels {
                start,
                finished,
                results: None,
            };
            workers.push((name, spawn_stage(stage, Arc::clone(&state), channels)?));
        }

        let merge_name = stages.merge.name().to_string();
        workers.push((
            merge_name,
            spawn_stage(
                stages.merge,
                Arc::clone(&state),
                StageChannels {
                    start: merge_start_rx,
                    finished: merge_done_tx,
                    results: None,
                },
            )?,
        ));

        let mut result_sinks: Vec<(String, Receiver<EvaluationResult>)> = Vec::new();
        for (stage, (start, finished)) in stages
            .evaluators
            .into_iter()
            .zip(eval_start_rx.into_iter().zip(eval_done_tx))
        {
            let name = stage.name().to_string();
            let (result_tx, result_rx) = bounded(1);
            let channels = StageChannels {
                start,
                finished,
                results: Some(result_tx),
            };
            workers.push((name.clone(), spawn_stage(stage, Arc::clone(&state), channels)?));
            result_sinks.push((name, result_rx));
        }

        // Barriers last: the primed one kicks off the first cycle.
        let to_merge = StageBarrier::new("readers-merge", reader_done_rx, vec![merge_start_tx]);
        let to_evaluators = StageBarrier::new("merge-evaluators", vec![merge_done_rx], eval_start_tx);
        let to_readers =
            StageBarrier::new("evaluators-readers", eval_done_rx, reader_start_tx).primed();

        let cycle_barrier = to_merge.spawn()?;
        workers.push(("merge-evaluators".into(), to_evaluators.spawn()?));
        workers.push(("evaluators-readers".into(), to_readers.spawn()?));

        // Result sink: exactly one result per evaluator.
        let mut results = Vec::with_capacity(result_sinks.len());
        let mut missing = None;
        for (name, sink) in result_sinks {
            match sink.recv() {
                Ok(result) => {
                    debug!(evaluator = %name, ok = result.is_ok(), "Result received");
                    results.push(result);
                }
                Err(_) => {
                    warn!(evaluator = %name, "Evaluator exited without a result");
                    missing.get_or_insert(name);
                }
            }
        }

        let mut panicked = Vec::new();
        for (name, handle) in workers {
            if handle.join().is_err() {
                panicked.push(name);
            }
        }
        let cycles = cycle_barrier
            .join()
            .map_err(|_| Error::Worker("barrier readers-merge panicked".into()))?;

        if !panicked.is_empty() {
            return Err(Error::Worker(format!(
                "worker threads panicked: {}",
                panicked.join(", ")
            )));
        }
        if let Some(name) = missing {
            return Err(PipelineError::Disconnected(name).into());
        }

        let outcome = JoinOutcome { results, cycles };
        info!(
            cycles,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Join pipeline finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Activation;

    fn rec(key: &str, value: i64) -> LogRecord {
        LogRecord::new(key, value)
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        assert!(StreamJoinEngine::new(PipelineConfig::new(0)).is_err());
    }

    #[test]
    fn test_single_batch_join() {
        let engine = StreamJoinEngine::new(PipelineConfig::new(4)).unwrap();
        let outcome = engine
            .run(
                vec![rec("a", 5), rec("z", 1)],
                vec![rec("a", 3), rec("b", 7)],
            )
            .unwrap();

        assert!(outcome.is_ok());
        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.into_data().unwrap(), vec![rec("a", 8), rec("z", 1)]);
        assert_eq!(engine.metrics().join_misses_total(), 1);
    }

    #[test]
    fn test_empty_primary_terminates() {
        let engine = StreamJoinEngine::new(PipelineConfig::new(4)).unwrap();
        let outcome = engine.run(Vec::new(), vec![rec("a", 1)]).unwrap();

        assert_eq!(outcome.cycles, 1);
        assert!(outcome.into_data().unwrap().is_empty());
    }

    #[test]
    fn test_run_stages_requires_evaluator() {
        let engine = StreamJoinEngine::new(PipelineConfig::new(2)).unwrap();
        let metrics = engine.metrics();

        let err = engine
            .run_stages(StageSet {
                readers: vec![Box::new(PrimaryReader::new(
                    record_stream(Vec::new()),
                    metrics.clone(),
                ))],
                merge: Box::new(MergeStage::new(metrics)),
                evaluators: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    struct Silent;

    impl Stage for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn activate(&mut self, _state: &PipelineState) -> Activation {
            panic!("evaluator blew up");
        }
    }

    #[test]
    fn test_panicking_evaluator_is_reported() {
        let engine = StreamJoinEngine::new(PipelineConfig::new(2)).unwrap();
        let metrics = engine.metrics();

        let err = engine
            .run_stages(StageSet {
                readers: vec![Box::new(PrimaryReader::new(
                    record_stream(vec![rec("a", 1)]),
                    metrics.clone(),
                ))],
                merge: Box::new(MergeStage::new(metrics.clone())),
                evaluators: vec![Box::new(Silent), Box::new(Evaluator::new(1, metrics))],
            })
            .unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }
}
