//! Stage trait and the worker loop that drives it.

use super::barrier::{SignalReceiver, SignalSender};
use super::evaluator::EvaluationResult;
use super::state::PipelineState;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// What a stage wants after one activation.
#[derive(Debug)]
pub enum Activation {
    /// Signal finished and wait for the next start.
    Continue,
    /// Signal finished, then leave the pipeline.
    Retire,
    /// Report a terminal result and leave without signalling finished.
    Finish(EvaluationResult),
}

/// One step of the pipeline cycle.
///
/// `activate` runs once per start signal and is the only place a stage
/// touches the shared state.
pub trait Stage: Send {
    /// Stage name used in logs and the thread name.
    fn name(&self) -> &str;

    /// Run one activation against the shared state.
    fn activate(&mut self, state: &PipelineState) -> Activation;
}

/// Channel ends wiring a stage into its barriers.
pub struct StageChannels {
    /// Start signals from the upstream barrier
    pub start: SignalReceiver,
    /// Finished signals to the downstream barrier
    pub finished: SignalSender,
    /// Where terminal results go, for stages that produce one
    pub results: Option<Sender<EvaluationResult>>,
}

/// Drive a stage until it leaves the pipeline or its start channel closes.
///
/// Returns the number of activations.
pub fn run_stage(
    mut stage: Box<dyn Stage>,
    state: Arc<PipelineState>,
    channels: StageChannels,
) -> u64 {
    let mut activations = 0;

    while channels.start.recv().is_ok() {
        activations += 1;

        match stage.activate(&state) {
            Activation::Continue => {
                if channels.finished.send(()).is_err() {
                    debug!(stage = %stage.name(), "Downstream barrier gone");
                    break;
                }
            }
            Activation::Retire => {
                let _ = channels.finished.send(());
                debug!(stage = %stage.name(), activations, "Stage retired");
                break;
            }
            Activation::Finish(result) => {
                match &channels.results {
                    Some(results) => {
                        if results.send(result).is_err() {
                            warn!(stage = %stage.name(), "Result sink closed before result was sent");
                        }
                    }
                    None => {
                        warn!(stage = %stage.name(), "Stage produced a result but has no result sink");
                    }
                }
                break;
            }
        }
    }

    debug!(stage = %stage.name(), activations, "Stage stopped");
    activations
}

/// Run a stage on a dedicated named thread.
pub fn spawn_stage(
    stage: Box<dyn Stage>,
    state: Arc<PipelineState>,
    channels: StageChannels,
) -> std::io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name(format!("stage-{}", stage.name()))
        .spawn(move || run_stage(stage, state, channels))
}
