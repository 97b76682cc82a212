//! Barrier-synchronized join pipeline.
//!
//! One cycle runs both readers in parallel, then the merge stage, then every
//! evaluator. Three [`StageBarrier`]s chain the groups into a ring:
//!
//! ```text
//!   evaluators --barrier--> readers --barrier--> merge --barrier--> evaluators
//! ```
//!
//! Stages never talk to each other directly; each one blocks on its start
//! signal, runs one activation against the shared [`PipelineState`], and
//! signals finished.

mod barrier;
mod evaluator;
mod merge;
mod reader;
mod stage;
mod state;

pub use barrier::{signal_channel, signal_channels, SignalReceiver, SignalSender, StageBarrier};
pub use evaluator::{EvaluationResult, Evaluator};
pub use merge::{join_batch, JoinReport, MergeStage};
pub use reader::{record_stream, PrimaryReader, RecordStream, SecondaryReader};
pub use stage::{run_stage, spawn_stage, Activation, Stage, StageChannels};
pub use state::{MainBatch, PipelineState};
