//! Lockstep Core - barrier-synchronized stream join engine
//!
//! This library joins a primary stream of keyed records against a bounded,
//! recent window of a secondary stream:
//!
//! - Fixed-capacity keyed ring buffer holding the secondary window
//! - Stage threads advanced in lockstep by N-to-M barriers
//! - Bounded batches through a shared main buffer
//! - One collected result per evaluator
//!
//! ```no_run
//! use lockstep_core::{LogRecord, PipelineConfig, StreamJoinEngine};
//!
//! let engine = StreamJoinEngine::new(PipelineConfig::new(10))?;
//! let outcome = engine.run(
//!     vec![LogRecord::new("abc", 5)],
//!     vec![LogRecord::new("abc", 3)],
//! )?;
//! assert_eq!(outcome.into_data()?, vec![LogRecord::new("abc", 8)]);
//! # Ok::<(), lockstep_core::Error>(())
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;

// Re-export commonly used types
pub use buffer::KeyedRingBuffer;
pub use config::{Config, PipelineConfig};
pub use engine::{JoinOutcome, StreamJoinEngine};
pub use error::{BufferError, PipelineError};
pub use error::{Error, Result};
pub use pipeline::EvaluationResult;
pub use record::LogRecord;
