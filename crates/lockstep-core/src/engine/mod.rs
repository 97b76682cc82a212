//! Pipeline engine wiring stages and barriers together.

mod join;

pub use join::{JoinOutcome, StageSet, StreamJoinEngine};
