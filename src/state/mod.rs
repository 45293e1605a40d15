//! State module for tracking run progress
//!
//! # Components
//!
//! - `RunPhase`: Idle, Running, then Completed or Aborted
//! - `RunState`: the phase plus run-wide counters, changed only through `StateDelta`s

mod run_state;

pub use run_state::{RunCounters, RunPhase, RunState, StateDelta};
