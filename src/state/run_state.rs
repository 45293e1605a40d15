//! Run-wide progress tracking
//!
//! The run controller owns the single [`RunState`] of a run. Workers never
//! touch it; their outcomes are turned into [`StateDelta`]s by the dispatch
//! loop and applied here.

use crate::HarvestError;
use serde::Serialize;
use std::fmt;

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Validated and seeded, nothing dispatched yet
    Idle,

    /// Pages are being dispatched
    Running,

    // ===== Terminal States =====
    /// The frontier drained or a cap was reached
    Completed,

    /// Cancelled, or a run-scoped error (browser unavailable)
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if a run may move from `self` to `next`
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Aborted)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A counter change reported by the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateDelta {
    PageQueued(u64),
    PageVisited,
    PageSucceeded,
    PageFailed,
    RecordCollected,
    RecordDropped,
    RetryScheduled,
}

/// Run-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub pages_visited: u64,
    pub pages_queued: u64,
    pub pages_succeeded: u64,
    pub pages_failed: u64,
    pub records_collected: u64,
    pub records_dropped: u64,
    pub retries: u64,
}

#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    counters: RunCounters,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            counters: RunCounters::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Moves to `next`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The transition is allowed
    /// * `Err(HarvestError::InvalidTransition)` - It is not; the phase is unchanged
    pub fn transition(&mut self, next: RunPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn apply(&mut self, delta: StateDelta) {
        let c = &mut self.counters;
        match delta {
            StateDelta::PageQueued(n) => c.pages_queued += n,
            StateDelta::PageVisited => c.pages_visited += 1,
            StateDelta::PageSucceeded => c.pages_succeeded += 1,
            StateDelta::PageFailed => c.pages_failed += 1,
            StateDelta::RecordCollected => c.records_collected += 1,
            StateDelta::RecordDropped => c.records_dropped += 1,
            StateDelta::RetryScheduled => c.retries += 1,
        }
    }
}
