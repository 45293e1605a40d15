//! Output module: extracted records, the result store, run reports and
//! progress events
//!
//! This module handles:
//! - Collecting extracted records in insertion order under a cap
//! - Summarizing a run as a [`RunReport`]
//! - Delivering progress [`Event`]s to pluggable sinks

pub mod events;
mod record;
pub mod report;
mod store;

pub use events::{
    BroadcastSink, Event, EventKind, EventLevel, EventSink, FanoutSink, MemorySink, TracingSink,
};
pub use record::{ExtractedRecord, FieldValue};
pub use report::{print_report, PageErrorEntry, RunReport, RunStats, RunStatus};
pub use store::ResultStore;
