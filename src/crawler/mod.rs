//! Crawler module: the crawl engine of one run
//!
//! This module contains the core crawling logic, including:
//! - The URL frontier with deduplication and glob filtering
//! - Link discovery over the rendered DOM
//! - The page worker driving one browser session per page
//! - Retry policy and the dispatch loop
//! - Overall run coordination

mod coordinator;
pub mod frontier;
mod parser;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use coordinator::RunController;
pub use frontier::{Frontier, FrontierEntry, FrontierStats, PushOutcome};
pub use parser::discover_links;
pub use retry::{RetryPolicy, RetryQueue};
pub use scheduler::{DispatchLimits, PageJob, Scheduler, SchedulerOutput};
pub use worker::{PageError, PageFailure, PageOutcome, PageWorker, WorkerTimeouts};
