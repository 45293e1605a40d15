//! Dispatch loop driving the page workers of one run
//!
//! This module handles:
//! - Keeping up to `max_concurrency` pages in flight
//! - Enforcing the page and record caps before every dispatch
//! - Resubmitting retryable failures with per-page backoff
//! - Escalating persistent session failures to an aborted run
//! - Stopping dispatch on cancellation while in-flight pages finish

use crate::crawler::frontier::{Frontier, FrontierEntry, FrontierStats, PushOutcome};
use crate::crawler::retry::{RetryPolicy, RetryQueue};
use crate::crawler::worker::{PageFailure, PageOutcome, PageWorker};
use crate::output::{Event, EventKind, EventLevel, EventSink, PageErrorEntry, ResultStore};
use crate::state::{RunPhase, RunState, StateDelta};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A frontier entry plus its attempt history
#[derive(Debug, Clone)]
pub struct PageJob {
    pub entry: FrontierEntry,
    /// Attempts made so far, including the one in flight
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Dispatch limits of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    pub max_concurrency: usize,
    /// Distinct pages to visit; `None` is unlimited
    pub max_pages: Option<u64>,
}

/// Everything the scheduler hands back when dispatch ends
#[derive(Debug)]
pub struct SchedulerOutput {
    pub state: RunState,
    pub store: ResultStore,
    pub errors: Vec<PageErrorEntry>,
    pub frontier: FrontierStats,
    /// Set when the run was aborted
    pub abort_reason: Option<String>,
}

enum Wake {
    Finished(Result<(PageJob, PageOutcome), JoinError>),
    RetryReady,
    Cancelled,
}

pub struct Scheduler {
    frontier: Frontier,
    worker: Arc<PageWorker>,
    policy: RetryPolicy,
    limits: DispatchLimits,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    state: RunState,
    store: ResultStore,
    retries: RetryQueue<PageJob>,
    errors: Vec<PageErrorEntry>,
    session_failures: u32,
    abort_reason: Option<String>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontier: Frontier,
        worker: PageWorker,
        policy: RetryPolicy,
        limits: DispatchLimits,
        store: ResultStore,
        state: RunState,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            frontier,
            worker: Arc::new(worker),
            policy,
            limits: DispatchLimits {
                max_concurrency: limits.max_concurrency.max(1),
                ..limits
            },
            sink,
            cancel,
            state,
            store,
            retries: RetryQueue::new(),
            errors: Vec::new(),
            session_failures: 0,
            abort_reason: None,
        }
    }

    /// Runs until the frontier drains, a cap is reached or the run aborts
    pub async fn run(mut self) -> SchedulerOutput {
        self.enter(RunPhase::Running);
        let mut in_flight: JoinSet<(PageJob, PageOutcome)> = JoinSet::new();
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() && self.abort_reason.is_none() {
                self.abort("cancelled");
            }

            while in_flight.len() < self.limits.max_concurrency {
                match self.next_job() {
                    Some(job) => self.dispatch(&mut in_flight, job),
                    None => break,
                }
            }

            if in_flight.is_empty() && !self.has_pending_work() {
                break;
            }

            let retry_at = if self.dispatch_open() && in_flight.len() < self.limits.max_concurrency
            {
                self.retries.next_deadline()
            } else {
                None
            };

            let wake = tokio::select! {
                Some(joined) = in_flight.join_next() => Wake::Finished(joined),
                _ = sleep_until(retry_at), if retry_at.is_some() => Wake::RetryReady,
                _ = cancel.cancelled(), if self.abort_reason.is_none() => Wake::Cancelled,
                else => break,
            };

            match wake {
                Wake::Finished(Ok((job, outcome))) => self.handle(job, outcome),
                Wake::Finished(Err(e)) => tracing::error!("Page task failed to join: {}", e),
                Wake::RetryReady => {}
                Wake::Cancelled => self.abort("cancelled"),
            }
        }

        self.finish()
    }

    fn dispatch_open(&self) -> bool {
        self.abort_reason.is_none() && !self.store.is_full()
    }

    fn page_cap_reached(&self) -> bool {
        self.limits
            .max_pages
            .map_or(false, |max| self.state.counters().pages_visited >= max)
    }

    fn has_pending_work(&self) -> bool {
        if !self.dispatch_open() {
            return false;
        }
        !self.retries.is_empty() || (!self.page_cap_reached() && !self.frontier.is_empty())
    }

    /// Picks the next page to start, retries first
    ///
    /// The record cap blocks every dispatch; the page cap blocks new pages
    /// but not retries of pages already counted.
    fn next_job(&mut self) -> Option<PageJob> {
        if !self.dispatch_open() {
            return None;
        }
        if let Some(job) = self.retries.pop_ready(Instant::now()) {
            return Some(job);
        }
        if self.page_cap_reached() {
            return None;
        }
        let entry = self.frontier.pop()?;
        self.state.apply(StateDelta::PageVisited);
        Some(PageJob {
            entry,
            attempts: 0,
            last_error: None,
        })
    }

    fn dispatch(&mut self, in_flight: &mut JoinSet<(PageJob, PageOutcome)>, mut job: PageJob) {
        job.attempts += 1;
        self.emit(
            Event::new(
                EventKind::PageStarted,
                EventLevel::Debug,
                format!("Processing {}", job.entry.url),
            )
            .with_field("url", job.entry.url.as_str())
            .with_field("depth", job.entry.depth)
            .with_field("attempt", job.attempts),
        );

        let worker = Arc::clone(&self.worker);
        in_flight.spawn(async move {
            let outcome = AssertUnwindSafe(worker.process(&job.entry))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| PageOutcome {
                    failure: Some(PageFailure::internal(panic_message(panic))),
                    ..PageOutcome::default()
                });
            (job, outcome)
        });
    }

    fn handle(&mut self, mut job: PageJob, outcome: PageOutcome) {
        let url = job.entry.url.clone();

        for log in outcome.logs {
            let level = if log.level == "error" {
                EventLevel::Error
            } else {
                EventLevel::Info
            };
            self.emit(
                Event::new(EventKind::PageLog, level, log.message)
                    .with_field("url", url.as_str())
                    .with_field("level", log.level),
            );
        }

        let mut queued = 0;
        for link in outcome.links {
            if self.frontier.push(link, job.entry.depth + 1) == PushOutcome::Queued {
                queued += 1;
            }
        }
        if queued > 0 {
            self.state.apply(StateDelta::PageQueued(queued));
        }

        if let Some(record) = outcome.record {
            if self.store.push(record) {
                self.state.apply(StateDelta::RecordCollected);
            } else {
                self.state.apply(StateDelta::RecordDropped);
                self.emit(
                    Event::warn(
                        EventKind::RecordDropped,
                        format!("Record from {} dropped: result limit reached", url),
                    )
                    .with_field("url", url.as_str()),
                );
            }
        }

        let Some(failure) = outcome.failure else {
            self.session_failures = 0;
            self.state.apply(StateDelta::PageSucceeded);
            self.emit(
                Event::info(EventKind::PageCompleted, format!("Completed {}", url))
                    .with_field("url", url.as_str())
                    .with_field("depth", job.entry.depth)
                    .with_field("attempts", job.attempts)
                    .with_field("links", queued),
            );
            return;
        };

        if failure.is_session_failure() {
            self.session_failures += 1;
            if self.session_failures >= self.policy.session_failure_limit {
                self.abort(&format!("browser unavailable: {}", failure.error));
            }
        } else {
            self.session_failures = 0;
        }

        job.last_error = Some(failure.error.to_string());
        if failure.retryable && self.policy.allows_retry(job.attempts) && self.dispatch_open() {
            let delay = self.policy.delay(job.attempts);
            self.state.apply(StateDelta::RetryScheduled);
            self.emit(
                Event::warn(
                    EventKind::RetryScheduled,
                    format!(
                        "Retrying {} in {}ms after: {}",
                        url,
                        delay.as_millis(),
                        failure.error
                    ),
                )
                .with_field("url", url.as_str())
                .with_field("attempt", job.attempts)
                .with_field("delayMs", delay.as_millis() as u64)
                .with_field("kind", failure.error.kind()),
            );
            self.retries.schedule(job, Instant::now() + delay);
            return;
        }

        self.record_failure(&job, failure.error.kind(), failure.error.to_string());
    }

    fn record_failure(&mut self, job: &PageJob, kind: &str, message: String) {
        self.state.apply(StateDelta::PageFailed);
        self.emit(
            Event::new(
                EventKind::PageFailed,
                EventLevel::Error,
                format!("Failed {}: {}", job.entry.url, message),
            )
            .with_field("url", job.entry.url.as_str())
            .with_field("depth", job.entry.depth)
            .with_field("attempts", job.attempts)
            .with_field("kind", kind),
        );
        self.errors.push(PageErrorEntry {
            url: job.entry.url.to_string(),
            depth: job.entry.depth,
            attempts: job.attempts,
            kind: kind.to_string(),
            message,
        });
    }

    fn abort(&mut self, reason: &str) {
        if self.abort_reason.is_none() {
            tracing::warn!("Stopping dispatch: {}", reason);
            self.abort_reason = Some(reason.to_string());
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        if let Err(e) = self.state.transition(phase) {
            tracing::error!("{}", e);
        }
    }

    fn finish(mut self) -> SchedulerOutput {
        for job in self.retries.drain() {
            let message = format!(
                "retry abandoned after {} attempts; last error: {}",
                job.attempts,
                job.last_error.as_deref().unwrap_or("unknown")
            );
            self.record_failure(&job, "abandoned", message);
        }

        let phase = if self.abort_reason.is_some() {
            RunPhase::Aborted
        } else {
            RunPhase::Completed
        };
        self.enter(phase);

        SchedulerOutput {
            state: self.state,
            store: self.store,
            errors: self.errors,
            frontier: self.frontier.stats(),
            abort_reason: self.abort_reason,
        }
    }

    fn emit(&self, event: Event) {
        self.sink.emit(&event);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
