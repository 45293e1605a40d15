//! Run controller - top-level orchestration of one crawl
//!
//! This module:
//! - Validates the incoming request against the service configuration
//! - Builds the frontier, worker and scheduler for the run
//! - Seeds the frontier and waits for the scheduler to finish
//! - Turns the scheduler output into a [`RunReport`]

use crate::browser::BrowserDriver;
use crate::config::Config;
use crate::crawler::frontier::{Frontier, PushOutcome};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::{DispatchLimits, Scheduler, SchedulerOutput};
use crate::crawler::worker::PageWorker;
use crate::output::{Event, EventKind, EventSink, ResultStore, RunReport, RunStats, RunStatus};
use crate::request::{
    validate_json, validate_request, ConfigValidationError, CrawlRequest, RawCrawlRequest,
};
use crate::sandbox::CompatLayer;
use crate::state::{RunPhase, RunState, StateDelta};
use crate::url::UrlFilter;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs crawl requests against one browser driver
///
/// The controller holds no per-run state; one instance can serve many
/// concurrent runs.
pub struct RunController {
    config: Arc<Config>,
    driver: Arc<dyn BrowserDriver>,
    sink: Arc<dyn EventSink>,
}

impl RunController {
    pub fn new(config: Config, driver: Arc<dyn BrowserDriver>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config: Arc::new(config),
            driver,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validate(&self, raw: &RawCrawlRequest) -> Result<CrawlRequest, ConfigValidationError> {
        validate_request(raw, &self.config)
    }

    /// Like [`validate`](Self::validate), for a body that has not been deserialized
    pub fn validate_json(
        &self,
        body: &serde_json::Value,
    ) -> Result<CrawlRequest, ConfigValidationError> {
        validate_json(body, &self.config)
    }

    /// Validates `raw` and runs it to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - The run finished, completed or aborted
    /// * `Err(ConfigValidationError)` - The request was rejected; nothing ran
    pub async fn start_crawl(
        &self,
        raw: &RawCrawlRequest,
        cancel: CancellationToken,
    ) -> Result<RunReport, ConfigValidationError> {
        let request = self.validate(raw)?;
        Ok(self.run(&request, cancel).await)
    }

    /// Runs a validated request
    pub async fn run(&self, request: &CrawlRequest, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let request_hash = request.fingerprint();

        self.sink.emit(
            &Event::info(
                EventKind::RunStarted,
                format!("Starting crawl of {} seed URL(s)", request.seeds.len()),
            )
            .with_field("requestHash", request_hash.as_str())
            .with_field("seeds", request.seeds.len())
            .with_field("maxConcurrency", request.max_concurrency),
        );

        let scheduler = match self.build_scheduler(request, cancel) {
            Ok(scheduler) => scheduler,
            Err(reason) => {
                let mut state = RunState::new();
                if let Err(e) = state.transition(RunPhase::Aborted) {
                    tracing::error!("{}", e);
                }
                let output = SchedulerOutput {
                    state,
                    store: ResultStore::new(request.max_records),
                    errors: Vec::new(),
                    frontier: Default::default(),
                    abort_reason: Some(reason),
                };
                return self.finalize(output, request_hash, started_at);
            }
        };

        let output = scheduler.run().await;
        self.finalize(output, request_hash, started_at)
    }

    fn build_scheduler(
        &self,
        request: &CrawlRequest,
        cancel: CancellationToken,
    ) -> Result<Scheduler, String> {
        let filter = UrlFilter::new(&request.include_globs, &request.exclude_globs)
            .map_err(|e| e.to_string())?;

        let compat = if request.inject_jquery {
            let layer = CompatLayer::load(self.config.browser.compat_layer.as_deref())
                .map_err(|e| format!("compatibility layer unavailable: {}", e))?;
            Some(layer)
        } else {
            None
        };

        let worker = PageWorker::new(
            Arc::clone(&self.driver),
            request,
            &self.config.browser,
            compat,
            cancel.clone(),
        )
        .map_err(|e| e.to_string())?;

        let frontier = Frontier::new(filter, request.max_depth, request.url_fragments);
        let mut state = RunState::new();
        for seed in &request.seeds {
            if frontier.seed(seed.clone()) == PushOutcome::Queued {
                state.apply(StateDelta::PageQueued(1));
            }
        }

        Ok(Scheduler::new(
            frontier,
            worker,
            RetryPolicy::new(&self.config.retry, request.max_retries),
            DispatchLimits {
                max_concurrency: request.max_concurrency,
                max_pages: request.max_pages,
            },
            ResultStore::new(request.max_records),
            state,
            Arc::clone(&self.sink),
            cancel,
        ))
    }

    fn finalize(
        &self,
        output: SchedulerOutput,
        request_hash: String,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let finished_at = Utc::now();
        let counters = output.state.counters();
        let stats = RunStats {
            pages_visited: counters.pages_visited,
            pages_succeeded: counters.pages_succeeded,
            pages_failed: counters.pages_failed,
            pages_queued: counters.pages_queued,
            pages_filtered: output.frontier.filtered(),
            duplicates: output.frontier.duplicates,
            records_collected: counters.records_collected,
            records_dropped: counters.records_dropped,
            retries: counters.retries,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        };

        let status = match output.state.phase() {
            RunPhase::Aborted => RunStatus::Aborted,
            _ => RunStatus::Completed,
        };

        let event = match (&status, &output.abort_reason) {
            (RunStatus::Aborted, reason) => Event::warn(
                EventKind::RunAborted,
                format!(
                    "Crawl aborted: {}",
                    reason.as_deref().unwrap_or("unknown reason")
                ),
            ),
            (RunStatus::Completed, _) => Event::info(
                EventKind::RunCompleted,
                format!(
                    "Crawl completed: {} pages visited, {} records",
                    stats.pages_visited, stats.records_collected
                ),
            ),
        };
        self.sink.emit(
            &event
                .with_field("requestHash", request_hash.as_str())
                .with_field("pagesVisited", stats.pages_visited)
                .with_field("pagesFailed", stats.pages_failed)
                .with_field("recordsCollected", stats.records_collected)
                .with_field("durationMs", stats.duration_ms),
        );

        RunReport {
            status,
            reason: output.abort_reason.filter(|_| status == RunStatus::Aborted),
            records: output.store.into_records(),
            stats,
            errors: output.errors,
            request_hash,
        }
    }
}
