//! Page worker: processes one frontier entry end to end
//!
//! A worker owns its browser session for the duration of one page and
//! always closes it before returning. Every failure is folded into the
//! returned [`PageOutcome`]; `process` never returns an error.

use crate::browser::{BrowserDriver, LaunchOptions, NavigationError, Session, SessionError};
use crate::config::BrowserConfig;
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::parser::discover_links;
use crate::output::ExtractedRecord;
use crate::request::CrawlRequest;
use crate::sandbox::{CompatLayer, ExtractionError, PageContext, PageLog, Sandbox};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Slack added to the page load timeout for the host-side navigation guard
const NAVIGATION_GRACE: Duration = Duration::from_secs(2);

/// Why a page failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PageError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("run was cancelled before the page started")]
    Cancelled,

    #[error("worker crashed: {0}")]
    Internal(String),
}

impl PageError {
    /// Stable identifier used in reports and events
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::Navigation(e) => e.kind(),
            PageError::Extraction(e) => e.kind.as_str(),
            PageError::Session(_) => "session",
            PageError::Cancelled => "cancelled",
            PageError::Internal(_) => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    pub error: PageError,
    pub retryable: bool,
}

impl PageFailure {
    fn new(error: PageError) -> Self {
        let retryable = match &error {
            PageError::Navigation(e) => e.is_retryable(),
            PageError::Session(_) => true,
            PageError::Extraction(_) | PageError::Cancelled | PageError::Internal(_) => false,
        };
        Self { error, retryable }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PageError::Internal(message.into()))
    }

    /// Returns true if no browser session could be obtained
    pub fn is_session_failure(&self) -> bool {
        matches!(self.error, PageError::Session(_))
    }
}

/// Result of processing one entry
///
/// A single outcome can carry both a record and links: link discovery runs
/// even when extraction fails.
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub record: Option<ExtractedRecord>,
    pub links: Vec<Url>,
    pub failure: Option<PageFailure>,
    pub logs: Vec<PageLog>,
    /// URL after redirects, when navigation succeeded
    pub final_url: Option<Url>,
}

impl PageOutcome {
    pub fn failed(error: PageError) -> Self {
        Self {
            failure: Some(PageFailure::new(error)),
            ..Self::default()
        }
    }
}

/// Timeouts a worker applies around driver calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimeouts {
    pub session_acquire: Duration,
    pub page_load: Duration,
    pub compat_injection: Duration,
    pub link_discovery: Duration,
}

impl WorkerTimeouts {
    pub fn new(browser: &BrowserConfig, page_load: Duration) -> Self {
        Self {
            session_acquire: Duration::from_secs(browser.session_acquire_timeout),
            page_load,
            compat_injection: Duration::from_secs(browser.compat_injection_timeout),
            link_discovery: Duration::from_secs(browser.link_discovery_timeout),
        }
    }
}

pub struct PageWorker {
    driver: Arc<dyn BrowserDriver>,
    sandbox: Sandbox,
    compat: Option<CompatLayer>,
    launch: LaunchOptions,
    timeouts: WorkerTimeouts,
    link_selector: Option<String>,
    url_fragments: bool,
    max_depth: Option<u32>,
    cancel: CancellationToken,
}

impl PageWorker {
    /// Builds a worker for `request`
    ///
    /// `compat` is only used when the request asks for it.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        request: &CrawlRequest,
        browser: &BrowserConfig,
        compat: Option<CompatLayer>,
        cancel: CancellationToken,
    ) -> Result<Self, ExtractionError> {
        let sandbox = Sandbox::new(
            &request.page_function,
            request.page_function_timeout,
            request.required_fields.clone(),
        )?;

        Ok(Self {
            driver,
            sandbox,
            compat: compat.filter(|_| request.inject_jquery),
            launch: request.launch,
            timeouts: WorkerTimeouts::new(browser, request.page_load_timeout),
            link_selector: request.link_selector.clone(),
            url_fragments: request.url_fragments,
            max_depth: request.max_depth,
            cancel,
        })
    }

    /// Processes one entry
    pub async fn process(&self, entry: &FrontierEntry) -> PageOutcome {
        if self.cancel.is_cancelled() {
            return PageOutcome::failed(PageError::Cancelled);
        }

        let mut session = match self.acquire().await {
            Ok(session) => session,
            Err(e) => return PageOutcome::failed(e.into()),
        };

        let outcome = self.visit(session.as_mut(), entry).await;

        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close session for {}: {}", entry.url, e);
        }
        outcome
    }

    /// Opens a session, giving up after the acquire timeout
    ///
    /// The open runs in its own task so that a timeout never drops it halfway
    /// through creating a tab. A session that arrives late is closed.
    async fn acquire(&self) -> Result<Box<dyn Session>, SessionError> {
        let limit = self.timeouts.session_acquire;
        let driver = Arc::clone(&self.driver);
        let launch = self.launch;
        let mut opening = tokio::spawn(async move { driver.open_session(&launch).await });

        match tokio::time::timeout(limit, &mut opening).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SessionError::Unavailable(format!("session open failed: {}", e))),
            Err(_) => {
                tokio::spawn(close_late_session(opening));
                Err(SessionError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    async fn visit(&self, session: &mut dyn Session, entry: &FrontierEntry) -> PageOutcome {
        let final_url = match self.navigate(session, &entry.url).await {
            Ok(url) => url,
            Err(e) => return PageOutcome::failed(e.into()),
        };

        let compat = self.inject_compat(session, &entry.url).await;
        let ctx = PageContext {
            url: &entry.url,
            compat,
        };
        let output = self.sandbox.execute(session, &ctx).await;

        let links = self.discover(session, entry, &final_url).await;

        let (record, failure) = match output.result {
            Ok(record) => (Some(record), None),
            Err(e) => (None, Some(PageFailure::new(e.into()))),
        };
        PageOutcome {
            record,
            links,
            failure,
            logs: output.logs,
            final_url: Some(final_url),
        }
    }

    /// Loads the page and maps error statuses to navigation failures
    async fn navigate(&self, session: &mut dyn Session, url: &Url) -> Result<Url, NavigationError> {
        let limit = self.timeouts.page_load;
        let guarded = tokio::time::timeout(limit + NAVIGATION_GRACE, session.navigate(url, limit));
        let navigation = match guarded.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(NavigationError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })
            }
        };

        match navigation.status {
            Some(status) if status >= 400 => Err(NavigationError::Http { status }),
            _ => Ok(navigation.final_url),
        }
    }

    /// Returns true if the compatibility layer is installed in the page
    async fn inject_compat(&self, session: &mut dyn Session, url: &Url) -> bool {
        let Some(compat) = &self.compat else {
            return false;
        };

        let limit = self.timeouts.compat_injection;
        match tokio::time::timeout(limit, session.evaluate(compat.script())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!("Compatibility layer failed on {}: {}; continuing without it", url, e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Compatibility layer timed out after {}ms on {}; continuing without it",
                    limit.as_millis(),
                    url
                );
                false
            }
        }
    }

    async fn discover(&self, session: &mut dyn Session, entry: &FrontierEntry, base: &Url) -> Vec<Url> {
        let Some(selector) = &self.link_selector else {
            return Vec::new();
        };
        if self.max_depth.map_or(false, |max| entry.depth >= max) {
            return Vec::new();
        }

        let limit = self.timeouts.link_discovery;
        let html = match tokio::time::timeout(limit, session.content()).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                tracing::warn!("Could not read DOM of {}: {}", entry.url, e);
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("Reading DOM of {} timed out", entry.url);
                return Vec::new();
            }
        };

        match discover_links(&html, selector, base, self.url_fragments) {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("Link selector failed on {}: {}", entry.url, e);
                Vec::new()
            }
        }
    }
}

async fn close_late_session(opening: JoinHandle<Result<Box<dyn Session>, SessionError>>) {
    if let Ok(Ok(mut session)) = opening.await {
        tracing::debug!("Closing session that opened after the acquire timeout");
        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close late session: {}", e);
        }
    }
}
