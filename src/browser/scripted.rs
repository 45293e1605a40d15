//! In-memory driver serving canned pages
//!
//! No JavaScript runs: when the sandbox wrapper is evaluated the driver
//! answers with the envelope the wrapper would have produced for the page's
//! configured return value. Used by the test suite.

use super::{
    BrowserDriver, EvaluateError, LaunchOptions, NavigationError, NavigationResult, Session,
    SessionError,
};
use crate::sandbox::{Envelope, PageLog, COMPAT_MARKER, SANDBOX_MARKER};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
enum Navigation {
    Load,
    /// Fails `times` times (forever when `None`), then loads
    Fail {
        error: NavigationError,
        times: Option<u32>,
    },
    Hang,
}

#[derive(Debug, Clone)]
enum Extraction {
    Return(Value),
    Throw(String),
    Syntax(String),
    Hang,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compat {
    Install,
    Fail,
    Hang,
}

/// A canned page
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    html: String,
    status: u16,
    redirect: Option<String>,
    delay: Duration,
    navigation: Navigation,
    extraction: Extraction,
    compat: Compat,
    logs: Vec<PageLog>,
}

impl ScriptedPage {
    /// A 200 page with the given HTML whose page function returns `{ "ok": true }`
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            status: 200,
            redirect: None,
            delay: Duration::ZERO,
            navigation: Navigation::Load,
            extraction: Extraction::Return(json!({ "ok": true })),
            compat: Compat::Install,
            logs: Vec::new(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Reports `url` as the final URL after navigation
    pub fn redirecting_to(mut self, url: &str) -> Self {
        self.redirect = Some(url.to_string());
        self
    }

    /// Navigation takes this long to complete
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_navigation(mut self, error: NavigationError, times: u32) -> Self {
        self.navigation = Navigation::Fail {
            error,
            times: Some(times),
        };
        self
    }

    pub fn always_failing(mut self, error: NavigationError) -> Self {
        self.navigation = Navigation::Fail { error, times: None };
        self
    }

    pub fn hanging_navigation(mut self) -> Self {
        self.navigation = Navigation::Hang;
        self
    }

    /// The page function returns this value
    pub fn returning(mut self, value: Value) -> Self {
        self.extraction = Extraction::Return(value);
        self
    }

    pub fn throwing(mut self, message: &str) -> Self {
        self.extraction = Extraction::Throw(message.to_string());
        self
    }

    pub fn syntax_error(mut self, message: &str) -> Self {
        self.extraction = Extraction::Syntax(message.to_string());
        self
    }

    pub fn hanging_extraction(mut self) -> Self {
        self.extraction = Extraction::Hang;
        self
    }

    /// Evaluating the page function panics inside the driver
    pub fn panicking(mut self) -> Self {
        self.extraction = Extraction::Panic;
        self
    }

    pub fn failing_compat(mut self) -> Self {
        self.compat = Compat::Fail;
        self
    }

    pub fn hanging_compat(mut self) -> Self {
        self.compat = Compat::Hang;
        self
    }

    /// Lines the page function writes through `context.log`
    pub fn with_logs(mut self, logs: Vec<(&str, &str)>) -> Self {
        self.logs = logs
            .into_iter()
            .map(|(level, message)| PageLog {
                level: level.to_string(),
                message: message.to_string(),
            })
            .collect();
        self
    }
}

struct Slot {
    page: ScriptedPage,
    visits: usize,
    failures: u32,
    compat_injections: usize,
}

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<String, Slot>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    session_failures_left: AtomicUsize,
    sessions_always_fail: AtomicBool,
    open_delay: Mutex<Duration>,
}

impl Inner {
    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`BrowserDriver`] over an in-memory site
///
/// Cloning shares the site, so a test can keep a handle to inspect counters
/// while the crawl owns another.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    inner: Arc<Inner>,
}

fn page_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, url: &str, page: ScriptedPage) {
        self.inner.pages.lock().insert(
            page_key(url),
            Slot {
                page,
                visits: 0,
                failures: 0,
                compat_injections: 0,
            },
        );
    }

    /// The next `count` session requests fail
    pub fn fail_sessions(&self, count: usize) {
        self.inner.session_failures_left.store(count, Ordering::SeqCst);
    }

    /// Opening a session takes this long
    pub fn delay_sessions(&self, delay: Duration) {
        *self.inner.open_delay.lock() = delay;
    }

    /// Every session request fails
    pub fn fail_all_sessions(&self) {
        self.inner.sessions_always_fail.store(true, Ordering::SeqCst);
    }

    /// Navigations to `url`, including failed ones
    pub fn visits(&self, url: &str) -> usize {
        self.inner
            .pages
            .lock()
            .get(&page_key(url))
            .map_or(0, |slot| slot.visits)
    }

    pub fn total_visits(&self) -> usize {
        self.inner.pages.lock().values().map(|slot| slot.visits).sum()
    }

    pub fn compat_injections(&self, url: &str) -> usize {
        self.inner
            .pages
            .lock()
            .get(&page_key(url))
            .map_or(0, |slot| slot.compat_injections)
    }

    /// Sessions currently open
    pub fn active_sessions(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Highest number of sessions ever open at once
    pub fn max_active_sessions(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Sessions released through `close`, not counting drops
    pub fn sessions_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open_session(&self, _options: &LaunchOptions) -> Result<Box<dyn Session>, SessionError> {
        let inner = &self.inner;
        if inner.sessions_always_fail.load(Ordering::SeqCst) {
            return Err(SessionError::Unavailable("scripted browser is down".to_string()));
        }
        let failed = inner
            .session_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SessionError::Unavailable(
                "scripted session failure".to_string(),
            ));
        }

        let delay = *inner.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        inner.opened.fetch_add(1, Ordering::SeqCst);
        let active = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(ScriptedSession {
            inner: Arc::clone(inner),
            current: None,
            closed: false,
        }))
    }
}

struct ScriptedSession {
    inner: Arc<Inner>,
    current: Option<String>,
    closed: bool,
}

impl ScriptedSession {
    fn current_page(&self) -> Result<ScriptedPage, EvaluateError> {
        let key = self.current.as_ref().ok_or(EvaluateError::NoPage)?;
        Ok(self
            .inner
            .pages
            .lock()
            .get(key)
            .map(|slot| slot.page.clone())
            .unwrap_or_else(|| ScriptedPage::html("").status(404)))
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn navigate(
        &mut self,
        url: &Url,
        timeout: Duration,
    ) -> Result<NavigationResult, NavigationError> {
        let key = page_key(url.as_str());
        let planned = {
            let mut pages = self.inner.pages.lock();
            match pages.get_mut(&key) {
                Some(slot) => {
                    slot.visits += 1;
                    let failure = match &slot.page.navigation {
                        Navigation::Fail { error, times } => {
                            let exhausted = times.map_or(false, |t| slot.failures >= t);
                            if exhausted {
                                None
                            } else {
                                slot.failures += 1;
                                Some(error.clone())
                            }
                        }
                        _ => None,
                    };
                    Some((slot.page.clone(), failure))
                }
                None => None,
            }
        };

        self.current = Some(key);
        let Some((page, failure)) = planned else {
            return Ok(NavigationResult {
                final_url: url.clone(),
                status: Some(404),
            });
        };

        let load = async {
            if !page.delay.is_zero() {
                tokio::time::sleep(page.delay).await;
            }
            if matches!(page.navigation, Navigation::Hang) {
                std::future::pending::<()>().await;
            }
        };
        if tokio::time::timeout(timeout, load).await.is_err() {
            return Err(NavigationError::Timeout {
                after_ms: timeout.as_millis() as u64,
            });
        }

        if let Some(error) = failure {
            return Err(error);
        }

        let final_url = page
            .redirect
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .unwrap_or_else(|| url.clone());
        Ok(NavigationResult {
            final_url,
            status: Some(page.status),
        })
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, EvaluateError> {
        let page = self.current_page()?;

        if script.starts_with(COMPAT_MARKER) {
            if let Some(key) = &self.current {
                if let Some(slot) = self.inner.pages.lock().get_mut(key) {
                    slot.compat_injections += 1;
                }
            }
            return match page.compat {
                Compat::Install => Ok(Value::Bool(true)),
                Compat::Fail => Err(EvaluateError::Script(
                    "compat layer failed to load".to_string(),
                )),
                Compat::Hang => std::future::pending().await,
            };
        }

        if !script.starts_with(SANDBOX_MARKER) {
            return Ok(Value::Null);
        }

        let envelope = match page.extraction {
            Extraction::Return(value) => Envelope::describe(&value, page.logs),
            Extraction::Throw(message) => Envelope::failure("thrown", &message, page.logs),
            Extraction::Syntax(message) => Envelope::failure("syntax", &message, page.logs),
            Extraction::Hang => std::future::pending().await,
            Extraction::Panic => panic!("scripted page function panicked"),
        };
        serde_json::to_string(&envelope)
            .map(Value::String)
            .map_err(|e| EvaluateError::Driver(e.to_string()))
    }

    async fn content(&mut self) -> Result<String, EvaluateError> {
        Ok(self.current_page()?.html)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if !self.closed {
            self.closed = true;
            self.inner.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.release();
        }
        Ok(())
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.release();
        }
    }
}
