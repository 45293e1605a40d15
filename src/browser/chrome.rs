//! Chrome DevTools driver
//!
//! One Chrome process is launched per distinct set of [`LaunchOptions`] and
//! reused for every session with those options. Each session is a fresh tab.

use super::{
    BrowserDriver, EvaluateError, LaunchOptions, NavigationError, NavigationResult, Session,
    SessionError,
};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

/// URL patterns blocked when media downloads are disabled
const MEDIA_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.mp4", "*.webm",
    "*.mp3", "*.ogg", "*.wav", "*.woff", "*.woff2", "*.ttf",
];

const CSS_PATTERNS: &[&str] = &["*.css"];

/// Reads the main document's HTTP status from the Navigation Timing API
const STATUS_PROBE: &str = "(() => { const e = performance.getEntriesByType('navigation')[0]; \
     return e && e.responseStatus ? e.responseStatus : null; })()";

struct RunningBrowser {
    /// Shared with in-progress `new_page` calls, which run outside the lock
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

/// [`BrowserDriver`] backed by Chrome/Chromium via `chromiumoxide`
pub struct ChromeDriver {
    config: BrowserConfig,
    browsers: Mutex<HashMap<LaunchOptions, RunningBrowser>>,
}

impl ChromeDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browsers: Mutex::new(HashMap::new()),
        }
    }

    fn chrome_config(&self, options: &LaunchOptions) -> Result<ChromeConfig, SessionError> {
        let mut builder = ChromeConfig::builder()
            .request_timeout(Duration::from_secs(30))
            .window_size(1366, 768);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }
        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if options.ignore_tls_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if options.bypass_csp {
            builder = builder.arg("--disable-web-security");
        }

        builder = builder
            .arg("--disable-background-networking")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--mute-audio");

        builder.build().map_err(SessionError::Launch)
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<RunningBrowser, SessionError> {
        let chrome_config = self.chrome_config(options)?;
        info!(headless = options.headless, "Launching browser");

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let message = e.to_string();
                    // chromiumoxide cannot decode some newer CDP events
                    if message.contains("did not match any variant")
                        || message.contains("Failed to deserialize WS response")
                    {
                        trace!("Ignoring undecodable CDP message: {}", message);
                    } else {
                        warn!("Browser handler error: {}", message);
                    }
                }
            }
            debug!("Browser handler finished");
        });

        Ok(RunningBrowser {
            browser: Arc::new(browser),
            handler,
        })
    }

    async fn prepare_page(page: &Page, options: &LaunchOptions) -> Result<(), CdpError> {
        if options.bypass_csp {
            page.execute(SetBypassCspParams::new(true)).await?;
        }

        let mut blocked: Vec<String> = Vec::new();
        if !options.allow_media {
            blocked.extend(MEDIA_PATTERNS.iter().map(|p| p.to_string()));
        }
        if !options.allow_css {
            blocked.extend(CSS_PATTERNS.iter().map(|p| p.to_string()));
        }
        if !blocked.is_empty() {
            page.execute(EnableParams::default()).await?;
            page.execute(SetBlockedUrLsParams::new(blocked)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open_session(&self, options: &LaunchOptions) -> Result<Box<dyn Session>, SessionError> {
        let browser = {
            let mut browsers = self.browsers.lock().await;

            if let Some(running) = browsers.get(options) {
                if running.handler.is_finished() {
                    warn!("Browser process exited, relaunching");
                    browsers.remove(options);
                }
            }
            if !browsers.contains_key(options) {
                let running = self.launch(options).await?;
                browsers.insert(*options, running);
            }
            browsers
                .get(options)
                .map(|running| Arc::clone(&running.browser))
                .ok_or_else(|| SessionError::Unavailable("browser not running".to_string()))?
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        if let Err(e) = Self::prepare_page(&page, options).await {
            warn!("Failed to apply launch options to page: {}", e);
        }

        Ok(Box::new(ChromeSession { page: Some(page) }))
    }

    async fn shutdown(&self) {
        let mut browsers = self.browsers.lock().await;
        for (_, mut running) in browsers.drain() {
            match Arc::get_mut(&mut running.browser) {
                Some(browser) => {
                    if let Err(e) = browser.close().await {
                        warn!("Failed to close browser: {}", e);
                    }
                    if let Err(e) = browser.wait().await {
                        debug!("Failed to wait for browser exit: {}", e);
                    }
                }
                None => warn!("Browser is still opening a tab; dropping it without a clean close"),
            }
            running.handler.abort();
        }
    }
}

/// One Chrome tab
struct ChromeSession {
    page: Option<Page>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, EvaluateError> {
        self.page.as_ref().ok_or(EvaluateError::NoPage)
    }
}

/// Maps a navigation failure reported by Chrome to a [`NavigationError`]
fn classify_navigation_error(message: String, timeout: Duration) -> NavigationError {
    if message.contains("ERR_NAME_NOT_RESOLVED") || message.contains("ERR_NAME_RESOLUTION_FAILED") {
        NavigationError::Dns(message)
    } else if message.contains("ERR_TIMED_OUT") || message.contains("Timeout") {
        NavigationError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }
    } else {
        NavigationError::Network(message)
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn navigate(
        &mut self,
        url: &Url,
        timeout: Duration,
    ) -> Result<NavigationResult, NavigationError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| NavigationError::Network("session is closed".to_string()))?;

        match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
            Err(_) => {
                return Err(NavigationError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => return Err(classify_navigation_error(e.to_string(), timeout)),
            Ok(Ok(_)) => {}
        }

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        let status = match page.evaluate(STATUS_PROBE).await {
            Ok(result) => result
                .value()
                .and_then(|v| v.as_u64())
                .and_then(|s| u16::try_from(s).ok()),
            Err(e) => {
                debug!("Could not read response status for {}: {}", url, e);
                None
            }
        };

        Ok(NavigationResult { final_url, status })
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, EvaluateError> {
        let page = self.page()?;
        match page.evaluate(script).await {
            Ok(result) => Ok(result.value().cloned().unwrap_or(serde_json::Value::Null)),
            Err(CdpError::JavascriptException(details)) => {
                Err(EvaluateError::Script(format!("{:?}", details)))
            }
            Err(e) => Err(EvaluateError::Driver(e.to_string())),
        }
    }

    async fn content(&mut self) -> Result<String, EvaluateError> {
        self.page()?
            .content()
            .await
            .map_err(|e| EvaluateError::Driver(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| SessionError::Close(e.to_string())),
            None => Ok(()),
        }
    }
}
