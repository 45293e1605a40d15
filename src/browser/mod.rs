//! Headless browser collaborator
//!
//! The crawl core never talks to a browser engine directly. It opens
//! sessions through a [`BrowserDriver`] and drives them through the
//! [`Session`] trait:
//!
//! - [`chrome::ChromeDriver`] drives Chrome/Chromium over the DevTools protocol
//! - [`scripted::ScriptedDriver`] serves canned pages from memory, for tests

pub mod chrome;
pub mod scripted;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use chrome::ChromeDriver;
pub use scripted::{ScriptedDriver, ScriptedPage};

/// Browser launch options taken from a crawl request
///
/// Sessions opened with equal options may share one browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchOptions {
    pub headless: bool,
    pub ignore_tls_errors: bool,
    /// Disable CORS and page Content-Security-Policy
    pub bypass_csp: bool,
    pub allow_media: bool,
    pub allow_css: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            ignore_tls_errors: false,
            bypass_csp: false,
            allow_media: true,
            allow_css: true,
        }
    }
}

/// Outcome of a successful navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    /// URL after redirects
    pub final_url: Url,
    /// HTTP status of the main document, when the driver can observe it
    pub status: Option<u16>,
}

/// Failure to load a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("navigation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("HTTP status {status}")]
    Http { status: u16 },
}

impl NavigationError {
    /// Returns true if a later attempt may succeed
    ///
    /// Timeouts, network errors and 5xx responses are transient; 4xx
    /// responses and DNS failures are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            NavigationError::Timeout { .. } | NavigationError::Network(_) => true,
            NavigationError::Http { status } => *status >= 500,
            NavigationError::Dns(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NavigationError::Timeout { .. } => "navigation_timeout",
            NavigationError::Network(_) => "network",
            NavigationError::Dns(_) => "dns",
            NavigationError::Http { .. } => "http_status",
        }
    }
}

/// Failure to obtain or release a browser session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting {after_ms}ms for a browser session")]
    Timeout { after_ms: u64 },

    #[error("failed to close session: {0}")]
    Close(String),
}

/// Failure to evaluate a script or read the page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluateError {
    #[error("script raised: {0}")]
    Script(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("no page is loaded in this session")]
    NoPage,
}

/// Opens browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Opens a fresh, isolated session
    async fn open_session(&self, options: &LaunchOptions) -> Result<Box<dyn Session>, SessionError>;

    /// Releases every browser process held by the driver
    async fn shutdown(&self) {}
}

/// One browser tab, exclusively owned by a worker
#[async_trait]
pub trait Session: Send {
    /// Loads `url`, giving up after `timeout`
    async fn navigate(&mut self, url: &Url, timeout: Duration)
        -> Result<NavigationResult, NavigationError>;

    /// Evaluates a script in the page and returns its (awaited) value
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, EvaluateError>;

    /// Returns the rendered DOM as HTML
    async fn content(&mut self) -> Result<String, EvaluateError>;

    /// Closes the tab; the session is unusable afterwards
    async fn close(&mut self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_retryability() {
        assert!(NavigationError::Timeout { after_ms: 10 }.is_retryable());
        assert!(NavigationError::Network("reset".into()).is_retryable());
        assert!(NavigationError::Http { status: 503 }.is_retryable());
        assert!(!NavigationError::Http { status: 404 }.is_retryable());
        assert!(!NavigationError::Http { status: 403 }.is_retryable());
        assert!(!NavigationError::Dns("no such host".into()).is_retryable());
    }
}
