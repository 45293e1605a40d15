use serde::Deserialize;
use std::path::PathBuf;

/// Service configuration for Ripple-Harvest
///
/// Every section is optional; a missing file section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub defaults: RequestDefaults,
    pub retry: RetryConfig,
    pub limits: LimitsConfig,
}

/// HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3001".to_string(),
        }
    }
}

/// Browser driver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Path to a Chrome/Chromium executable; auto-detected when absent
    pub executable: Option<PathBuf>,

    /// Pass `--no-sandbox` to the browser (needed in some containers)
    pub no_sandbox: bool,

    /// Script file used as the compatibility layer instead of the built-in shim
    pub compat_layer: Option<PathBuf>,

    /// Seconds to wait for a browser session
    pub session_acquire_timeout: u64,

    /// Seconds to wait for compatibility layer injection
    pub compat_injection_timeout: u64,

    /// Seconds to wait for the rendered DOM during link discovery
    pub link_discovery_timeout: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: false,
            compat_layer: None,
            session_acquire_timeout: 30,
            compat_injection_timeout: 10,
            link_discovery_timeout: 10,
        }
    }
}

/// Values used for request fields the caller leaves out
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequestDefaults {
    pub link_selector: Option<String>,
    pub url_fragments: bool,
    pub inject_jquery: bool,
    pub headless: bool,
    pub ignore_ssl_errors: bool,
    pub ignore_cors_and_csp: bool,
    pub download_media_files: bool,
    pub download_css_files: bool,
    pub max_page_retries: u32,
    /// 0 means unlimited
    pub max_pages_per_run: u64,
    /// 0 means unlimited
    pub max_result_records: u64,
    /// 0 means unlimited
    pub max_crawling_depth: u32,
    pub max_concurrency: u32,
    /// Seconds
    pub page_load_timeout: u64,
    /// Seconds
    pub page_function_timeout: u64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            link_selector: None,
            url_fragments: false,
            inject_jquery: false,
            headless: true,
            ignore_ssl_errors: false,
            ignore_cors_and_csp: false,
            download_media_files: true,
            download_css_files: true,
            max_page_retries: 3,
            max_pages_per_run: 0,
            max_result_records: 0,
            max_crawling_depth: 0,
            max_concurrency: 5,
            page_load_timeout: 60,
            page_function_timeout: 60,
        }
    }
}

/// Backoff applied to retryable page failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,

    /// Consecutive session failures after which the run is aborted
    pub session_failure_limit: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            session_failure_limit: 5,
        }
    }
}

/// Upper bounds enforced on incoming requests
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitsConfig {
    pub max_concurrency: u32,
    pub max_page_retries: u32,
    pub max_page_function_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            max_page_retries: 10,
            max_page_function_bytes: 64 * 1024,
        }
    }
}
