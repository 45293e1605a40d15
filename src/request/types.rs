use crate::browser::LaunchOptions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

/// A start URL as it appears on the wire
///
/// Accepts both `"https://..."` and `{ "url": "https://..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartUrl {
    Plain(String),
    Object { url: String },
}

impl StartUrl {
    pub fn as_str(&self) -> &str {
        match self {
            StartUrl::Plain(url) => url,
            StartUrl::Object { url } => url,
        }
    }
}

impl From<&str> for StartUrl {
    fn from(url: &str) -> Self {
        StartUrl::Plain(url.to_string())
    }
}

/// Crawl request as submitted by a caller, before validation
///
/// Absent fields fall back to the service defaults. Numeric fields are
/// signed so that out-of-range values can be reported instead of failing
/// deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCrawlRequest {
    #[serde(default)]
    pub start_urls: Vec<StartUrl>,
    pub link_selector: Option<String>,
    #[serde(default)]
    pub glob_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_glob_patterns: Vec<String>,
    pub url_fragments: Option<bool>,
    #[serde(rename = "injectJQuery")]
    pub inject_jquery: Option<bool>,
    pub page_function: Option<String>,
    pub headless: Option<bool>,
    #[serde(rename = "ignoreSSLErrors")]
    pub ignore_ssl_errors: Option<bool>,
    #[serde(rename = "ignoreCORSAndCSP")]
    pub ignore_cors_and_csp: Option<bool>,
    #[serde(rename = "downloadMediaFiles")]
    pub download_media_files: Option<bool>,
    #[serde(rename = "downloadCSSFiles")]
    pub download_css_files: Option<bool>,
    pub max_page_retries: Option<i64>,
    pub max_pages_per_run: Option<i64>,
    pub max_result_records: Option<i64>,
    pub max_crawling_depth: Option<i64>,
    pub max_concurrency: Option<i64>,
    /// Seconds
    pub page_load_timeout: Option<i64>,
    /// Seconds
    pub page_function_timeout: Option<i64>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// A validated crawl request
///
/// Built only by [`validate_request`](super::validate_request); immutable for
/// the lifetime of a run. `None` limits are unlimited.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub seeds: Vec<Url>,
    pub link_selector: Option<String>,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub url_fragments: bool,
    pub inject_jquery: bool,
    pub page_function: String,
    pub max_concurrency: usize,
    pub page_load_timeout: Duration,
    pub page_function_timeout: Duration,
    pub max_pages: Option<u64>,
    pub max_depth: Option<u32>,
    pub max_retries: u32,
    pub max_records: Option<u64>,
    pub launch: LaunchOptions,
    pub required_fields: Vec<String>,
}

impl CrawlRequest {
    /// SHA-256 fingerprint of the request's effective settings
    ///
    /// Two requests with the same fingerprint crawl the same way.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::json!({
            "seeds": self.seeds.iter().map(Url::as_str).collect::<Vec<_>>(),
            "linkSelector": self.link_selector,
            "include": self.include_globs,
            "exclude": self.exclude_globs,
            "urlFragments": self.url_fragments,
            "injectJQuery": self.inject_jquery,
            "pageFunction": self.page_function,
            "maxConcurrency": self.max_concurrency,
            "pageLoadTimeoutMs": self.page_load_timeout.as_millis() as u64,
            "pageFunctionTimeoutMs": self.page_function_timeout.as_millis() as u64,
            "maxPages": self.max_pages,
            "maxDepth": self.max_depth,
            "maxRetries": self.max_retries,
            "maxRecords": self.max_records,
            "launch": {
                "headless": self.launch.headless,
                "ignoreTlsErrors": self.launch.ignore_tls_errors,
                "bypassCsp": self.launch.bypass_csp,
                "allowMedia": self.launch.allow_media,
                "allowCss": self.launch.allow_css,
            },
            "requiredFields": self.required_fields,
        });
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    /// Returns true when discovered links should be followed
    pub fn follows_links(&self) -> bool {
        self.link_selector.is_some()
    }
}
