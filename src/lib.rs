//! Ripple-Harvest: a sandboxed extraction crawler
//!
//! This crate crawls the link graph reachable from a set of seed URLs using a
//! headless browser, runs an operator-supplied page function against every
//! rendered page and collects the structured records it returns.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod request;
pub mod sandbox;
pub mod server;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Ripple-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid crawl request: {0}")]
    Request(#[from] request::ConfigValidationError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Browser session error: {0}")]
    Session(#[from] browser::SessionError),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Ripple-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::RunController;
pub use output::{ExtractedRecord, RunReport, RunStatus};
pub use request::{CrawlRequest, RawCrawlRequest};
pub use state::{RunPhase, RunState};
pub use crate::url::{dedup_key, normalize_url};
