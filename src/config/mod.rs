//! Configuration module for Ripple-Harvest
//!
//! This module handles loading, parsing, and validating the TOML service
//! configuration: server binding, browser driver settings, defaults for
//! optional crawl request fields, retry backoff and hard limits.
//!
//! # Example
//!
//! ```no_run
//! use ripple_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Default concurrency: {}", config.defaults.max_concurrency);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{BrowserConfig, Config, LimitsConfig, RequestDefaults, RetryConfig, ServerConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
