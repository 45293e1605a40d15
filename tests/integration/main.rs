//! Integration tests for the crawler
//!
//! These tests drive the full run controller against the scripted browser
//! driver, so every crawl is deterministic and runs offline. The ignored
//! `browser_tests` run the sandbox wrapper in a real Chrome.

mod browser_tests;
mod common;
mod crawl_tests;
mod limit_tests;
mod sandbox_tests;
