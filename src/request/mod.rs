//! Crawl request model
//!
//! [`RawCrawlRequest`] is the wire form accepted by the HTTP surface and the
//! CLI. [`validate_json`] type-checks an untyped body first, and
//! [`validate_request`] turns it into an immutable [`CrawlRequest`],
//! applying service defaults and reporting every invalid field at once.

mod types;
mod validation;

pub use types::{CrawlRequest, RawCrawlRequest, StartUrl};
pub use validation::{validate_json, validate_request, ConfigValidationError, FieldIssue};
