use super::types::{CrawlRequest, RawCrawlRequest};
use crate::browser::LaunchOptions;
use crate::config::Config;
use crate::sandbox::find_forbidden_construct;
use crate::url::{compile_glob, normalize_url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;

/// Longest accepted page load / page function timeout, in seconds
const MAX_TIMEOUT_SECS: i64 = 3_600;

/// One invalid field of a crawl request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A crawl request was rejected; lists every invalid field
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}", describe_issues(.issues))]
pub struct ConfigValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ConfigValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::new(field, message)],
        }
    }

    /// Returns true if the given field was reported
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    let mut out = format!("{} invalid field(s)", issues.len());
    for issue in issues {
        let _ = write!(out, "; {}: {}", issue.field, issue.message);
    }
    out
}

/// Validates a raw crawl request against the service configuration
///
/// All fields are checked; the error enumerates every problem found rather
/// than stopping at the first one.
///
/// # Arguments
///
/// * `raw` - The request as received
/// * `config` - Service configuration supplying defaults and limits
///
/// # Returns
///
/// * `Ok(CrawlRequest)` - The validated, defaults-applied request
/// * `Err(ConfigValidationError)` - One or more fields were invalid
pub fn validate_request(
    raw: &RawCrawlRequest,
    config: &Config,
) -> Result<CrawlRequest, ConfigValidationError> {
    let defaults = &config.defaults;
    let limits = &config.limits;
    let mut issues = Vec::new();

    let mut seeds = Vec::with_capacity(raw.start_urls.len());
    if raw.start_urls.is_empty() {
        issues.push(FieldIssue::new("startUrls", "at least one start URL is required"));
    }
    for (i, start) in raw.start_urls.iter().enumerate() {
        match normalize_url(start.as_str()) {
            Ok(url) => seeds.push(url),
            Err(e) => issues.push(FieldIssue::new(format!("startUrls[{}]", i), e.to_string())),
        }
    }

    let link_selector = raw
        .link_selector
        .clone()
        .or_else(|| defaults.link_selector.clone())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(selector) = &link_selector {
        if let Err(e) = scraper::Selector::parse(selector) {
            issues.push(FieldIssue::new(
                "linkSelector",
                format!("invalid CSS selector: {}", e),
            ));
        }
    }

    let include_globs = check_globs("globPatterns", &raw.glob_patterns, &mut issues);
    let exclude_globs = check_globs("excludeGlobPatterns", &raw.exclude_glob_patterns, &mut issues);

    let page_function = raw.page_function.clone().unwrap_or_default();
    if page_function.trim().is_empty() {
        issues.push(FieldIssue::new("pageFunction", "page function is required"));
    } else if page_function.len() > limits.max_page_function_bytes {
        issues.push(FieldIssue::new(
            "pageFunction",
            format!(
                "page function is {} bytes, limit is {}",
                page_function.len(),
                limits.max_page_function_bytes
            ),
        ));
    } else if let Some(construct) = find_forbidden_construct(&page_function) {
        issues.push(FieldIssue::new(
            "pageFunction",
            format!("forbidden construct '{}'", construct),
        ));
    }

    let max_retries = check_range(
        "maxPageRetries",
        raw.max_page_retries,
        i64::from(defaults.max_page_retries),
        0,
        i64::from(limits.max_page_retries),
        &mut issues,
    );
    let max_concurrency = check_range(
        "maxConcurrency",
        raw.max_concurrency,
        i64::from(defaults.max_concurrency),
        1,
        i64::from(limits.max_concurrency),
        &mut issues,
    );
    let page_load_timeout = check_range(
        "pageLoadTimeout",
        raw.page_load_timeout,
        defaults.page_load_timeout as i64,
        1,
        MAX_TIMEOUT_SECS,
        &mut issues,
    );
    let page_function_timeout = check_range(
        "pageFunctionTimeout",
        raw.page_function_timeout,
        defaults.page_function_timeout as i64,
        1,
        MAX_TIMEOUT_SECS,
        &mut issues,
    );
    let max_pages = check_limit(
        "maxPagesPerRun",
        raw.max_pages_per_run,
        defaults.max_pages_per_run as i64,
        &mut issues,
    );
    let max_records = check_limit(
        "maxResultRecords",
        raw.max_result_records,
        defaults.max_result_records as i64,
        &mut issues,
    );
    let max_depth = check_range(
        "maxCrawlingDepth",
        raw.max_crawling_depth,
        i64::from(defaults.max_crawling_depth),
        0,
        i64::from(u32::MAX),
        &mut issues,
    );

    let mut required_fields: Vec<String> = Vec::new();
    for (i, name) in raw.required_fields.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            issues.push(FieldIssue::new(
                format!("requiredFields[{}]", i),
                "field name cannot be blank",
            ));
        } else if !required_fields.iter().any(|existing| existing == name) {
            required_fields.push(name.to_string());
        }
    }

    if !issues.is_empty() {
        return Err(ConfigValidationError { issues });
    }

    Ok(CrawlRequest {
        seeds,
        link_selector,
        include_globs,
        exclude_globs,
        url_fragments: raw.url_fragments.unwrap_or(defaults.url_fragments),
        inject_jquery: raw.inject_jquery.unwrap_or(defaults.inject_jquery),
        page_function,
        max_concurrency: max_concurrency as usize,
        page_load_timeout: Duration::from_secs(page_load_timeout as u64),
        page_function_timeout: Duration::from_secs(page_function_timeout as u64),
        max_pages: nonzero(max_pages),
        max_depth: nonzero(max_depth).map(|d| d as u32),
        max_retries: max_retries as u32,
        max_records: nonzero(max_records),
        launch: LaunchOptions {
            headless: raw.headless.unwrap_or(defaults.headless),
            ignore_tls_errors: raw.ignore_ssl_errors.unwrap_or(defaults.ignore_ssl_errors),
            bypass_csp: raw.ignore_cors_and_csp.unwrap_or(defaults.ignore_cors_and_csp),
            allow_media: raw.download_media_files.unwrap_or(defaults.download_media_files),
            allow_css: raw.download_css_files.unwrap_or(defaults.download_css_files),
        },
        required_fields,
    })
}

/// JSON shape expected for a request field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldShape {
    Boolean,
    Text,
    Integer,
    TextList,
    StartUrls,
}

const FIELD_SHAPES: &[(&str, FieldShape)] = &[
    ("startUrls", FieldShape::StartUrls),
    ("linkSelector", FieldShape::Text),
    ("globPatterns", FieldShape::TextList),
    ("excludeGlobPatterns", FieldShape::TextList),
    ("urlFragments", FieldShape::Boolean),
    ("injectJQuery", FieldShape::Boolean),
    ("pageFunction", FieldShape::Text),
    ("headless", FieldShape::Boolean),
    ("ignoreSSLErrors", FieldShape::Boolean),
    ("ignoreCORSAndCSP", FieldShape::Boolean),
    ("downloadMediaFiles", FieldShape::Boolean),
    ("downloadCSSFiles", FieldShape::Boolean),
    ("maxPageRetries", FieldShape::Integer),
    ("maxPagesPerRun", FieldShape::Integer),
    ("maxResultRecords", FieldShape::Integer),
    ("maxCrawlingDepth", FieldShape::Integer),
    ("maxConcurrency", FieldShape::Integer),
    ("pageLoadTimeout", FieldShape::Integer),
    ("pageFunctionTimeout", FieldShape::Integer),
    ("requiredFields", FieldShape::TextList),
];

impl FieldShape {
    fn expected(self) -> &'static str {
        match self {
            Self::Boolean => "a boolean",
            Self::Text => "a string",
            Self::Integer => "an integer",
            Self::TextList => "an array of strings",
            Self::StartUrls => "an array of URLs",
        }
    }

    /// Returns true if `value` has this shape; records an issue per mismatch
    fn check(self, field: &str, value: &Value, issues: &mut Vec<FieldIssue>) -> bool {
        let matches = match self {
            Self::Boolean => value.is_boolean(),
            Self::Text => value.is_string(),
            Self::Integer => value.as_i64().is_some(),
            Self::TextList | Self::StartUrls => {
                let Some(items) = value.as_array() else {
                    issues.push(mismatch(field, self.expected(), value));
                    return false;
                };
                let mut all_match = true;
                for (i, item) in items.iter().enumerate() {
                    let (ok, expected) = if self == Self::StartUrls {
                        let ok = item.is_string()
                            || item.get("url").map_or(false, Value::is_string);
                        (ok, "a URL string or an object with a \"url\" string")
                    } else {
                        (item.is_string(), "a string")
                    };
                    if !ok {
                        issues.push(mismatch(&format!("{}[{}]", field, i), expected, item));
                        all_match = false;
                    }
                }
                return all_match;
            }
        };
        if !matches {
            issues.push(mismatch(field, self.expected(), value));
        }
        matches
    }
}

fn mismatch(field: &str, expected: &str, value: &Value) -> FieldIssue {
    FieldIssue::new(
        field,
        format!("expected {}, got {}", expected, json_type(value)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() => "an integer",
        Value::Number(n) if n.is_u64() => "an out-of-range integer",
        Value::Number(_) => "a fractional number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Returns true if `issue_field` is `field` or one of its elements
fn belongs_to(issue_field: &str, field: &str) -> bool {
    issue_field == field
        || issue_field
            .strip_prefix(field)
            .map_or(false, |rest| rest.starts_with('['))
}

/// Validates a crawl request given as untyped JSON
///
/// Every field is type-checked before the request is interpreted, so a
/// wrongly typed field is reported next to every other invalid field
/// instead of failing deserialization. `null` is treated as absent and
/// unknown fields are ignored.
pub fn validate_json(body: &Value, config: &Config) -> Result<CrawlRequest, ConfigValidationError> {
    let Some(object) = body.as_object() else {
        return Err(ConfigValidationError::single(
            "body",
            format!("expected a JSON object, got {}", json_type(body)),
        ));
    };

    let mut issues = Vec::new();
    let mut mistyped: Vec<&str> = Vec::new();
    let mut accepted = Map::new();
    for (key, value) in object {
        if value.is_null() {
            continue;
        }
        match FIELD_SHAPES.iter().find(|(name, _)| *name == key.as_str()) {
            Some((_, shape)) if !shape.check(key, value, &mut issues) => mistyped.push(key),
            _ => {
                accepted.insert(key.clone(), value.clone());
            }
        }
    }

    let raw: RawCrawlRequest = match serde_json::from_value(Value::Object(accepted)) {
        Ok(raw) => raw,
        Err(e) => {
            issues.push(FieldIssue::new("body", e.to_string()));
            return Err(ConfigValidationError { issues });
        }
    };

    match validate_request(&raw, config) {
        Ok(request) if issues.is_empty() => Ok(request),
        Ok(_) => Err(ConfigValidationError { issues }),
        Err(e) => {
            // a mistyped field already has its issue; its fallback value does not get another
            issues.extend(
                e.issues
                    .into_iter()
                    .filter(|issue| !mistyped.iter().any(|field| belongs_to(&issue.field, field))),
            );
            Err(ConfigValidationError { issues })
        }
    }
}

/// Compiles glob patterns for validation, skipping blank entries
fn check_globs(field: &str, patterns: &[String], issues: &mut Vec<FieldIssue>) -> Vec<String> {
    let mut kept = Vec::new();
    for (i, pattern) in patterns.iter().enumerate() {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        match compile_glob(pattern) {
            Ok(_) => kept.push(pattern.to_string()),
            Err(e) => issues.push(FieldIssue::new(format!("{}[{}]", field, i), e.to_string())),
        }
    }
    kept
}

fn check_range(
    field: &str,
    value: Option<i64>,
    default: i64,
    min: i64,
    max: i64,
    issues: &mut Vec<FieldIssue>,
) -> i64 {
    let value = value.unwrap_or(default);
    if value < min || value > max {
        issues.push(FieldIssue::new(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ));
    }
    value.clamp(min, max)
}

/// Checks a count limit where 0 means unlimited
fn check_limit(field: &str, value: Option<i64>, default: i64, issues: &mut Vec<FieldIssue>) -> u64 {
    let value = value.unwrap_or(default);
    if value < 0 {
        issues.push(FieldIssue::new(
            field,
            format!("must be >= 0 (0 means unlimited), got {}", value),
        ));
        return 0;
    }
    value as u64
}

fn nonzero<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}
