//! Extraction sandbox
//!
//! Runs an operator-supplied page function inside the rendered page and
//! turns its return value into an [`ExtractedRecord`].
//!
//! The page function only sees a frozen `context` object exposing:
//!
//! - `context.url`: the page URL
//! - `context.log.info(...)` / `context.log.error(...)`
//! - `context.jQuery` / `context.$` when the compatibility layer is enabled
//!
//! The isolation boundary is the browser renderer process. Inside it, the
//! wrapper only shadows network, storage and worker globals by name, so
//! `window.fetch` and computed lookups on `globalThis` still resolve;
//! source screening rejects the obvious spellings. The page-side result is
//! validated on the host, and the timeout is enforced on the host as well,
//! so a page function that never settles cannot stall a worker.

pub mod compat;
pub mod envelope;
mod sanitize;

use crate::browser::Session;
use crate::output::ExtractedRecord;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use compat::{CompatLayer, COMPAT_MARKER};
pub use envelope::{build_script, Envelope, PageLog, SANDBOX_MARKER};
pub use sanitize::find_forbidden_construct;

/// Why an extraction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    Syntax,
    Thrown,
    Timeout,
    MalformedResult,
    ForbiddenConstruct,
    /// The browser could not evaluate the wrapper at all
    Driver,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Thrown => "thrown",
            Self::Timeout => "timeout",
            Self::MalformedResult => "malformed_result",
            Self::ForbiddenConstruct => "forbidden_construct",
            Self::Driver => "driver",
        }
    }
}

/// A page function failed on one page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} error: {}", .kind.as_str(), .message)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::MalformedResult, message)
    }
}

/// What the page function may see of the page
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub url: &'a Url,
    /// Expose `jQuery`/`$` if the page has them
    pub compat: bool,
}

/// Result of one sandboxed execution
#[derive(Debug)]
pub struct SandboxOutput {
    pub result: Result<ExtractedRecord, ExtractionError>,
    /// Lines written through `context.log`, in order
    pub logs: Vec<PageLog>,
}

impl SandboxOutput {
    fn failed(error: ExtractionError) -> Self {
        Self {
            result: Err(error),
            logs: Vec::new(),
        }
    }
}

/// A compiled-once page function ready to run against many pages
#[derive(Debug, Clone)]
pub struct Sandbox {
    source: String,
    timeout: Duration,
    required_fields: Vec<String>,
}

impl Sandbox {
    /// Screens `source` and prepares it for execution
    ///
    /// # Returns
    ///
    /// * `Ok(Sandbox)` - The source passed screening
    /// * `Err(ExtractionError)` - `ForbiddenConstruct` naming the offending construct
    pub fn new(
        source: &str,
        timeout: Duration,
        required_fields: Vec<String>,
    ) -> Result<Self, ExtractionError> {
        if let Some(construct) = find_forbidden_construct(source) {
            return Err(ExtractionError::new(
                ExtractionErrorKind::ForbiddenConstruct,
                format!("page function uses forbidden construct '{}'", construct),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            timeout,
            required_fields,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the page function in the session's current page
    pub async fn execute(&self, session: &mut dyn Session, ctx: &PageContext<'_>) -> SandboxOutput {
        let script = build_script(&self.source, ctx.url, ctx.compat);

        let value = match tokio::time::timeout(self.timeout, session.evaluate(&script)).await {
            Err(_) => {
                return SandboxOutput::failed(ExtractionError::new(
                    ExtractionErrorKind::Timeout,
                    format!(
                        "page function did not finish within {}ms",
                        self.timeout.as_millis()
                    ),
                ))
            }
            Ok(Err(e)) => {
                return SandboxOutput::failed(ExtractionError::new(
                    ExtractionErrorKind::Driver,
                    e.to_string(),
                ))
            }
            Ok(Ok(value)) => value,
        };

        let envelope = match value.as_str() {
            Some(text) => Envelope::parse(text),
            None => Err(ExtractionError::new(
                ExtractionErrorKind::Driver,
                "sandbox wrapper returned a non-string value",
            )),
        };

        match envelope {
            Ok(mut envelope) => {
                let logs = std::mem::take(&mut envelope.logs);
                SandboxOutput {
                    result: envelope.into_record(ctx.url, &self.required_fields),
                    logs,
                }
            }
            Err(e) => SandboxOutput::failed(e),
        }
    }
}
