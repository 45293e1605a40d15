//! In-page wrapper script and the envelope it reports back
//!
//! The wrapper never hands a live JS value back to the host. It describes
//! the page function's return value as
//! `{status, kind, fields: [[name, type, value]], message, logs}` and the
//! host decides here whether that description is an acceptable record.

use super::{ExtractionError, ExtractionErrorKind};
use crate::output::{ExtractedRecord, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Marker identifying the sandbox wrapper script
pub const SANDBOX_MARKER: &str = "/* harvest:sandbox */";

/// Page-side cap on buffered log lines
pub const MAX_PAGE_LOGS: usize = 200;

/// Globals shadowed by same-named wrapper parameters
///
/// Lexical only: `window.<name>` still reaches the real global.
pub const SHADOWED_GLOBALS: &[&str] = &[
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "EventSource",
    "importScripts",
    "require",
    "process",
    "module",
    "exports",
    "localStorage",
    "sessionStorage",
    "indexedDB",
    "caches",
    "Worker",
    "SharedWorker",
];

const WRAPPER: &str = r#"(async () => {
  const __logs = [];
  const __push = (level, args) => {
    if (__logs.length >= __MAX_LOGS__) return;
    const message = args.map((a) => {
      if (typeof a === 'string') return a;
      try { return JSON.stringify(a); } catch (_) { return String(a); }
    }).join(' ');
    __logs.push({ level, message });
  };
  const __describe = (v) => {
    if (v === null) return 'null';
    if (Array.isArray(v)) return 'array';
    const t = typeof v;
    if (t === 'number') return Number.isFinite(v) ? 'number' : 'non_finite';
    return t;
  };
  const __message = (e) => {
    if (e && typeof e === 'object' && 'message' in e) return String(e.message);
    try { return String(e); } catch (_) { return 'unprintable error'; }
  };
  const __jq = __COMPAT__ && typeof window.jQuery === 'function' ? window.jQuery : null;
  const __caps = Object.freeze(Object.assign(
    {
      url: __URL__,
      log: Object.freeze({
        info: (...a) => __push('info', a),
        error: (...a) => __push('error', a),
      }),
    },
    __jq ? { jQuery: __jq, $: __jq } : {}
  ));
  const __deny = () => { throw new TypeError('context is read-only'); };
  const context = new Proxy(__caps, {
    get(target, key) {
      if (typeof key === 'symbol' || key === 'then' || key === 'toJSON') return undefined;
      if (Object.prototype.hasOwnProperty.call(target, key)) return target[key];
      throw new TypeError('context.' + String(key) + ' is not available');
    },
    set: __deny,
    defineProperty: __deny,
    deleteProperty: __deny,
    setPrototypeOf: __deny,
  });
  let __fn;
  try {
    const AsyncFunction = Object.getPrototypeOf(async function () {}).constructor;
    __fn = new AsyncFunction('context', __SHADOWED__, '"use strict";\n' + __SOURCE__);
  } catch (e) {
    return JSON.stringify({ status: 'error', kind: 'syntax', message: __message(e), logs: __logs });
  }
  let value;
  try {
    value = await __fn(context);
  } catch (e) {
    return JSON.stringify({ status: 'error', kind: 'thrown', message: __message(e), logs: __logs });
  }
  const kind = __describe(value);
  const fields = [];
  if (kind === 'object') {
    for (const key of Object.keys(value)) {
      const v = value[key];
      const t = __describe(v);
      fields.push([key, t, (t === 'string' || t === 'number' || t === 'boolean') ? v : null]);
    }
  }
  return JSON.stringify({ status: 'ok', kind, fields, logs: __logs });
})()"#;

/// Builds the script evaluated in the page for one extraction
///
/// `source` is embedded as a JSON string literal and compiled page-side, so
/// no operator text is ever spliced into the wrapper itself.
pub fn build_script(source: &str, url: &Url, compat: bool) -> String {
    let literal = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
    let shadowed = SHADOWED_GLOBALS
        .iter()
        .map(|name| literal(name))
        .collect::<Vec<_>>()
        .join(", ");

    let max_logs = MAX_PAGE_LOGS.to_string();
    let url = literal(url.as_str());
    let source = literal(source);
    let body = fill(
        WRAPPER,
        &[
            ("__MAX_LOGS__", &max_logs),
            ("__COMPAT__", if compat { "true" } else { "false" }),
            ("__URL__", &url),
            ("__SHADOWED__", &shadowed),
            ("__SOURCE__", &source),
        ],
    );

    format!("{}\n{}", SANDBOX_MARKER, body)
}

/// Substitutes placeholders in a single pass over the template
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    while let Some((pos, key, value)) = values
        .iter()
        .filter_map(|(key, value)| rest.find(key).map(|pos| (pos, *key, *value)))
        .min_by_key(|(pos, _, _)| *pos)
    {
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + key.len()..];
    }
    out.push_str(rest);
    out
}

/// A log line written through `context.log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLog {
    pub level: String,
    pub message: String,
}

/// Page-side description of one extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status: String,
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<(String, String, Value)>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub logs: Vec<PageLog>,
}

impl Envelope {
    /// Parses the JSON text returned by the wrapper, preserving field order
    pub fn parse(text: &str) -> Result<Self, ExtractionError> {
        serde_json::from_str(text).map_err(|e| {
            ExtractionError::new(
                ExtractionErrorKind::Driver,
                format!("unreadable sandbox envelope: {}", e),
            )
        })
    }

    /// Describes a returned JSON value the way the wrapper would
    ///
    /// Used by drivers that do not run JavaScript.
    pub fn describe(value: &Value, logs: Vec<PageLog>) -> Self {
        let kind = value_kind(value);
        let fields = match value {
            Value::Object(map) => map
                .iter()
                .map(|(name, v)| {
                    let t = value_kind(v);
                    let carried = match v {
                        Value::String(_) | Value::Number(_) | Value::Bool(_) => v.clone(),
                        _ => Value::Null,
                    };
                    (name.clone(), t.to_string(), carried)
                })
                .collect(),
            _ => Vec::new(),
        };
        Self {
            status: "ok".to_string(),
            kind: kind.to_string(),
            fields,
            message: None,
            logs,
        }
    }

    /// Describes a page function failure
    pub fn failure(kind: &str, message: &str, logs: Vec<PageLog>) -> Self {
        Self {
            status: "error".to_string(),
            kind: kind.to_string(),
            fields: Vec::new(),
            message: Some(message.to_string()),
            logs,
        }
    }

    /// Validates the envelope and builds the record for `url`
    ///
    /// The record starts with `url`; a user field of that name is ignored.
    /// An empty object, a non-object return, a non-primitive field or a
    /// missing required field is a `MalformedResult`.
    pub fn into_record(
        self,
        url: &Url,
        required_fields: &[String],
    ) -> Result<ExtractedRecord, ExtractionError> {
        let message = self.message.unwrap_or_default();
        if self.status != "ok" {
            let kind = match self.kind.as_str() {
                "syntax" => ExtractionErrorKind::Syntax,
                _ => ExtractionErrorKind::Thrown,
            };
            return Err(ExtractionError::new(kind, message));
        }

        if self.kind != "object" {
            return Err(ExtractionError::malformed(format!(
                "page function returned {}, expected an object",
                self.kind
            )));
        }

        let mut record = ExtractedRecord::new(url);
        let mut user_fields = 0usize;
        let mut returned_url = false;
        for (name, kind, value) in self.fields {
            if name == "url" {
                returned_url = true;
                continue;
            }
            let value = match (kind.as_str(), value) {
                ("string", Value::String(s)) => FieldValue::String(s),
                ("number", Value::Number(n)) => FieldValue::Number(n),
                ("boolean", Value::Bool(b)) => FieldValue::Bool(b),
                ("null", _) | ("undefined", _) => FieldValue::Null,
                (other, _) => {
                    return Err(ExtractionError::malformed(format!(
                        "field '{}' is {}, only strings, numbers, booleans and null are allowed",
                        name,
                        describe_kind(other)
                    )))
                }
            };
            record.push(name, value);
            user_fields += 1;
        }

        if user_fields == 0 {
            let message = if returned_url {
                "page function returned only 'url', which is set by the crawler"
            } else {
                "page function returned an empty object"
            };
            return Err(ExtractionError::malformed(message));
        }

        let missing: Vec<&str> = required_fields
            .iter()
            .map(String::as_str)
            .filter(|name| !record.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(ExtractionError::malformed(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(record)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe_kind(kind: &str) -> &str {
    match kind {
        "non_finite" => "a non-finite number",
        "array" => "an array",
        "object" => "a nested object",
        "function" => "a function",
        "symbol" => "a symbol",
        "bigint" => "a bigint",
        other => other,
    }
}
