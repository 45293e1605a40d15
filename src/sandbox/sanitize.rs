//! Static screening of page function source
//!
//! The in-page wrapper is the real isolation boundary; this list rejects
//! sources that are plainly trying to reach outside the capability object.

use once_cell::sync::Lazy;
use regex::Regex;

/// (label reported to the caller, pattern)
const FORBIDDEN: &[(&str, &str)] = &[
    ("require(", r"\brequire\s*\("),
    ("import(", r"\bimport\s*\("),
    ("process.", r"\bprocess\s*\."),
    ("eval(", r"\beval\s*\("),
    ("new Function", r"\bnew\s+Function\b"),
    ("Function(", r"\bFunction\s*\("),
    ("XMLHttpRequest", r"\bXMLHttpRequest\b"),
    ("fetch(", r"\bfetch\s*\("),
    ("WebSocket", r"\bWebSocket\b"),
    ("importScripts", r"\bimportScripts\b"),
    ("</script", r"(?i)</\s*script"),
    ("document.cookie", r"\bdocument\s*\.\s*cookie\b"),
    ("localStorage", r"\blocalStorage\b"),
    ("sessionStorage", r"\bsessionStorage\b"),
    ("indexedDB", r"\bindexedDB\b"),
    ("sendBeacon", r"\bsendBeacon\b"),
    ("__proto__", r"__proto__"),
    ("constructor.constructor", r"\bconstructor\s*\.\s*constructor\b"),
];

static PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN
        .iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (*label, re)))
        .collect()
});

/// Returns the first forbidden construct found in `source`, if any
///
/// # Examples
///
/// ```
/// use ripple_harvest::sandbox::find_forbidden_construct;
///
/// assert_eq!(find_forbidden_construct("return fetch('/x')"), Some("fetch("));
/// assert_eq!(find_forbidden_construct("return { title: document.title }"), None);
/// ```
pub fn find_forbidden_construct(source: &str) -> Option<&'static str> {
    PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(source))
        .map(|(label, _)| *label)
}
