//! jQuery-style compatibility layer injected with `injectJQuery`

use crate::ConfigError;
use std::path::Path;

/// Marker identifying compatibility layer scripts
pub const COMPAT_MARKER: &str = "/* harvest:compat */";

/// Minimal jQuery-compatible query API, installed only if the page has none
const BUILTIN_SHIM: &str = r#"(() => {
  if (typeof window.jQuery === 'function') return true;
  const wrap = (nodes) => {
    const list = Array.from(nodes).filter(Boolean);
    const api = {
      length: list.length,
      get: (i) => (i === undefined ? list.slice() : list[i < 0 ? list.length + i : i]),
      toArray: () => list.slice(),
      eq: (i) => wrap([list[i < 0 ? list.length + i : i]]),
      first: () => wrap(list.slice(0, 1)),
      last: () => wrap(list.slice(-1)),
      find: (sel) => wrap(list.flatMap((n) => Array.from(n.querySelectorAll(sel)))),
      filter: (sel) => wrap(list.filter((n) => n.matches && n.matches(sel))),
      parent: () => wrap(list.map((n) => n.parentElement)),
      each: (fn) => { list.forEach((n, i) => fn.call(n, i, n)); return api; },
      map: (fn) => {
        const out = list.map((n, i) => fn.call(n, i, n));
        return { get: () => out, toArray: () => out, length: out.length };
      },
      text: () => list.map((n) => n.textContent || '').join(''),
      html: () => (list[0] ? list[0].innerHTML : undefined),
      attr: (name) => (list[0] && list[0].getAttribute ? (list[0].getAttribute(name) ?? undefined) : undefined),
      prop: (name) => (list[0] ? list[0][name] : undefined),
      val: () => (list[0] ? list[0].value : undefined),
      is: (sel) => list.some((n) => n.matches && n.matches(sel)),
      hasClass: (c) => list.some((n) => n.classList && n.classList.contains(c)),
    };
    list.forEach((n, i) => { api[i] = n; });
    return api;
  };
  const jq = (input, root) => {
    if (typeof input === 'string') return wrap((root || document).querySelectorAll(input));
    if (input && typeof input.length === 'number' && typeof input !== 'function') return wrap(input);
    return wrap([input]);
  };
  jq.trim = (s) => String(s).trim();
  jq.fn = {};
  window.jQuery = jq;
  if (typeof window.$ === 'undefined') window.$ = jq;
  return true;
})()"#;

/// Script run in the page before the page function when `injectJQuery` is set
#[derive(Debug, Clone)]
pub struct CompatLayer {
    script: String,
}

impl CompatLayer {
    /// The built-in shim
    pub fn builtin() -> Self {
        Self {
            script: format!("{}\n{}", COMPAT_MARKER, BUILTIN_SHIM),
        }
    }

    /// Loads a script (typically a jQuery build) from disk
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Ok(Self {
            script: format!("{}\n{}\n;true", COMPAT_MARKER, body),
        })
    }

    /// Uses the configured script when present, the built-in shim otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}
