use crate::{ConfigError, ConfigResult};
use regex::Regex;

/// Compiles a glob pattern into an anchored regular expression
///
/// Supported syntax:
/// - `**` matches any run of characters, including `/`
/// - `*` matches any run of characters except `/`
/// - `?` matches a single character except `/`
/// - `[abc]`, `[a-z]`, `[!abc]` character classes
/// - `{a,b}` alternation (may contain any of the above)
///
/// Every other character matches itself. The pattern must match the whole
/// URL string.
///
/// # Arguments
///
/// * `pattern` - The glob pattern
///
/// # Returns
///
/// * `Ok(Regex)` - The compiled, anchored expression
/// * `Err(ConfigError::InvalidPattern)` - If the pattern is empty or unbalanced
///
/// # Examples
///
/// ```
/// use ripple_harvest::url::compile_glob;
///
/// let re = compile_glob("https://shop.test/item/*").unwrap();
/// assert!(re.is_match("https://shop.test/item/42"));
/// assert!(!re.is_match("https://shop.test/item/42/reviews"));
/// ```
pub fn compile_glob(pattern: &str) -> ConfigResult<Regex> {
    if pattern.trim().is_empty() {
        return Err(ConfigError::InvalidPattern(
            "glob pattern cannot be empty".to_string(),
        ));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 1;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if matches!(chars.get(j), Some('!') | Some('^')) {
                        out.push('^');
                        j += 1;
                    }
                    for &ch in &chars[j..end] {
                        if ch == '\\' || ch == '[' || ch == '&' || ch == '~' {
                            out.push('\\');
                        }
                        out.push(ch);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            ',' if brace_depth > 0 => out.push('|'),
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(ConfigError::InvalidPattern(format!(
            "unclosed '{{' in glob pattern '{}'",
            pattern
        )));
    }

    Regex::new(&format!("^{}$", out))
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

/// Finds the closing `]` of a character class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    // A `]` right after the opener is a literal member
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return if j > start + 1 { Some(j) } else { None };
        }
        j += 1;
    }
    None
}

/// Include/exclude filter applied to discovered URLs
///
/// A URL passes when it matches at least one include pattern (or no include
/// patterns are configured) and matches no exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

/// Result of checking a URL against a [`UrlFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted,
    /// Matched an exclude pattern
    Excluded,
    /// Include patterns exist and none matched
    NotIncluded,
}

impl UrlFilter {
    /// Builds a filter from glob patterns; blank patterns are skipped
    pub fn new<I, E, S, T>(include: I, exclude: E) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let compile_all = |patterns: Vec<String>| -> ConfigResult<Vec<Regex>> {
            patterns.iter().map(|p| compile_glob(p)).collect()
        };

        Ok(Self {
            include: compile_all(non_blank(include))?,
            exclude: compile_all(non_blank(exclude))?,
        })
    }

    /// Returns true when include patterns are configured
    pub fn has_includes(&self) -> bool {
        !self.include.is_empty()
    }

    /// Checks a URL string against the filter
    pub fn check(&self, url: &str) -> FilterVerdict {
        if self.exclude.iter().any(|re| re.is_match(url)) {
            return FilterVerdict::Excluded;
        }
        if self.has_includes() && !self.include.iter().any(|re| re.is_match(url)) {
            return FilterVerdict::NotIncluded;
        }
        FilterVerdict::Accepted
    }
}

fn non_blank<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, candidate: &str) -> bool {
        compile_glob(pattern).unwrap().is_match(candidate)
    }

    #[test]
    fn test_literal_match() {
        assert!(matches("https://a.test/p", "https://a.test/p"));
        assert!(!matches("https://a.test/p", "https://a.test/p2"));
    }

    #[test]
    fn test_single_star_stops_at_slash() {
        assert!(matches("https://a.test/*", "https://a.test/page"));
        assert!(!matches("https://a.test/*", "https://a.test/dir/page"));
    }

    #[test]
    fn test_double_star_crosses_slash() {
        assert!(matches("https://a.test/**", "https://a.test/dir/page"));
        assert!(matches("**/item/*", "https://shop.test/cat/item/9"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("https://a.test/p?", "https://a.test/p1"));
        assert!(!matches("https://a.test/p?", "https://a.test/p12"));
        assert!(!matches("https://a.test/p?", "https://a.test/p/"));
    }

    #[test]
    fn test_dots_are_literal() {
        assert!(!matches("https://a.test/*", "https://aXtest/p"));
    }

    #[test]
    fn test_character_class() {
        assert!(matches("https://a.test/page-[0-9]", "https://a.test/page-7"));
        assert!(!matches("https://a.test/page-[0-9]", "https://a.test/page-x"));
        assert!(matches("https://a.test/[!x]", "https://a.test/y"));
        assert!(!matches("https://a.test/[!x]", "https://a.test/x"));
    }

    #[test]
    fn test_unclosed_class_is_literal() {
        assert!(matches("https://a.test/[abc", "https://a.test/[abc"));
    }

    #[test]
    fn test_brace_alternation() {
        let pattern = "https://a.test/*.{html,htm}";
        assert!(matches(pattern, "https://a.test/index.html"));
        assert!(matches(pattern, "https://a.test/index.htm"));
        assert!(!matches(pattern, "https://a.test/index.php"));
    }

    #[test]
    fn test_unclosed_brace_rejected() {
        assert!(compile_glob("https://a.test/{a,b").is_err());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(compile_glob("  ").is_err());
    }

    #[test]
    fn test_filter_without_patterns_accepts_all() {
        let filter = UrlFilter::new(Vec::<String>::new(), Vec::<String>::new()).unwrap();
        assert_eq!(filter.check("https://any.test/x"), FilterVerdict::Accepted);
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let filter = UrlFilter::new(["https://a.test/**"], ["**/private/**"]).unwrap();
        assert_eq!(filter.check("https://a.test/docs/1"), FilterVerdict::Accepted);
        assert_eq!(filter.check("https://b.test/docs/1"), FilterVerdict::NotIncluded);
        assert_eq!(
            filter.check("https://a.test/private/1"),
            FilterVerdict::Excluded
        );
    }

    #[test]
    fn test_filter_skips_blank_patterns() {
        let filter = UrlFilter::new([""], ["   "]).unwrap();
        assert!(!filter.has_includes());
        assert_eq!(filter.check("https://a.test/"), FilterVerdict::Accepted);
    }
}
