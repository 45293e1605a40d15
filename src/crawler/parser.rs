//! Link discovery over a rendered DOM
//!
//! The worker reads the page's HTML after scripts have run and selects
//! link elements with the request's CSS selector.

use crate::url::{apply_fragment_policy, dedup_key};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Extracts followable links from `html`
///
/// # Link Rules
///
/// **Include:** elements matching `selector` that carry an `href`
///
/// **Exclude:**
/// - `download` links
/// - `javascript:`, `mailto:`, `tel:` and `data:` hrefs
/// - Fragment-only hrefs (same-page anchors)
/// - Anything that does not resolve to http(s)
///
/// Hrefs are resolved against `base_url` (the page's final URL), fragments
/// are stripped unless `url_fragments` is set, and each link appears once,
/// in document order.
///
/// # Returns
///
/// * `Ok(Vec<Url>)` - The discovered links
/// * `Err(String)` - `selector` is not valid CSS
pub fn discover_links(
    html: &str,
    selector: &str,
    base_url: &Url,
    url_fragments: bool,
) -> Result<Vec<Url>, String> {
    let selector = Selector::parse(selector).map_err(|e| e.to_string())?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(link) = resolve_link(href, base_url) else {
            continue;
        };

        let link = apply_fragment_policy(link, url_fragments);
        if seen.insert(dedup_key(&link, url_fragments)) {
            links.push(link);
        }
    }

    Ok(links)
}

/// Resolves an href to an absolute http(s) URL, or `None` when it should
/// not be followed
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}
