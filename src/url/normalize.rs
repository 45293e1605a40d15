use crate::UrlError;
use url::Url;

/// Normalizes a URL for use as a crawl target
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace and parse; reject if malformed or relative
/// 2. Accept only `http` and `https` schemes
/// 3. Require a host
/// 4. Lowercase scheme and host, drop default ports and resolve dot
///    segments (performed by the WHATWG parser)
///
/// The fragment is preserved here; whether it is part of a page's identity
/// is decided by [`dedup_key`] and [`apply_fragment_policy`].
///
/// # Examples
///
/// ```
/// use ripple_harvest::url::normalize_url;
///
/// let url = normalize_url("HTTPS://Example.TEST:443/a/../b").unwrap();
/// assert_eq!(url.as_str(), "https://example.test/b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Strips the fragment unless fragments identify distinct pages
pub fn apply_fragment_policy(mut url: Url, url_fragments: bool) -> Url {
    if !url_fragments {
        url.set_fragment(None);
    }
    url
}

/// Computes the dedup key of a URL
///
/// The key is `scheme://host[:port]/path[?query]`, with scheme and host
/// lower-cased and default ports removed. The fragment is appended only when
/// `url_fragments` is true, in which case two URLs differing only by
/// fragment are distinct pages.
///
/// # Examples
///
/// ```
/// use ripple_harvest::url::{dedup_key, normalize_url};
///
/// let a = normalize_url("https://a.test/p#x").unwrap();
/// let b = normalize_url("https://a.test/p#y").unwrap();
/// assert_eq!(dedup_key(&a, false), dedup_key(&b, false));
/// assert_ne!(dedup_key(&a, true), dedup_key(&b, true));
/// ```
pub fn dedup_key(url: &Url, url_fragments: bool) -> String {
    let mut key = String::with_capacity(url.as_str().len());
    key.push_str(&url.scheme().to_ascii_lowercase());
    key.push_str("://");
    if let Some(host) = url.host_str() {
        key.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path());
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    if url_fragments {
        if let Some(fragment) = url.fragment() {
            key.push('#');
            key.push_str(fragment);
        }
    }
    key
}
