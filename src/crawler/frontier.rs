//! Run-scoped queue of discovered-but-unprocessed URLs
//!
//! Every mutation happens in a single critical section, so concurrent
//! pushes of the same URL queue it exactly once.

use crate::url::{apply_fragment_policy, dedup_key, FilterVerdict, UrlFilter};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    /// Link hops from the nearest seed
    pub depth: u32,
    /// Normalized identity used for deduplication
    pub key: String,
}

/// What happened to a pushed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The dedup key was already queued once
    Duplicate,
    /// Matched an exclude glob
    Excluded,
    /// Include globs are configured and none matched
    NotIncluded,
    /// Deeper than the depth limit
    TooDeep,
}

/// Counters of every push outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub queued: u64,
    pub duplicates: u64,
    pub excluded: u64,
    pub not_included: u64,
    pub too_deep: u64,
}

impl FrontierStats {
    /// URLs rejected by glob filters or the depth limit
    pub fn filtered(&self) -> u64 {
        self.excluded + self.not_included + self.too_deep
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    stats: FrontierStats,
}

#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    filter: UrlFilter,
    max_depth: Option<u32>,
    url_fragments: bool,
}

impl Frontier {
    pub fn new(filter: UrlFilter, max_depth: Option<u32>, url_fragments: bool) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            filter,
            max_depth,
            url_fragments,
        }
    }

    /// Queues a start URL at depth 0
    ///
    /// Seeds bypass the glob filters but are still deduplicated.
    pub fn seed(&self, url: Url) -> PushOutcome {
        self.insert(url, 0, false)
    }

    /// Queues a discovered URL if it is new, passes the filters and is
    /// within the depth limit
    pub fn push(&self, url: Url, depth: u32) -> PushOutcome {
        self.insert(url, depth, true)
    }

    fn insert(&self, url: Url, depth: u32, filtered: bool) -> PushOutcome {
        let url = apply_fragment_policy(url, self.url_fragments);
        let key = dedup_key(&url, self.url_fragments);

        let mut inner = self.inner.lock();
        let outcome = if inner.seen.contains(&key) {
            PushOutcome::Duplicate
        } else if filtered && self.max_depth.map_or(false, |max| depth > max) {
            PushOutcome::TooDeep
        } else {
            match filtered.then(|| self.filter.check(url.as_str())) {
                Some(FilterVerdict::Excluded) => PushOutcome::Excluded,
                Some(FilterVerdict::NotIncluded) => PushOutcome::NotIncluded,
                _ => PushOutcome::Queued,
            }
        };

        match outcome {
            PushOutcome::Queued => {
                inner.seen.insert(key.clone());
                inner.queue.push_back(FrontierEntry { url, depth, key });
                inner.stats.queued += 1;
            }
            PushOutcome::Duplicate => inner.stats.duplicates += 1,
            PushOutcome::Excluded => inner.stats.excluded += 1,
            PushOutcome::NotIncluded => inner.stats.not_included += 1,
            PushOutcome::TooDeep => inner.stats.too_deep += 1,
        }
        outcome
    }

    /// Takes the oldest queued entry
    pub fn pop(&self) -> Option<FrontierEntry> {
        self.inner.lock().queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn stats(&self) -> FrontierStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn open_frontier() -> Frontier {
        Frontier::new(UrlFilter::default(), None, false)
    }

    #[test]
    fn test_fifo_order() {
        let frontier = open_frontier();
        frontier.seed(url("https://a.test/1"));
        frontier.push(url("https://a.test/2"), 1);
        frontier.push(url("https://a.test/3"), 1);

        let order: Vec<_> = std::iter::from_fn(|| frontier.pop())
            .map(|e| e.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/1", "/2", "/3"]);
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_duplicates_are_dropped_after_pop() {
        let frontier = open_frontier();
        assert_eq!(frontier.seed(url("https://a.test/p")), PushOutcome::Queued);
        frontier.pop();
        assert_eq!(
            frontier.push(url("HTTPS://A.test:443/p#top"), 1),
            PushOutcome::Duplicate
        );
        assert!(frontier.is_empty());
        assert_eq!(frontier.stats().duplicates, 1);
    }

    #[test]
    fn test_fragments_distinguish_when_enabled() {
        let frontier = Frontier::new(UrlFilter::default(), None, true);
        assert_eq!(frontier.push(url("https://a.test/#a"), 0), PushOutcome::Queued);
        assert_eq!(frontier.push(url("https://a.test/#b"), 0), PushOutcome::Queued);
        assert_eq!(frontier.push(url("https://a.test/#a"), 0), PushOutcome::Duplicate);
    }

    #[test]
    fn test_fragment_stripped_from_queued_url() {
        let frontier = open_frontier();
        frontier.push(url("https://a.test/p#section"), 1);
        assert_eq!(frontier.pop().unwrap().url.as_str(), "https://a.test/p");
    }

    #[test]
    fn test_globs_apply_to_pushes_but_not_seeds() {
        let filter = UrlFilter::new(["https://a.test/docs/**"], ["**/private/**"]).unwrap();
        let frontier = Frontier::new(filter, None, false);

        assert_eq!(frontier.seed(url("https://a.test/")), PushOutcome::Queued);
        assert_eq!(
            frontier.push(url("https://a.test/blog/x"), 1),
            PushOutcome::NotIncluded
        );
        assert_eq!(
            frontier.push(url("https://a.test/docs/private/x"), 1),
            PushOutcome::Excluded
        );
        assert_eq!(
            frontier.push(url("https://a.test/docs/guide"), 1),
            PushOutcome::Queued
        );

        let stats = frontier.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.filtered(), 2);
    }

    #[test]
    fn test_too_deep_url_can_be_queued_later_at_lower_depth() {
        let frontier = Frontier::new(UrlFilter::default(), Some(1), false);
        assert_eq!(frontier.push(url("https://a.test/x"), 2), PushOutcome::TooDeep);
        assert_eq!(frontier.push(url("https://a.test/x"), 1), PushOutcome::Queued);
        assert_eq!(frontier.stats().too_deep, 1);
    }

    #[test]
    fn test_concurrent_pushes_queue_once() {
        let frontier = Arc::new(open_frontier());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        frontier.push(url(&format!("https://a.test/{}", n)), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(frontier.len(), 50);
        assert_eq!(frontier.stats().duplicates, 7 * 50);
    }
}
