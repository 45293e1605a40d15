use crate::common::{harness, record_urls, request};
use ripple_harvest::browser::{NavigationError, ScriptedPage};
use ripple_harvest::output::EventKind;
use ripple_harvest::RunStatus;
use std::time::Duration;

fn seeds(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://example.test/{}", i)).collect()
}

fn refs(urls: &[String]) -> Vec<&str> {
    urls.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn test_single_worker_runs_seeds_sequentially() {
    let h = harness();
    let urls = seeds(3);
    for url in &urls {
        h.driver.add_page(url, ScriptedPage::html("").with_delay(Duration::from_millis(5)));
    }

    let mut raw = request(&refs(&urls));
    raw.max_concurrency = Some(1);
    let report = h.crawl(raw).await;

    assert_eq!(h.driver.sessions_opened(), 3);
    assert_eq!(h.driver.max_active_sessions(), 1);
    assert_eq!(report.records.len(), 3);
    assert_eq!(record_urls(&report), urls);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let h = harness();
    let urls = seeds(8);
    for url in &urls {
        h.driver.add_page(url, ScriptedPage::html("").with_delay(Duration::from_millis(10)));
    }

    let mut raw = request(&refs(&urls));
    raw.max_concurrency = Some(3);
    let report = h.crawl(raw).await;

    assert_eq!(report.records.len(), 8);
    assert!(h.driver.max_active_sessions() <= 3);
    assert!(h.driver.max_active_sessions() >= 2);
}

#[tokio::test]
async fn test_record_cap_is_idempotent() {
    let h = harness();
    let urls = seeds(5);
    for url in &urls {
        h.driver.add_page(url, ScriptedPage::html(""));
    }

    let mut raw = request(&refs(&urls));
    raw.max_result_records = Some(2);
    raw.max_concurrency = Some(5);
    let report = h.crawl(raw).await;

    assert!(report.is_completed());
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.stats.records_collected, 2);
    assert_eq!(report.stats.records_dropped, 3);
    assert_eq!(h.sink.count(EventKind::RecordDropped), 3);
}

#[tokio::test]
async fn test_record_cap_stops_dispatch() {
    let h = harness();
    let urls = seeds(5);
    for url in &urls {
        h.driver.add_page(url, ScriptedPage::html(""));
    }

    let mut raw = request(&refs(&urls));
    raw.max_result_records = Some(2);
    raw.max_concurrency = Some(1);
    let report = h.crawl(raw).await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(h.driver.total_visits(), 2);
    assert_eq!(report.stats.records_dropped, 0);
}

#[tokio::test]
async fn test_page_cap_limits_visits() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(
            r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a><a href="/4">4</a>"#,
        ),
    );
    for url in seeds(5) {
        h.driver.add_page(&url, ScriptedPage::html(""));
    }

    let mut raw = request(&["https://example.test/"]);
    raw.max_pages_per_run = Some(3);
    let report = h.crawl(raw).await;

    assert!(report.is_completed());
    assert_eq!(report.stats.pages_visited, 3);
    assert_eq!(h.driver.total_visits(), 3);
}

#[tokio::test]
async fn test_zero_limits_are_unlimited() {
    let h = harness();
    let urls = seeds(4);
    for url in &urls {
        h.driver.add_page(url, ScriptedPage::html(""));
    }

    let mut raw = request(&refs(&urls));
    raw.max_pages_per_run = Some(0);
    raw.max_result_records = Some(0);
    raw.max_crawling_depth = Some(0);
    let report = h.crawl(raw).await;

    assert_eq!(report.records.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_attempted_retries_plus_one_times() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html("").always_failing(NavigationError::Network("connection reset".into())),
    );

    let mut raw = request(&["https://example.test/"]);
    raw.max_page_retries = Some(2);
    let report = h.crawl(raw).await;

    assert!(report.is_completed());
    assert_eq!(h.driver.visits("https://example.test/"), 3);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].attempts, 3);
    assert_eq!(report.errors[0].kind, "network");
}

#[tokio::test(start_paused = true)]
async fn test_retry_does_not_block_other_pages() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/0",
        ScriptedPage::html("").failing_navigation(NavigationError::Timeout { after_ms: 10 }, 2),
    );
    h.driver.add_page("https://example.test/1", ScriptedPage::html(""));

    let mut raw = request(&["https://example.test/0", "https://example.test/1"]);
    raw.max_concurrency = Some(1);
    let report = h.crawl(raw).await;

    assert_eq!(
        record_urls(&report),
        vec!["https://example.test/1", "https://example.test/0"]
    );
    assert_eq!(report.stats.retries, 2);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html("").status(404));

    let report = h.crawl(request(&["https://example.test/"])).await;

    assert_eq!(h.driver.visits("https://example.test/"), 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.errors[0].kind, "http_status");
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_are_retried() {
    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html("").status(502));

    let mut raw = request(&["https://example.test/"]);
    raw.max_page_retries = Some(1);
    let report = h.crawl(raw).await;

    assert_eq!(h.driver.visits("https://example.test/"), 2);
    assert_eq!(report.errors[0].attempts, 2);
}
