use crate::common::{harness, record_urls, request};
use ripple_harvest::browser::ScriptedPage;
use ripple_harvest::output::EventKind;
use ripple_harvest::RunStatus;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_depth_one_crawl_visits_two_pages() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a>"#),
    );
    h.driver.add_page(
        "https://example.test/a",
        ScriptedPage::html(r#"<a href="/b">b</a>"#),
    );
    h.driver.add_page("https://example.test/b", ScriptedPage::html(""));

    let mut raw = request(&["https://example.test/"]);
    raw.max_crawling_depth = Some(1);
    raw.max_pages_per_run = Some(10);
    let report = h.crawl(raw).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.pages_visited, 2);
    assert_eq!(h.driver.visits("https://example.test/b"), 0);
    assert_eq!(
        record_urls(&report),
        vec!["https://example.test/", "https://example.test/a"]
    );
}

#[tokio::test]
async fn test_seed_only_without_link_selector() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a>"#),
    );

    let mut raw = request(&["https://example.test/"]);
    raw.link_selector = Some("   ".to_string());
    let report = h.crawl(raw).await;

    assert_eq!(report.stats.pages_visited, 1);
    assert_eq!(h.driver.visits("https://example.test/a"), 0);
}

#[tokio::test]
async fn test_globs_filter_discovered_links_but_not_seeds() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(
            r#"<a href="/docs/a">a</a><a href="/docs/private/b">b</a><a href="/blog/x">x</a>"#,
        ),
    );
    h.driver.add_page("https://example.test/docs/a", ScriptedPage::html(""));

    let mut raw = request(&["https://example.test/"]);
    raw.glob_patterns = vec!["https://example.test/docs/**".to_string(), String::new()];
    raw.exclude_glob_patterns = vec!["**/private/**".to_string()];
    let report = h.crawl(raw).await;

    assert_eq!(report.stats.pages_visited, 2);
    assert_eq!(report.stats.pages_filtered, 2);
    assert_eq!(
        record_urls(&report),
        vec!["https://example.test/", "https://example.test/docs/a"]
    );
}

#[tokio::test]
async fn test_fragments_collapse_unless_enabled() {
    let html = r#"<a href="/p#x">x</a><a href="/p#y">y</a>"#;

    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html(html));
    h.driver.add_page("https://example.test/p", ScriptedPage::html(""));
    let report = h.crawl(request(&["https://example.test/"])).await;
    assert_eq!(report.stats.pages_visited, 2);

    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html(html));
    h.driver.add_page("https://example.test/p#x", ScriptedPage::html(""));
    h.driver.add_page("https://example.test/p#y", ScriptedPage::html(""));
    let mut raw = request(&["https://example.test/"]);
    raw.url_fragments = Some(true);
    let report = h.crawl(raw).await;
    assert_eq!(report.stats.pages_visited, 3);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_link_cycles_visit_each_page_once() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a><a href="/b">b</a>"#),
    );
    h.driver.add_page(
        "https://example.test/a",
        ScriptedPage::html(r#"<a href="/">home</a><a href="/b">b</a>"#),
    );
    h.driver.add_page(
        "https://example.test/b",
        ScriptedPage::html(r#"<a href="/a">a</a><a href="https://EXAMPLE.test:443/">home</a>"#),
    );

    let report = h.crawl(request(&["https://example.test/"])).await;

    assert_eq!(report.stats.pages_visited, 3);
    assert_eq!(h.driver.total_visits(), 3);
    assert_eq!(report.stats.duplicates, 4);
}

#[tokio::test]
async fn test_links_followed_when_extraction_fails() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a>"#).throwing("selector missing"),
    );
    h.driver.add_page("https://example.test/a", ScriptedPage::html(""));

    let report = h.crawl(request(&["https://example.test/"])).await;

    assert!(report.is_completed());
    assert_eq!(record_urls(&report), vec!["https://example.test/a"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "thrown");
    assert_eq!(report.stats.pages_failed, 1);
    assert_eq!(report.stats.pages_succeeded, 1);
}

#[tokio::test]
async fn test_events_cover_the_run() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/missing">m</a>"#),
    );

    let report = h.crawl(request(&["https://example.test/"])).await;

    assert_eq!(report.errors[0].kind, "http_status");
    assert_eq!(h.sink.count(EventKind::RunStarted), 1);
    assert_eq!(h.sink.count(EventKind::PageStarted), 2);
    assert_eq!(h.sink.count(EventKind::PageCompleted), 1);
    assert_eq!(h.sink.count(EventKind::PageFailed), 1);
    assert_eq!(h.sink.count(EventKind::RunCompleted), 1);

    let failed = &h.sink.of_kind(EventKind::PageFailed)[0];
    assert_eq!(
        failed.field("url").and_then(|v| v.as_str()),
        Some("https://example.test/missing")
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_lets_in_flight_pages_finish() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a><a href="/b">b</a>"#)
            .with_delay(Duration::from_millis(100)),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let raw = request(&["https://example.test/"]);
    let (report, _) = tokio::join!(h.controller.start_crawl(&raw, cancel), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let report = report.unwrap();

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.reason.as_deref(), Some("cancelled"));
    assert_eq!(record_urls(&report), vec!["https://example.test/"]);
    assert_eq!(h.driver.total_visits(), 1);
    assert_eq!(h.driver.active_sessions(), 0);
    assert_eq!(h.sink.count(EventKind::RunAborted), 1);
}

#[tokio::test(start_paused = true)]
async fn test_browser_loss_aborts_with_partial_results() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/a">a</a><a href="/b">b</a>"#)
            .with_delay(Duration::from_millis(50)),
    );

    let mut raw = request(&["https://example.test/"]);
    raw.max_concurrency = Some(1);
    raw.max_page_retries = Some(10);
    let driver = h.driver.clone();
    let (report, _) = tokio::join!(h.crawl(raw), async move {
        while driver.sessions_opened() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        driver.fail_all_sessions();
    });

    assert_eq!(report.status, RunStatus::Aborted);
    assert!(report
        .reason
        .as_deref()
        .unwrap()
        .starts_with("browser unavailable"));
    assert_eq!(record_urls(&report), vec!["https://example.test/"]);
    assert!(report.errors.iter().any(|e| e.kind == "session"));
}
