use crate::common::{harness, record_urls, request};
use ripple_harvest::browser::ScriptedPage;
use ripple_harvest::output::{EventKind, EventLevel, FieldValue};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_non_object_return_fails_page_only() {
    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html("").returning(json!(42)));

    let mut raw = request(&["https://example.test/"]);
    raw.page_function = Some("return 42;".to_string());
    let report = h.crawl(raw).await;

    assert!(report.is_completed());
    assert!(report.records.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "malformed_result");
}

#[tokio::test(start_paused = true)]
async fn test_misbehaving_page_functions_are_isolated() {
    let h = harness();
    let links = r#"<a href="/throw">t</a><a href="/syntax">s</a><a href="/hang">h</a><a href="/nested">n</a><a href="/crash">c</a>"#;
    h.driver.add_page("https://example.test/", ScriptedPage::html(links));
    h.driver.add_page("https://example.test/throw", ScriptedPage::html("").throwing("nope"));
    h.driver.add_page("https://example.test/syntax", ScriptedPage::html("").syntax_error("Unexpected token"));
    h.driver.add_page("https://example.test/hang", ScriptedPage::html("").hanging_extraction());
    h.driver.add_page(
        "https://example.test/nested",
        ScriptedPage::html("").returning(json!({ "items": [1, 2] })),
    );
    h.driver.add_page("https://example.test/crash", ScriptedPage::html("").panicking());

    let mut raw = request(&["https://example.test/"]);
    raw.page_function_timeout = Some(2);
    let report = h.crawl(raw).await;

    assert!(report.is_completed());
    assert_eq!(record_urls(&report), vec!["https://example.test/"]);

    let mut kinds: Vec<(&str, &str)> = report
        .errors
        .iter()
        .map(|e| (e.url.as_str(), e.kind.as_str()))
        .collect();
    kinds.sort();
    assert_eq!(
        kinds,
        vec![
            ("https://example.test/crash", "internal"),
            ("https://example.test/hang", "timeout"),
            ("https://example.test/nested", "malformed_result"),
            ("https://example.test/syntax", "syntax"),
            ("https://example.test/throw", "thrown"),
        ]
    );
}

#[tokio::test]
async fn test_required_fields_policy() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/partial">p</a>"#)
            .returning(json!({ "title": "Home", "price": 3 })),
    );
    h.driver.add_page(
        "https://example.test/partial",
        ScriptedPage::html("").returning(json!({ "title": "Partial" })),
    );

    let mut raw = request(&["https://example.test/"]);
    raw.required_fields = vec!["title".to_string(), "price".to_string()];
    let report = h.crawl(raw).await;

    assert_eq!(record_urls(&report), vec!["https://example.test/"]);
    assert_eq!(report.records[0].get("price"), Some(&FieldValue::from(3)));
    assert_eq!(report.errors[0].url, "https://example.test/partial");
    assert_eq!(report.errors[0].kind, "malformed_result");
}

#[tokio::test]
async fn test_record_field_order_starts_with_url() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html("").returning(json!({ "zeta": 1, "alpha": "a", "url": "spoofed", "none": null })),
    );

    let report = h.crawl(request(&["https://example.test/"])).await;

    let keys: Vec<&str> = report.records[0].keys().collect();
    assert_eq!(keys, vec!["url", "zeta", "alpha", "none"]);
    assert_eq!(report.records[0].url(), Some("https://example.test/"));
}

#[tokio::test]
async fn test_page_logs_are_reemitted_with_url() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html("").with_logs(vec![("info", "found 3 items"), ("error", "no price")]),
    );

    h.crawl(request(&["https://example.test/"])).await;

    let logs = h.sink.of_kind(EventKind::PageLog);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message, "found 3 items");
    assert_eq!(logs[1].level, EventLevel::Error);
    assert_eq!(
        logs[1].field("url").and_then(|v| v.as_str()),
        Some("https://example.test/")
    );
}

#[tokio::test(start_paused = true)]
async fn test_compat_injection_failure_does_not_stop_extraction() {
    let h = harness();
    h.driver.add_page(
        "https://example.test/",
        ScriptedPage::html(r#"<a href="/slow">s</a>"#).failing_compat(),
    );
    h.driver.add_page("https://example.test/slow", ScriptedPage::html("").hanging_compat());

    let mut raw = request(&["https://example.test/"]);
    raw.inject_jquery = Some(true);
    let report = h.crawl(raw).await;

    assert!(report.errors.is_empty());
    assert_eq!(report.records.len(), 2);
    assert_eq!(h.driver.compat_injections("https://example.test/"), 1);
    assert_eq!(h.driver.compat_injections("https://example.test/slow"), 1);
}

#[tokio::test]
async fn test_forbidden_construct_rejected_before_crawling() {
    let h = harness();
    h.driver.add_page("https://example.test/", ScriptedPage::html(""));

    let mut raw = request(&["https://example.test/"]);
    raw.page_function = Some("const r = await fetch('/api'); return { r };".to_string());
    let err = h
        .controller
        .start_crawl(&raw, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.has_field("pageFunction"));
    assert_eq!(h.driver.sessions_opened(), 0);
}
