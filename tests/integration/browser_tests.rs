//! Sandbox wrapper tests against a real Chrome
//!
//! Run with `cargo test -- --ignored` on a machine with Chrome installed.

use ripple_harvest::browser::{BrowserDriver, ChromeDriver, LaunchOptions};
use ripple_harvest::config::BrowserConfig;
use ripple_harvest::output::FieldValue;
use ripple_harvest::sandbox::{ExtractionErrorKind, PageContext, Sandbox, SandboxOutput};
use std::time::Duration;
use url::Url;

const PAGE: &str = "data:text/html,<title>Sandbox</title><h1>Hello</h1>";

async fn extract(source: &str) -> SandboxOutput {
    let driver = ChromeDriver::new(BrowserConfig::default());
    let mut session = driver
        .open_session(&LaunchOptions::default())
        .await
        .expect("chrome should start");
    let url = Url::parse(PAGE).unwrap();
    session
        .navigate(&url, Duration::from_secs(30))
        .await
        .expect("data URL should load");

    let sandbox = Sandbox::new(source, Duration::from_secs(10), vec![]).unwrap();
    let ctx = PageContext {
        url: &url,
        compat: false,
    };
    let output = sandbox.execute(session.as_mut(), &ctx).await;

    session.close().await.unwrap();
    driver.shutdown().await;
    output
}

fn error_kind(output: SandboxOutput) -> ExtractionErrorKind {
    output.result.unwrap_err().kind
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_number_return_is_malformed() {
    let output = extract("return 42;").await;
    assert_eq!(error_kind(output), ExtractionErrorKind::MalformedResult);
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_unknown_capability_throws() {
    let err = extract("return { v: context.foo };")
        .await
        .result
        .unwrap_err();
    assert_eq!(err.kind, ExtractionErrorKind::Thrown);
    assert!(err.message.contains("context.foo is not available"), "{}", err.message);
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_context_is_read_only() {
    let output = extract("context.url = 'x'; return { a: 1 };").await;
    assert_eq!(error_kind(output), ExtractionErrorKind::Thrown);
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_network_globals_are_shadowed() {
    let record = extract("return { fetch: typeof fetch, worker: typeof Worker };")
        .await
        .result
        .unwrap();
    assert_eq!(record.get("fetch"), Some(&FieldValue::from("undefined")));
    assert_eq!(record.get("worker"), Some(&FieldValue::from("undefined")));
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_undefined_becomes_null() {
    let record = extract("return { a: undefined, b: 1 };").await.result.unwrap();
    assert_eq!(record.get("a"), Some(&FieldValue::Null));
    assert_eq!(record.get("b"), Some(&FieldValue::from(1)));
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_non_finite_number_is_malformed() {
    let err = extract("return { a: NaN };").await.result.unwrap_err();
    assert_eq!(err.kind, ExtractionErrorKind::MalformedResult);
    assert!(err.message.contains("non-finite"), "{}", err.message);
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_field_order_is_preserved() {
    let record = extract("return { zeta: 1, alpha: 'x', mid: true };")
        .await
        .result
        .unwrap();
    let keys: Vec<&str> = record.keys().collect();
    assert_eq!(keys, vec!["url", "zeta", "alpha", "mid"]);
    assert_eq!(record.url(), Some(Url::parse(PAGE).unwrap().as_str()));
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn test_chrome_syntax_error_and_await() {
    assert_eq!(error_kind(extract("return {").await), ExtractionErrorKind::Syntax);

    let output = extract(
        "await Promise.resolve(); context.log.info('reading', document.title); \
         return { heading: document.querySelector('h1').textContent };",
    )
    .await;
    let record = output.result.unwrap();
    assert_eq!(record.get("heading"), Some(&FieldValue::from("Hello")));
    assert_eq!(output.logs.len(), 1);
    assert_eq!(output.logs[0].message, "reading Sandbox");
}
