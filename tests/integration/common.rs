use ripple_harvest::browser::ScriptedDriver;
use ripple_harvest::config::Config;
use ripple_harvest::output::MemorySink;
use ripple_harvest::{RawCrawlRequest, RunController, RunReport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub driver: ScriptedDriver,
    pub sink: Arc<MemorySink>,
    pub controller: RunController,
}

/// A controller over a fresh scripted site with fast retries
pub fn harness() -> Harness {
    let mut config = Config::default();
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    harness_with(config)
}

pub fn harness_with(config: Config) -> Harness {
    let driver = ScriptedDriver::new();
    let sink = Arc::new(MemorySink::new());
    let controller = RunController::new(config, Arc::new(driver.clone()), sink.clone());
    Harness {
        driver,
        sink,
        controller,
    }
}

/// A request over `seeds` returning `{ ok: true }`, following every link
pub fn request(seeds: &[&str]) -> RawCrawlRequest {
    RawCrawlRequest {
        start_urls: seeds.iter().map(|s| (*s).into()).collect(),
        link_selector: Some("a[href]".to_string()),
        page_function: Some("return { ok: true };".to_string()),
        ..RawCrawlRequest::default()
    }
}

impl Harness {
    pub async fn crawl(&self, raw: RawCrawlRequest) -> RunReport {
        self.controller
            .start_crawl(&raw, CancellationToken::new())
            .await
            .expect("request should be valid")
    }
}

pub fn record_urls(report: &RunReport) -> Vec<String> {
    report
        .records
        .iter()
        .filter_map(|r| r.url())
        .map(str::to_string)
        .collect()
}
