//! Run report returned to callers

use super::record::ExtractedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Run-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub pages_visited: u64,
    pub pages_succeeded: u64,
    pub pages_failed: u64,
    pub pages_queued: u64,
    /// Discovered URLs rejected by glob filters or the depth limit
    pub pages_filtered: u64,
    pub duplicates: u64,
    pub records_collected: u64,
    pub records_dropped: u64,
    pub retries: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A page that ended in failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageErrorEntry {
    pub url: String,
    pub depth: u32,
    pub attempts: u32,
    pub kind: String,
    pub message: String,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    /// Set when the run was aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub records: Vec<ExtractedRecord>,
    pub stats: RunStats,
    pub errors: Vec<PageErrorEntry>,
    /// SHA-256 fingerprint of the validated request
    pub request_hash: String,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Failed pages grouped by error kind
    pub fn error_summary(&self) -> BTreeMap<&str, usize> {
        let mut summary = BTreeMap::new();
        for entry in &self.errors {
            *summary.entry(entry.kind.as_str()).or_insert(0) += 1;
        }
        summary
    }
}

/// Prints a run report summary to stdout in a formatted manner
pub fn print_report(report: &RunReport) {
    let stats = &report.stats;
    println!("=== Crawl Report ===\n");

    match (&report.status, &report.reason) {
        (RunStatus::Aborted, Some(reason)) => println!("Status: aborted ({})", reason),
        (RunStatus::Aborted, None) => println!("Status: aborted"),
        (RunStatus::Completed, _) => println!("Status: completed"),
    }
    println!("Request hash: {}", report.request_hash);
    println!(
        "Duration: {:.1}s",
        stats.duration_ms as f64 / 1000.0
    );
    println!();

    println!("Pages:");
    println!("  Visited: {}", stats.pages_visited);
    println!("  Succeeded: {}", stats.pages_succeeded);
    println!("  Failed: {}", stats.pages_failed);
    println!("  Queued: {}", stats.pages_queued);
    println!("  Filtered: {}", stats.pages_filtered);
    println!("  Duplicates: {}", stats.duplicates);
    println!("  Retries: {}", stats.retries);
    println!();

    println!("Records:");
    println!("  Collected: {}", stats.records_collected);
    println!("  Dropped: {}", stats.records_dropped);
    println!();

    let summary = report.error_summary();
    if !summary.is_empty() {
        println!("Error Summary:");
        let mut counts: Vec<_> = summary.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        for (kind, count) in counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    let success_rate = if stats.pages_visited > 0 {
        (stats.pages_succeeded as f64 / stats.pages_visited as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} pages extracted)",
        success_rate, stats.pages_succeeded, stats.pages_visited
    );
}
