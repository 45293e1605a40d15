//! Ripple-Harvest main entry point
//!
//! This is the command-line interface for the Ripple-Harvest crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ripple_harvest::browser::{BrowserDriver, ChromeDriver};
use ripple_harvest::config::{load_config_with_hash, Config};
use ripple_harvest::output::{print_report, BroadcastSink, EventSink, FanoutSink, TracingSink};
use ripple_harvest::request::{validate_json, ConfigValidationError};
use ripple_harvest::server::{serve, AppState};
use ripple_harvest::RunController;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Ripple-Harvest: a sandboxed extraction crawler
///
/// Crawls the pages reachable from a set of start URLs in a headless
/// browser, runs a page function against each one and collects the
/// records it returns.
#[derive(Parser, Debug)]
#[command(name = "ripple-harvest")]
#[command(version)]
#[command(about = "A sandboxed extraction crawler", long_about = None)]
struct Cli {
    /// Path to TOML service configuration (defaults apply when omitted)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Override the configured bind address
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },

    /// Run one crawl request from a JSON file
    Run {
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// Write the full JSON report here
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Validate a crawl request without crawling
    Validate {
        #[arg(value_name = "REQUEST")]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    match cli.command {
        Command::Serve { bind } => handle_serve(config, bind).await,
        Command::Run { request, output } => handle_run(config, &request, output.as_deref()).await,
        Command::Validate { request } => handle_validate(&config, &request),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_harvest=info,warn"),
            1 => EnvFilter::new("ripple_harvest=debug,info"),
            2 => EnvFilter::new("ripple_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn read_request(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_issues(error: &ConfigValidationError) {
    println!("✗ Request is invalid:");
    for issue in &error.issues {
        println!("  - {}: {}", issue.field, issue.message);
    }
}

/// Cancels `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            token.cancel();
        }
    });
}

/// Handles `serve`: runs the HTTP API until Ctrl-C
async fn handle_serve(config: Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = match bind {
        Some(addr) => addr,
        None => config
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {}", config.server.bind))?,
    };

    let driver = Arc::new(ChromeDriver::new(config.browser.clone()));
    let events = BroadcastSink::new(1024);
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink), Arc::new(events.clone())];
    let controller = RunController::new(config, driver.clone(), Arc::new(FanoutSink::new(sinks)));

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = AppState {
        controller: Arc::new(controller),
        events,
        shutdown,
    };
    let served = serve(addr, state).await;

    driver.shutdown().await;
    served?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Handles `run`: crawls one request and prints its report
async fn handle_run(config: Config, path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let body = read_request(path)?;

    let driver = Arc::new(ChromeDriver::new(config.browser.clone()));
    let controller = RunController::new(config, driver.clone(), Arc::new(TracingSink));
    let request = match controller.validate_json(&body) {
        Ok(request) => request,
        Err(e) => {
            print_issues(&e);
            return Err(e.into());
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = controller.run(&request, cancel).await;
    driver.shutdown().await;

    print_report(&report);

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(output, json)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("\n✓ Report written to: {}", output.display());
    }

    if !report.is_completed() {
        bail!(
            "crawl aborted: {}",
            report.reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

/// Handles `validate`: checks a request and shows what would be crawled
fn handle_validate(config: &Config, path: &Path) -> anyhow::Result<()> {
    let body = read_request(path)?;

    let request = match validate_json(&body, config) {
        Ok(request) => request,
        Err(e) => {
            print_issues(&e);
            return Err(e.into());
        }
    };

    println!("=== Ripple-Harvest Request ===\n");
    println!("Start URLs ({}):", request.seeds.len());
    for seed in &request.seeds {
        println!("  * {}", seed);
    }

    println!("\nCrawl:");
    match &request.link_selector {
        Some(selector) => println!("  Link selector: {}", selector),
        None => println!("  Link selector: none (start URLs only)"),
    }
    println!("  Include globs: {}", request.include_globs.len());
    println!("  Exclude globs: {}", request.exclude_globs.len());
    println!("  Max concurrency: {}", request.max_concurrency);
    println!("  Max retries: {}", request.max_retries);
    println!("  Max pages: {}", limit(request.max_pages));
    println!("  Max records: {}", limit(request.max_records));
    println!("  Max depth: {}", limit(request.max_depth.map(u64::from)));

    println!("\n✓ Request is valid (hash: {})", request.fingerprint());
    Ok(())
}

fn limit(value: Option<u64>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}
