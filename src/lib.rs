use anyhow::{bail, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of vfb-reports' internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                              |
/// |---------|-----------------|------------------------------------------|
/// | `Error` | `error`         | `--quiet` / cron jobs                    |
/// | `Info`  | `info`          | Default: one line per report and diff    |
/// | `Debug` | `debug`         | `--verbose`: shows the Cypher sent too   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise. Library
/// consumers who manage their own subscriber should skip this.
///
/// Only available with the `cli` feature (pulls in `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "vfb_reports=error",
        LogLevel::Info => "vfb_reports=info",
        LogLevel::Debug => "vfb_reports=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::batch::{BatchSummary, Outcome, TaskKind, TaskOutcome};
pub use application::catalog::ReportCatalog;
pub use application::content::{build_content_report, ContentReport, CONTENT_REPORT};
pub use application::diff::ReportDiffer;
pub use application::monitoring::PerfReport;
pub use application::table_builder::TableBuilder;
pub use domain::definition::{QueryRewrite, ReportDefinition};
pub use domain::diff_result::{DiffResult, PROVENANCE_COLUMN};
pub use domain::error::ReportError;
pub use domain::fingerprint::fingerprint;
pub use domain::ports::{Differ, OutputWriter, QueryExecutor};
pub use domain::report::{Record, Report, RowMap};
pub use domain::value_objects::Fingerprint;
pub use infrastructure::config::{AppConfig, DiffConfig, OutputConfig, QueryConfig, ServerConfig};

use crate::application::batch::BatchRunner;
use crate::application::monitoring::{MonitoringDiffer, MonitoringExecutor};
use crate::infrastructure::neo4j::Neo4jExecutor;
use crate::presentation::writers::{all_writers, writer_for};

/// Per-invocation choices layered over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run only these report definitions (or `content_report`); all of them
    /// when empty.
    pub only: Vec<String>,
    /// Output formats (`tsv`, `md`, or `all`); the config's when empty.
    pub formats: Vec<String>,
    /// Build and diff everything but write nothing.
    pub dry_run: bool,
}

// ─── Public entry points ───

/// Generate every configured report on every server, write them, and diff
/// each server against the baseline.
///
/// Individual report, diff or write failures are recorded in the returned
/// summary; an `Err` means the run could not start at all.
pub async fn run(cfg: &AppConfig, opts: &RunOptions) -> Result<BatchSummary> {
    let (summary, _) = run_with_timing(cfg, opts).await?;
    Ok(summary)
}

/// [`run`] plus a [`PerfReport`] with per-query and per-diff timings.
pub async fn run_with_timing(
    cfg: &AppConfig,
    opts: &RunOptions,
) -> Result<(BatchSummary, PerfReport)> {
    let perf = PerfReport::new();

    let executor = Arc::new(MonitoringExecutor::new(
        Arc::new(Neo4jExecutor::new(&cfg.query)?),
        Arc::clone(&perf),
    ));
    let differ = Arc::new(MonitoringDiffer::new(
        Arc::new(ReportDiffer::new()),
        Arc::clone(&perf),
    ));

    let mut catalog = ReportCatalog::from_config(executor, cfg);
    let mut content_servers = cfg.content.servers.clone();
    if !opts.only.is_empty() {
        for name in &opts.only {
            if name != CONTENT_REPORT && catalog.definition(name).is_none() {
                bail!("Unknown report: {}", name);
            }
        }
        catalog.retain(&opts.only);
        if !opts.only.iter().any(|n| n == CONTENT_REPORT) {
            content_servers.clear();
        }
    }

    let formats = if opts.formats.is_empty() {
        &cfg.output.formats
    } else {
        &opts.formats
    };
    let writers = build_writers(formats)?;

    let runner = BatchRunner::new(catalog, differ, writers, PathBuf::from(&cfg.output.dir))
        .dry_run(opts.dry_run)
        .with_content_report(content_servers);
    let summary = runner.run(&cfg.servers, cfg.baseline()).await;

    Ok((summary, PerfReport::snapshot(&perf)))
}

// ─── Private helpers ───────────────────────────────────────────────────────────

fn build_writers(formats: &[String]) -> Result<Vec<Box<dyn OutputWriter>>> {
    let now = Utc::now();
    if formats.iter().any(|f| f == "all") {
        return Ok(all_writers(now));
    }
    let mut writers: Vec<Box<dyn OutputWriter>> = Vec::new();
    for format in formats {
        let Some(writer) = writer_for(format, now) else {
            bail!("Unknown format: {}", format);
        };
        if !writers.iter().any(|w| w.extension() == writer.extension()) {
            writers.push(writer);
        }
    }
    if writers.is_empty() {
        bail!("No output format configured");
    }
    Ok(writers)
}
