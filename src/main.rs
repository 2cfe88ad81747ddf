use anyhow::Result;
use clap::{ArgAction, Parser};
use std::process::ExitCode;
use vfb_reports::presentation::cli_summary::{print_batch_summary, print_perf_summary};
use vfb_reports::{init_tracing, AppConfig, LogLevel, RunOptions};

#[derive(Parser, Debug)]
#[command(
    name = "vfb-reports",
    about = "Generate, compare and persist content reports from VFB graph database servers."
)]
struct Cli {
    /// Config file; `./vfb-reports.toml` or the user config dir when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Output format: tsv, md or all. Overrides `output.formats`.
    #[arg(short, long)]
    format: Option<String>,

    /// Only run this report definition, or `content_report` (repeatable).
    #[arg(long = "only", action = ArgAction::Append)]
    only: Vec<String>,

    /// Query and diff everything but write no files.
    #[arg(long)]
    dry_run: bool,

    /// Print per-query and per-diff timings.
    #[arg(long)]
    timings: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(if cli.quiet {
        LogLevel::Error
    } else if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    let path = cli
        .config
        .unwrap_or_else(|| AppConfig::default_path().display().to_string());
    let cfg = AppConfig::load(&path)?;

    let opts = RunOptions {
        only: cli.only,
        formats: cli.format.into_iter().collect(),
        dry_run: cli.dry_run,
    };
    let (summary, perf) = vfb_reports::run_with_timing(&cfg, &opts).await?;

    if !cli.quiet {
        print_batch_summary(&summary);
    }
    if cli.timings {
        print_perf_summary(&perf);
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
