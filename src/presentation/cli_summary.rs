use crate::application::batch::{BatchSummary, Outcome, TaskOutcome};
use crate::application::monitoring::PerfReport;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct TaskRow {
    kind: String,
    name: String,
    status: String,
    rows: String,
    detail: String,
}

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

pub fn print_batch_summary(summary: &BatchSummary) {
    println!();

    println!("{}", "VFB REPORTS SUMMARY".bold().cyan());
    println!("Run: {}", summary.run_id.bright_yellow());
    println!(
        "Started: {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if summary.outcomes.is_empty() {
        println!("{}", "Nothing to run.".italic());
        return;
    }

    let rows: Vec<TaskRow> = summary.outcomes.iter().map(task_row).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..=3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let count = |f: fn(&Outcome) -> bool| summary.outcomes.iter().filter(|o| f(&o.outcome)).count();
    let summary_rows = vec![
        SummaryRow {
            metric: "Written".into(),
            value: count(|o| matches!(o, Outcome::Written { .. }))
                .to_string()
                .green()
                .to_string(),
        },
        SummaryRow {
            metric: "Built (dry run)".into(),
            value: count(|o| matches!(o, Outcome::Built { .. }))
                .to_string()
                .cyan()
                .to_string(),
        },
        SummaryRow {
            metric: "Skipped".into(),
            value: count(|o| matches!(o, Outcome::Skipped(_)))
                .to_string()
                .yellow()
                .to_string(),
        },
        SummaryRow {
            metric: "Failed".into(),
            value: count(|o| matches!(o, Outcome::Failed(_)))
                .to_string()
                .red()
                .to_string(),
        },
    ];

    let summary_table = Table::new(summary_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();

    println!();
    println!("{summary_table}");
    println!();

    if summary.is_success() {
        println!("{}", "✓ All reports and diffs completed.".bold().green());
    } else {
        println!(
            "{}",
            "✗ Some reports or diffs failed; see the log above.".bold().red()
        );
    }
    println!();
}

fn task_row(task: &TaskOutcome) -> TaskRow {
    let (status, rows, detail) = match &task.outcome {
        Outcome::Written {
            paths,
            rows,
            fingerprint,
        } => (
            "written".green().to_string(),
            rows.to_string(),
            format!("{} file(s), {}", paths.len(), fingerprint.short().dimmed()),
        ),
        Outcome::Built { rows, fingerprint } => (
            "built".cyan().to_string(),
            rows.to_string(),
            fingerprint.short().dimmed().to_string(),
        ),
        Outcome::Skipped(reason) => ("skipped".yellow().to_string(), "-".into(), reason.clone()),
        Outcome::Failed(e) => (
            format!("failed ({})", e.kind()).red().to_string(),
            "-".into(),
            e.to_string(),
        ),
    };
    TaskRow {
        kind: task.kind.to_string().dimmed().to_string(),
        name: task.name.bold().to_string(),
        status,
        rows,
        detail,
    }
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    target: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Print a performance timing table to stdout.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: if t.ok {
                t.operation.dimmed().to_string()
            } else {
                t.operation.red().to_string()
            },
            target: t.target.bold().to_string(),
            rows: t.rows.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    println!("{table}");

    println!(
        "  Total: {} record(s) fetched  ·  {} ms elapsed",
        report.total_records_fetched().to_string().bold(),
        format_duration(report.total_ms()),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}
