use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::catalog::ReportCatalog;
use crate::application::content::build_content_report;
use crate::domain::{
    definition::ReportDefinition,
    diff_result::{diff_file_stem, report_file_stem},
    error::ReportError,
    fingerprint::fingerprint,
    ports::{Differ, OutputWriter},
    report::Report,
    value_objects::Fingerprint,
};
use crate::infrastructure::config::ServerConfig;
use crate::presentation::writers::{content::render_content_report, write_all, write_text};

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Report,
    Diff,
    Content,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Report => f.write_str("report"),
            TaskKind::Diff => f.write_str("diff"),
            TaskKind::Content => f.write_str("content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Built and persisted with every configured writer.
    Written {
        paths: Vec<PathBuf>,
        rows: usize,
        fingerprint: Fingerprint,
    },
    /// Built but not persisted (dry run).
    Built { rows: usize, fingerprint: Fingerprint },
    Failed(ReportError),
    /// Not attempted because an input was missing.
    Skipped(String),
}

/// What happened to one report or one diff.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub kind: TaskKind,
    /// File stem of the artifact (`pdb_datasets_prod_report`, …).
    pub name: String,
    pub outcome: Outcome,
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Result of one batch run, in execution order.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchSummary {
    fn new() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!(
                "run_{}_{}",
                started_at.format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            ),
            started_at,
            outcomes: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.outcome)
    }

    fn push(&mut self, kind: TaskKind, name: String, outcome: Outcome) {
        self.outcomes.push(TaskOutcome { kind, name, outcome });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchRunner
// ─────────────────────────────────────────────────────────────────────────────

/// Runs every catalog definition on every server that wants it, writes each
/// report, then diffs each non-baseline server's report against the
/// baseline's. Content summaries for the listed servers come last.
///
/// Each step is isolated: a failed query, diff or write is recorded in the
/// summary and the run moves on. Servers are queried one at a time.
pub struct BatchRunner {
    catalog: ReportCatalog,
    differ: Arc<dyn Differ>,
    writers: Vec<Box<dyn OutputWriter>>,
    output_dir: PathBuf,
    dry_run: bool,
    content_servers: Vec<String>,
}

impl BatchRunner {
    pub fn new(
        catalog: ReportCatalog,
        differ: Arc<dyn Differ>,
        writers: Vec<Box<dyn OutputWriter>>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            differ,
            writers,
            output_dir,
            dry_run: false,
            content_servers: Vec::new(),
        }
    }

    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    /// Also write a Markdown content summary for each of these servers.
    pub fn with_content_report(mut self, servers: Vec<String>) -> Self {
        self.content_servers = servers;
        self
    }

    pub async fn run(&self, servers: &[ServerConfig], baseline: Option<&str>) -> BatchSummary {
        let mut summary = BatchSummary::new();
        info!(run_id = %summary.run_id, servers = servers.len(), "batch started");

        for definition in self.catalog.definitions() {
            let mut built: Vec<(&ServerConfig, Option<Report>)> = Vec::new();

            for server in servers.iter().filter(|s| s.runs(definition)) {
                let stem = report_file_stem(&definition.name, &server.label);
                match self.catalog.try_generate(definition, server).await {
                    Ok(report) => {
                        let outcome = self.persist(&report, &stem);
                        summary.push(TaskKind::Report, stem, outcome);
                        built.push((server, Some(report)));
                    }
                    Err(e) => {
                        error!(report = %stem, kind = e.kind(), "report skipped: {e}");
                        summary.push(TaskKind::Report, stem, Outcome::Failed(e));
                        built.push((server, None));
                    }
                }
            }

            if definition.diff {
                self.diff_against_baseline(definition, baseline, &built, &mut summary);
            }
        }

        for label in &self.content_servers {
            self.content_report(servers, label, &mut summary).await;
        }

        let failed = summary.failures().count();
        info!(
            run_id = %summary.run_id,
            tasks = summary.outcomes.len(),
            failed,
            "batch finished"
        );
        summary
    }

    fn diff_against_baseline(
        &self,
        definition: &ReportDefinition,
        baseline: Option<&str>,
        built: &[(&ServerConfig, Option<Report>)],
        summary: &mut BatchSummary,
    ) {
        let Some(baseline) = baseline else {
            return;
        };
        let Some((_, base_report)) = built.iter().find(|(s, _)| s.label == baseline) else {
            for (server, _) in built.iter().filter(|(s, _)| s.label != baseline) {
                let stem = diff_file_stem(&definition.name, baseline, &server.label);
                warn!(diff = %stem, "diff skipped: baseline '{}' does not run '{}'", baseline, definition.name);
                summary.push(
                    TaskKind::Diff,
                    stem,
                    Outcome::Skipped(format!(
                        "baseline '{}' does not run '{}'",
                        baseline, definition.name
                    )),
                );
            }
            return;
        };

        for (server, report) in built.iter().filter(|(s, _)| s.label != baseline) {
            let stem = diff_file_stem(&definition.name, baseline, &server.label);

            let (Some(left), Some(right)) = (base_report, report) else {
                let missing = if base_report.is_none() {
                    baseline
                } else {
                    server.label.as_str()
                };
                warn!(diff = %stem, "diff skipped: no '{}' report from {}", definition.name, missing);
                summary.push(
                    TaskKind::Diff,
                    stem,
                    Outcome::Skipped(format!("no report from {missing}")),
                );
                continue;
            };

            // provenance tags are the server labels
            let left = left.clone().renamed(baseline);
            let right = right.clone().renamed(&server.label);

            let outcome = match self.differ.diff(&left, &right, definition.key_column()) {
                Ok(result) => {
                    info!(diff = %stem, rows = result.len(), "diff computed");
                    self.persist(result.table(), &stem)
                }
                Err(e) => {
                    error!(diff = %stem, kind = e.kind(), "diff failed: {e}");
                    Outcome::Failed(e)
                }
            };
            summary.push(TaskKind::Diff, stem, outcome);
        }
    }

    /// Build and write the content summary of one server.
    async fn content_report(
        &self,
        servers: &[ServerConfig],
        label: &str,
        summary: &mut BatchSummary,
    ) {
        let name = format!("{label}_content_report");
        let Some(server) = servers.iter().find(|s| s.label == label) else {
            warn!(report = %name, "content report skipped: unknown server");
            summary.push(
                TaskKind::Content,
                name,
                Outcome::Skipped(format!("unknown server '{label}'")),
            );
            return;
        };

        let content = match build_content_report(&self.catalog, server, Utc::now()).await {
            Ok(content) => content,
            Err(e) => {
                error!(report = %name, kind = e.kind(), "content report failed: {e}");
                summary.push(TaskKind::Content, name, Outcome::Failed(e));
                return;
            }
        };

        let table = content.as_table();
        let rows = table.len();
        let fingerprint = fingerprint(&table);
        if self.dry_run {
            summary.push(TaskKind::Content, name, Outcome::Built { rows, fingerprint });
            return;
        }

        let file_name = format!("{name}.md");
        let written = render_content_report(&content)
            .and_then(|md| write_text(&self.output_dir, &file_name, &md));
        let outcome = match written {
            Ok(path) => {
                info!(path = %path.display(), rows, "written");
                Outcome::Written {
                    paths: vec![path],
                    rows,
                    fingerprint,
                }
            }
            Err(e) => {
                let path = self.output_dir.join(&file_name);
                error!(path = %path.display(), "write failed: {e:#}");
                Outcome::Failed(ReportError::Write {
                    path: path.display().to_string(),
                    message: format!("{e:#}"),
                })
            }
        };
        summary.push(TaskKind::Content, name, outcome);
    }

    /// Write `report` with every writer. Either every file is written or
    /// none is, and the task fails.
    fn persist(&self, report: &Report, stem: &str) -> Outcome {
        let rows = report.len();
        let fingerprint = fingerprint(report);

        if self.dry_run {
            return Outcome::Built { rows, fingerprint };
        }

        match write_all(&self.writers, report, &self.output_dir, stem) {
            Ok(paths) => {
                for path in &paths {
                    info!(path = %path.display(), rows, "written");
                }
                Outcome::Written {
                    paths,
                    rows,
                    fingerprint,
                }
            }
            Err(e) => {
                let path = self.output_dir.join(format!("{stem}.*"));
                error!(path = %path.display(), "write failed: {e:#}");
                Outcome::Failed(ReportError::Write {
                    path: path.display().to_string(),
                    message: format!("{e:#}"),
                })
            }
        }
    }
}
