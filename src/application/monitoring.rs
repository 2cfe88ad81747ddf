use crate::domain::error::ReportError;
use crate::domain::ports::{Differ, QueryExecutor};
use crate::domain::{
    diff_result::DiffResult,
    report::{Record, Report},
};
use crate::infrastructure::config::ServerConfig;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, instrument};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// Operation name: "execute" or "diff".
    pub operation: &'static str,
    /// Server label for queries, `left:right` for diffs.
    pub target: String,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Number of records returned, or rows compared.
    pub rows: usize,
    pub ok: bool,
}

/// Accumulated performance timings for a single batch run.
///
/// Shared across all decorator instances for one run via `Arc<Mutex<_>>`.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn total_records_fetched(&self) -> usize {
        self.timings
            .iter()
            .filter(|t| t.operation == "execute")
            .map(|t| t.rows)
            .sum()
    }

    pub fn total_ms(&self) -> u128 {
        self.timings.iter().map(|t| t.duration_ms).sum()
    }

    pub fn failures(&self) -> usize {
        self.timings.iter().filter(|t| !t.ok).count()
    }

    /// Copy out of the shared handle; empty if the lock was poisoned.
    pub fn snapshot(report: &Arc<Mutex<Self>>) -> Self {
        report.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            r.timings.push(timing);
        }
    }
}

// ─── MonitoringExecutor ──────────────────────────────────────────────────────

/// Decorator: wraps any `QueryExecutor`, measures wall time per `execute`
/// call, and appends the result to the shared `PerfReport`.
pub struct MonitoringExecutor {
    inner: Arc<dyn QueryExecutor>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringExecutor {
    pub fn new(inner: Arc<dyn QueryExecutor>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }
}

#[async_trait]
impl QueryExecutor for MonitoringExecutor {
    #[instrument(
        name = "execute",
        skip(self, server, query),
        fields(db.server = %server.label),
        level = "info"
    )]
    async fn execute(
        &self,
        server: &ServerConfig,
        query: &str,
    ) -> Result<Vec<Record>, ReportError> {
        let start = Instant::now();
        let result = self.inner.execute(server, query).await;
        let duration_ms = start.elapsed().as_millis();

        let rows = result.as_ref().map(Vec::len).unwrap_or(0);
        info!(server = %server.label, rows, duration_ms, ok = result.is_ok(), "execute completed");

        PerfReport::record(
            &self.report,
            OpTiming {
                operation: "execute",
                target: server.label.clone(),
                duration_ms,
                rows,
                ok: result.is_ok(),
            },
        );

        result
    }
}

// ─── MonitoringDiffer ────────────────────────────────────────────────────────

/// Decorator: wraps any `Differ`, measures wall time per `diff` call,
/// and appends the result to the shared `PerfReport`.
pub struct MonitoringDiffer {
    inner: Arc<dyn Differ>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringDiffer {
    pub fn new(inner: Arc<dyn Differ>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }
}

impl Differ for MonitoringDiffer {
    #[instrument(
        name = "diff",
        skip(self, left, right, key_column),
        fields(
            left = %left.name(),
            right = %right.name(),
            left.rows = left.len(),
            right.rows = right.len(),
        ),
        level = "info"
    )]
    fn diff(
        &self,
        left: &Report,
        right: &Report,
        key_column: Option<&str>,
    ) -> Result<DiffResult, ReportError> {
        let start = Instant::now();
        let result = self.inner.diff(left, right, key_column);
        let duration_ms = start.elapsed().as_millis();

        let changes = result.as_ref().map(DiffResult::len).unwrap_or(0);
        info!(left = %left.name(), right = %right.name(), changes, duration_ms, "diff completed");

        PerfReport::record(
            &self.report,
            OpTiming {
                operation: "diff",
                target: format!("{}:{}", left.name(), right.name()),
                duration_ms,
                rows: left.len() + right.len(),
                ok: result.is_ok(),
            },
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::diff::ReportDiffer;
    use serde_json::json;

    struct FixedExecutor(Result<Vec<Record>, ReportError>);

    #[async_trait]
    impl QueryExecutor for FixedExecutor {
        async fn execute(
            &self,
            _server: &ServerConfig,
            _query: &str,
        ) -> Result<Vec<Record>, ReportError> {
            self.0.clone()
        }
    }

    fn record(id: &str) -> Record {
        let mut r = Record::new();
        r.insert("id".into(), json!(id));
        r
    }

    #[tokio::test]
    async fn executor_timings_are_recorded() {
        let perf = PerfReport::new();
        let exec = MonitoringExecutor::new(
            Arc::new(FixedExecutor(Ok(vec![record("a"), record("b")]))),
            Arc::clone(&perf),
        );
        let server = ServerConfig::new("pdb", "http://localhost");
        let rows = exec.execute(&server, "RETURN 1").await.unwrap();
        assert_eq!(rows.len(), 2);

        let snap = PerfReport::snapshot(&perf);
        assert_eq!(snap.timings.len(), 1);
        assert_eq!(snap.timings[0].target, "pdb");
        assert_eq!(snap.total_records_fetched(), 2);
        assert_eq!(snap.failures(), 0);
    }

    #[tokio::test]
    async fn failed_queries_are_counted() {
        let perf = PerfReport::new();
        let exec = MonitoringExecutor::new(
            Arc::new(FixedExecutor(Err(ReportError::connection("dev", "refused")))),
            Arc::clone(&perf),
        );
        let server = ServerConfig::new("dev", "http://localhost");
        assert!(exec.execute(&server, "RETURN 1").await.is_err());
        assert_eq!(PerfReport::snapshot(&perf).failures(), 1);
    }

    #[test]
    fn differ_timings_are_recorded() {
        let perf = PerfReport::new();
        let differ = MonitoringDiffer::new(Arc::new(ReportDiffer::new()), Arc::clone(&perf));
        let a = Report::new("a", vec!["id".into()], vec![]);
        let b = Report::new("b", vec!["id".into()], vec![]);
        differ.diff(&a, &b, None).unwrap();

        let snap = PerfReport::snapshot(&perf);
        assert_eq!(snap.timings[0].operation, "diff");
        assert_eq!(snap.timings[0].target, "a:b");
    }
}
