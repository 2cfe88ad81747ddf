use crate::domain::{
    diff_result::DiffResult,
    error::ReportError,
    report::{Record, Report},
};
use crate::infrastructure::config::ServerConfig;
use anyhow::Result;
use async_trait::async_trait;

/// Port: run one query against one server (implemented by Neo4jExecutor)
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, server: &ServerConfig, query: &str)
        -> Result<Vec<Record>, ReportError>;
}

/// Port: report comparison algorithm (implemented by ReportDiffer)
pub trait Differ: Send + Sync {
    /// `key_column` of `None` means "first column of the left report".
    fn diff(
        &self,
        left: &Report,
        right: &Report,
        key_column: Option<&str>,
    ) -> Result<DiffResult, ReportError>;
}

/// Port: output formatting (implemented by TsvWriter, MarkdownWriter)
pub trait OutputWriter: Send + Sync {
    /// Serializes the report to a string (TSV, Markdown, etc.)
    fn format(&self, report: &Report) -> Result<String>;
    /// Extension of the produced file (e.g. "tsv", "md")
    fn extension(&self) -> &'static str;
}
