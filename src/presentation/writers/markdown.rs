use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;

use crate::domain::{ports::OutputWriter, report::Report};

/// Renders a report as a titled Markdown table.
pub struct MarkdownWriter {
    generated_at: DateTime<Utc>,
}

impl MarkdownWriter {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }
}

impl OutputWriter for MarkdownWriter {
    fn format(&self, report: &Report) -> Result<String> {
        let mut md = String::new();

        writeln!(md, "# {}", report.name())?;
        writeln!(md)?;
        writeln!(
            md,
            "Generated on `{}` ({} row(s))",
            self.generated_at.format("%a, %d %b %Y %H:%M:%S UTC"),
            report.len()
        )?;
        writeln!(md)?;

        if report.columns().is_empty() || report.is_empty() {
            writeln!(md, "_No rows._")?;
            return Ok(md);
        }

        let header: Vec<String> = report.columns().iter().map(|c| escape(c)).collect();
        writeln!(md, "| {} |", header.join(" | "))?;
        writeln!(md, "|{}", " --- |".repeat(header.len()))?;
        for row in report.rows() {
            let cells: Vec<String> = report.row_texts(row).iter().map(|c| escape(c)).collect();
            writeln!(md, "| {} |", cells.join(" | "))?;
        }

        Ok(md)
    }

    fn extension(&self) -> &'static str {
        "md"
    }
}

pub(crate) fn escape(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', "<br>")
}
