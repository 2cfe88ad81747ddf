use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::domain::{
    ports::OutputWriter,
    report::{Report, RowMap},
};

/// Header row of column names, then one line per row; tab-delimited, no index.
pub struct TsvWriter;

impl OutputWriter for TsvWriter {
    fn format(&self, report: &Report) -> Result<String> {
        if report.columns().is_empty() {
            return Ok(String::new());
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);
        writer.write_record(report.columns())?;
        for row in report.rows() {
            writer.write_record(report.row_texts(row))?;
        }
        let data = writer.into_inner()?;
        Ok(String::from_utf8_lossy(&data).to_string())
    }

    fn extension(&self) -> &'static str {
        "tsv"
    }
}

/// Parse TSV produced by [`TsvWriter`] back into a report. Every cell comes
/// back as a string.
pub fn read_tsv(name: &str, content: &str) -> Result<Report> {
    if content.trim().is_empty() {
        return Ok(Report::empty(name));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .context("Failed to read TSV header")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read TSV row {}", i + 1))?;
        let row: RowMap = columns
            .iter()
            .zip(record.iter())
            .map(|(c, v)| (c.clone(), Value::String(v.to_string())))
            .collect();
        rows.push(row);
    }

    Ok(Report::new(name, columns, rows))
}

/// Read a `<name>_report.tsv` (or any `.tsv`) file; the report name is the
/// file stem without a trailing `_report`.
pub fn read_tsv_file(path: &Path) -> Result<Report> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name = stem.strip_suffix("_report").unwrap_or(stem);
    read_tsv(name, &content)
}
