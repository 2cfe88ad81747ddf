use serde::Serialize;

use crate::domain::report::{Report, RowMap};

/// Column appended to every diff row naming the report it came from.
pub const PROVENANCE_COLUMN: &str = "server";

/// Rows present in exactly one of two reports, as a single table.
///
/// The table's columns are the union of both inputs followed by
/// [`PROVENANCE_COLUMN`], whose value is the `name` of the contributing
/// report. A row whose key matches on both sides but differs anywhere else
/// shows up twice, once per side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub left: String,
    pub right: String,
    pub key_column: String,
    table: Report,
}

impl DiffResult {
    pub fn new(left: &str, right: &str, key_column: &str, table: Report) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            key_column: key_column.to_string(),
            table,
        }
    }

    /// The combined table, ready to be written like any other report.
    pub fn table(&self) -> &Report {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Rows contributed by the report called `source`, without the
    /// provenance column.
    pub fn rows_from(&self, source: &str) -> Vec<RowMap> {
        self.table
            .rows()
            .iter()
            .filter(|r| r.get(PROVENANCE_COLUMN).and_then(|v| v.as_str()) == Some(source))
            .map(|r| {
                let mut r = r.clone();
                r.remove(PROVENANCE_COLUMN);
                r
            })
            .collect()
    }

    pub fn left_only(&self) -> Vec<RowMap> {
        self.rows_from(&self.left)
    }

    pub fn right_only(&self) -> Vec<RowMap> {
        self.rows_from(&self.right)
    }
}

/// File stem of a report written by the batch: `<server>_<report>_report`.
pub fn report_file_stem(report: &str, server: &str) -> String {
    format!("{server}_{report}_report")
}

/// File stem of a diff written by the batch: `<report>_<baseline>_<other>_diff`.
pub fn diff_file_stem(report: &str, baseline: &str, other: &str) -> String {
    format!("{report}_{baseline}_{other}_diff")
}
