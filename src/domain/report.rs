use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// One raw query result record: field name → value, in the order the query
/// returned them. Field sets may differ from record to record.
pub type Record = Map<String, Value>;

/// One normalized report row: column name → value.
///
/// Display order is never taken from the map; it is always `Report::columns`.
pub type RowMap = BTreeMap<String, Value>;

/// A named, in-memory table with ordered columns and rows.
///
/// Every row carries exactly the keys listed in `columns`. Absent or null
/// values are stored as the empty string, which is the canonical "no value"
/// for diffing and for the TSV files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    name: String,
    columns: Vec<String>,
    rows: Vec<RowMap>,
}

impl Report {
    /// A report with no columns and no rows.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a report from already-keyed rows, enforcing the row invariant:
    /// duplicate column names are collapsed, fields outside `columns` are
    /// dropped and missing or null fields become `""`.
    pub fn new(name: &str, columns: Vec<String>, rows: Vec<RowMap>) -> Self {
        let columns = dedup_columns(columns);
        let rows = rows
            .into_iter()
            .map(|mut raw| {
                columns
                    .iter()
                    .map(|c| {
                        let v = raw.remove(c).map(normalize_cell).unwrap_or_else(empty_cell);
                        (c.clone(), v)
                    })
                    .collect()
            })
            .collect();
        Self {
            name: name.to_string(),
            columns,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[RowMap] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Same content under another name.
    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// First-row value of a column, the usual way to read a single-row count
    /// report ("RETURN COUNT(...) AS total").
    pub fn scalar(&self, column: &str) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(column))
    }

    /// Rows re-keyed onto `columns`: columns this report lacks are filled
    /// with `""`, columns not listed are dropped.
    pub fn aligned_rows(&self, columns: &[String]) -> Vec<RowMap> {
        self.rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or_else(empty_cell)))
                    .collect()
            })
            .collect()
    }

    /// Cells of one row rendered as text, in column order.
    pub fn row_texts(&self, row: &RowMap) -> Vec<String> {
        row_texts(row, &self.columns)
    }
}

// ─── Cell helpers ────────────────────────────────────────────────────────────

/// The canonical "no value" cell.
pub fn empty_cell() -> Value {
    Value::String(String::new())
}

/// Replace a JSON null with the empty-string sentinel.
pub fn normalize_cell(v: Value) -> Value {
    match v {
        Value::Null => empty_cell(),
        other => other,
    }
}

/// Text form of a cell as written to disk: strings verbatim, everything else
/// as compact JSON.
pub fn render_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rendered cells of `row` in `columns` order; missing cells render as `""`.
pub fn row_texts(row: &RowMap, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| row.get(c).map(render_cell).unwrap_or_default())
        .collect()
}

/// Ordering used when sorting by a key column.
///
/// Numbers sort numerically and before anything else; all other cells sort
/// by their rendered text.
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(fa), Some(fb)) => fa.partial_cmp(&fb).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => render_cell(a).cmp(&render_cell(b)),
    }
}

fn dedup_columns(columns: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(columns.len());
    columns.into_iter().filter(|c| seen.insert(c.clone())).collect()
}
