use sha2::{Digest, Sha256};

use crate::domain::report::{row_texts, Report, RowMap};
use crate::domain::value_objects::Fingerprint;

/// Compute a SHA-256 fingerprint of a report's row content.
///
/// Algorithm:
/// 1. Each row is rendered to the text the writer puts on disk (cells in
///    column order) and serialised as a JSON array of strings.
/// 2. Lines are sorted so the fingerprint does not depend on row order.
/// 3. The header line and all row lines are joined with `\n` and hashed.
///
/// The report name is not part of the fingerprint.
pub fn fingerprint(report: &Report) -> Fingerprint {
    fingerprint_rows(report.rows(), report.columns())
}

/// Fingerprint of `rows` viewed through `columns`.
pub fn fingerprint_rows(rows: &[RowMap], columns: &[String]) -> Fingerprint {
    let mut lines: Vec<String> = rows
        .iter()
        .map(|row| serde_json::to_string(&row_texts(row, columns)).unwrap_or_default())
        .collect();

    lines.sort_unstable();

    let mut content = serde_json::to_string(columns).unwrap_or_default();
    for line in &lines {
        content.push('\n');
        content.push_str(line);
    }
    let hash = Sha256::digest(content.as_bytes());
    Fingerprint(format!("{:x}", hash))
}
