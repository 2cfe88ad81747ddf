use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{
    diff_result::{DiffResult, PROVENANCE_COLUMN},
    error::ReportError,
    fingerprint::fingerprint_rows,
    ports::Differ,
    report::{compare_cells, row_texts, Report, RowMap},
};

// ─── Report Differ (implementation of the port) ───

/// Symmetric difference of two reports at whole-row granularity.
///
/// Both reports are aligned on the union of their columns (left order, then
/// right-only columns); a missing column reads as `""`. Two rows are the same
/// when every rendered cell matches, so one differing attribute puts the
/// entity on both sides of the result. Output rows are stably sorted by the
/// key column, then by provenance tag.
#[derive(Default)]
pub struct ReportDiffer;

impl ReportDiffer {
    pub fn new() -> Self {
        Self
    }
}

impl Differ for ReportDiffer {
    fn diff(
        &self,
        left: &Report,
        right: &Report,
        key_column: Option<&str>,
    ) -> Result<DiffResult, ReportError> {
        let (l, r) = (left.name(), right.name());

        if left.has_column(PROVENANCE_COLUMN) || right.has_column(PROVENANCE_COLUMN) {
            return Err(ReportError::schema_mismatch(
                l,
                r,
                format!("input already has a '{PROVENANCE_COLUMN}' column"),
            ));
        }
        if l == r {
            warn!(report = l, "diffing two reports with the same name; provenance is ambiguous");
        }

        let columns = union_columns(left, right);
        let key = match key_column.map(str::to_string).or_else(|| columns.first().cloned()) {
            Some(k) => k,
            None => return Ok(empty_result(left, right, "")),
        };
        for side in [left, right] {
            if !side.columns().is_empty() && !side.has_column(&key) {
                return Err(ReportError::schema_mismatch(
                    l,
                    r,
                    format!("key column '{}' missing from '{}'", key, side.name()),
                ));
            }
        }

        let left_rows = left.aligned_rows(&columns);
        let right_rows = right.aligned_rows(&columns);

        // Fast path: identical content
        if fingerprint_rows(&left_rows, &columns) == fingerprint_rows(&right_rows, &columns) {
            debug!(left = l, right = r, "reports identical, skipping row comparison");
            return Ok(empty_result(left, right, &key));
        }

        let left_set = text_set(&left_rows, &columns);
        let right_set = text_set(&right_rows, &columns);
        let mut rows = one_sided(left_rows, &right_set, &columns, l);
        rows.extend(one_sided(right_rows, &left_set, &columns, r));

        rows.sort_by(|a, b| {
            let ka = a.get(&key).unwrap_or(&Value::Null);
            let kb = b.get(&key).unwrap_or(&Value::Null);
            compare_cells(ka, kb).then_with(|| tag(a).cmp(tag(b)))
        });

        let mut out_columns = columns;
        out_columns.push(PROVENANCE_COLUMN.to_string());

        Ok(DiffResult::new(
            l,
            r,
            &key,
            Report::new(&format!("{l}_{r}"), out_columns, rows),
        ))
    }
}

// ─── Helpers ───

/// Left columns, then right columns the left lacks.
fn union_columns(left: &Report, right: &Report) -> Vec<String> {
    let mut columns = left.columns().to_vec();
    for c in right.columns() {
        if !left.has_column(c) {
            columns.push(c.clone());
        }
    }
    columns
}

fn text_set(rows: &[RowMap], columns: &[String]) -> HashSet<Vec<String>> {
    rows.iter().map(|r| row_texts(r, columns)).collect()
}

/// Rows of `rows` absent from `other`, tagged with `source`.
fn one_sided(
    rows: Vec<RowMap>,
    other: &HashSet<Vec<String>>,
    columns: &[String],
    source: &str,
) -> Vec<RowMap> {
    rows.into_iter()
        .filter(|r| !other.contains(&row_texts(r, columns)))
        .map(|mut r| {
            r.insert(PROVENANCE_COLUMN.to_string(), Value::String(source.to_string()));
            r
        })
        .collect()
}

fn tag(row: &RowMap) -> &str {
    row.get(PROVENANCE_COLUMN).and_then(Value::as_str).unwrap_or("")
}

fn empty_result(left: &Report, right: &Report, key: &str) -> DiffResult {
    let mut columns = union_columns(left, right);
    columns.push(PROVENANCE_COLUMN.to_string());
    DiffResult::new(
        left.name(),
        right.name(),
        key,
        Report::new(&format!("{}_{}", left.name(), right.name()), columns, Vec::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> RowMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn report(name: &str, columns: &[&str], rows: Vec<RowMap>) -> Report {
        Report::new(name, columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn diff(a: &Report, b: &Report) -> DiffResult {
        ReportDiffer::new().diff(a, b, None).unwrap()
    }

    #[test]
    fn one_changed_attribute_yields_two_rows() {
        let a = report(
            "pdb",
            &["id", "label", "count"],
            vec![row(&[("id", json!("DS1")), ("label", json!("Foo")), ("count", json!("5"))])],
        );
        let b = report(
            "staging",
            &["id", "label", "count"],
            vec![row(&[("id", json!("DS1")), ("label", json!("Foo")), ("count", json!("6"))])],
        );

        let d = diff(&a, &b);
        let rows = d.table().rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!("DS1"));
        assert_eq!(rows[0]["server"], json!("pdb"));
        assert_eq!(rows[0]["count"], json!("5"));
        assert_eq!(rows[1]["id"], json!("DS1"));
        assert_eq!(rows[1]["server"], json!("staging"));
        assert_eq!(rows[1]["count"], json!("6"));
    }

    #[test]
    fn missing_entity_is_tagged_with_its_source() {
        let a = report("A", &["id"], vec![row(&[("id", json!("DS1"))]), row(&[("id", json!("DS2"))])]);
        let b = report("B", &["id"], vec![row(&[("id", json!("DS2"))])]);

        let ab = diff(&a, &b);
        assert_eq!(ab.len(), 1);
        assert_eq!(ab.table().rows()[0]["id"], json!("DS1"));
        assert_eq!(ab.table().rows()[0]["server"], json!("A"));

        let ba = diff(&b, &a);
        assert_eq!(ba.len(), 1);
        assert_eq!(ba.table().rows()[0]["id"], json!("DS1"));
        assert_eq!(ba.table().rows()[0]["server"], json!("A"));
        assert!(ba.left_only().is_empty());
        assert_eq!(ba.right_only(), vec![row(&[("id", json!("DS1"))])]);
    }

    #[test]
    fn diff_with_itself_is_empty() {
        let a = report("A", &["id", "n"], vec![row(&[("id", json!("x")), ("n", json!(1))])]);
        let d = diff(&a, &a);
        assert!(d.is_empty());
        assert_eq!(d.table().columns().last().map(String::as_str), Some("server"));
    }

    #[test]
    fn rows_are_sorted_by_key_then_provenance() {
        let a = report(
            "pdb",
            &["id", "v"],
            vec![
                row(&[("id", json!("DS3")), ("v", json!("a"))]),
                row(&[("id", json!("DS1")), ("v", json!("a"))]),
            ],
        );
        let b = report(
            "dev",
            &["id", "v"],
            vec![
                row(&[("id", json!("DS1")), ("v", json!("b"))]),
                row(&[("id", json!("DS2")), ("v", json!("b"))]),
            ],
        );
        let d = diff(&a, &b);
        let got: Vec<(String, String)> = d
            .table()
            .rows()
            .iter()
            .map(|r| (render(&r["id"]), render(&r["server"])))
            .collect();
        assert_eq!(
            got,
            vec![
                ("DS1".into(), "dev".into()),
                ("DS1".into(), "pdb".into()),
                ("DS2".into(), "dev".into()),
                ("DS3".into(), "pdb".into()),
            ]
        );
    }

    fn render(v: &Value) -> String {
        crate::domain::report::render_cell(v)
    }

    #[test]
    fn differing_column_sets_compare_over_the_union() {
        let a = report("A", &["id"], vec![row(&[("id", json!("DS1"))])]);
        let b = report(
            "B",
            &["id", "pub"],
            vec![row(&[("id", json!("DS1")), ("pub", json!(""))])],
        );
        // the absent column reads as "" on A's side, so the rows match
        let d = diff(&a, &b);
        assert!(d.is_empty());
        assert_eq!(d.table().columns(), &["id".to_string(), "pub".into(), "server".into()]);
    }

    #[test]
    fn key_column_missing_is_schema_mismatch() {
        let a = report("A", &["id"], vec![row(&[("id", json!("DS1"))])]);
        let b = report("B", &["other"], vec![row(&[("other", json!("DS1"))])]);
        let err = ReportDiffer::new().diff(&a, &b, Some("id")).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn report_without_columns_is_compatible() {
        let a = report("A", &["id"], vec![row(&[("id", json!("DS1"))])]);
        let b = Report::empty("B");
        let d = diff(&a, &b);
        assert_eq!(d.left_only().len(), 1);
    }

    #[test]
    fn existing_server_column_is_rejected() {
        let a = report("A", &["id", "server"], vec![]);
        let b = report("B", &["id"], vec![]);
        assert!(ReportDiffer::new().diff(&a, &b, None).is_err());
    }

    #[test]
    fn numeric_and_text_cells_compare_by_rendering() {
        let a = report("A", &["id", "n"], vec![row(&[("id", json!("x")), ("n", json!(5))])]);
        let b = report("B", &["id", "n"], vec![row(&[("id", json!("x")), ("n", json!("5"))])]);
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn numeric_keys_sort_numerically() {
        let a = report(
            "A",
            &["id"],
            vec![row(&[("id", json!(10))]), row(&[("id", json!(9))])],
        );
        let b = report("B", &["id"], vec![]);
        let ids: Vec<Value> = diff(&a, &b).table().rows().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(9), json!(10)]);
    }

    #[test]
    fn sides_are_recovered_by_name() {
        let a = report("pdb", &["id"], vec![row(&[("id", json!("x"))])]);
        let b = report("dev", &["id"], vec![row(&[("id", json!("y"))])]);
        let result = diff(&a, &b);
        assert_eq!(result.left_only(), vec![row(&[("id", json!("x"))])]);
        assert_eq!(result.right_only(), vec![row(&[("id", json!("y"))])]);
    }

    // ── properties ──

    fn arb_report(name: &'static str) -> impl Strategy<Value = Report> {
        prop::collection::vec(("[a-d]", 0u8..3), 0..8).prop_map(move |pairs| {
            let rows = pairs
                .into_iter()
                .map(|(id, v)| row(&[("id", json!(id)), ("v", json!(v))]))
                .collect();
            report(name, &["id", "v"], rows)
        })
    }

    fn as_set(rows: Vec<RowMap>) -> Vec<RowMap> {
        let mut rows = rows;
        rows.sort_by_key(|r| row_texts(r, &["id".to_string(), "v".to_string()]));
        rows.dedup();
        rows
    }

    proptest! {
        #[test]
        fn symmetric(a in arb_report("A"), b in arb_report("B")) {
            let ab = diff(&a, &b);
            let ba = diff(&b, &a);
            prop_assert_eq!(as_set(ab.rows_from("A")), as_set(ba.rows_from("A")));
            prop_assert_eq!(as_set(ab.rows_from("B")), as_set(ba.rows_from("B")));
        }

        #[test]
        fn idempotent(a in arb_report("A"), b in arb_report("B")) {
            prop_assert_eq!(diff(&a, &b), diff(&a, &b));
        }

        #[test]
        fn self_diff_is_empty(a in arb_report("A")) {
            prop_assert!(diff(&a, &a).is_empty());
        }
    }
}
