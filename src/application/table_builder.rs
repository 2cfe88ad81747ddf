use std::collections::HashSet;

use tracing::warn;

use crate::domain::report::{normalize_cell, Record, Report, RowMap};

// ─── TableBuilder ────────────────────────────────────────────────────────────

/// Turns raw query records into a validated [`Report`].
///
/// Columns are the union of all record fields in first-seen order, unless a
/// column order is supplied: that order is then authoritative and fields
/// outside it are dropped with a warning. Fields a record lacks become `""`.
/// Never fails; no records and no column order gives an empty report with
/// no columns.
#[derive(Default)]
pub struct TableBuilder;

impl TableBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build<I>(&self, records: I, name: &str, column_order: Option<&[String]>) -> Report
    where
        I: IntoIterator<Item = Record>,
    {
        let (report, dropped) = self.build_reporting_dropped(records, name, column_order);
        if !dropped.is_empty() {
            warn!(
                report = name,
                dropped = ?dropped,
                "fields outside the requested column order were dropped"
            );
        }
        report
    }

    /// Same as [`build`](Self::build), also returning the field names that
    /// the column order narrowed away (in first-seen order).
    pub fn build_reporting_dropped<I>(
        &self,
        records: I,
        name: &str,
        column_order: Option<&[String]>,
    ) -> (Report, Vec<String>)
    where
        I: IntoIterator<Item = Record>,
    {
        let records: Vec<Record> = records.into_iter().collect();

        let (columns, dropped) = match column_order {
            Some(order) => {
                let wanted: HashSet<&str> = order.iter().map(String::as_str).collect();
                let dropped = field_union(&records)
                    .into_iter()
                    .filter(|f| !wanted.contains(f.as_str()))
                    .collect();
                (order.to_vec(), dropped)
            }
            None => (field_union(&records), Vec::new()),
        };

        let rows: Vec<RowMap> = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .map(|(k, v)| (k, normalize_cell(v)))
                    .collect()
            })
            .collect();

        (Report::new(name, columns, rows), dropped)
    }
}

/// All field names across `records`, in first-seen order.
fn field_union(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_of_fields_in_first_seen_order() {
        let records = vec![
            record(&[("x", json!("1")), ("y", json!("2"))]),
            record(&[("x", json!("3"))]),
        ];
        let report = TableBuilder::new().build(records, "r", None);

        assert_eq!(report.columns(), &cols(&["x", "y"])[..]);
        assert_eq!(report.rows()[1]["x"], json!("3"));
        assert_eq!(report.rows()[1]["y"], json!(""));
    }

    #[test]
    fn later_records_can_introduce_columns() {
        let records = vec![
            record(&[("b", json!(1))]),
            record(&[("a", json!(2)), ("b", json!(3))]),
        ];
        let report = TableBuilder::new().build(records, "r", None);
        assert_eq!(report.columns(), &cols(&["b", "a"])[..]);
        assert_eq!(report.rows()[0]["a"], json!(""));
    }

    #[test]
    fn nulls_become_empty_string() {
        let records = vec![record(&[("license", Value::Null)])];
        let report = TableBuilder::new().build(records, "r", None);
        assert_eq!(report.rows()[0]["license"], Value::String(String::new()));
    }

    #[test]
    fn explicit_order_is_authoritative_and_reports_dropped_fields() {
        let records = vec![record(&[
            ("ds.label", json!("Foo")),
            ("ds.short_form", json!("DS1")),
            ("debug", json!(true)),
        ])];
        let order = cols(&["ds.short_form", "ds.label", "pub"]);
        let (report, dropped) =
            TableBuilder::new().build_reporting_dropped(records, "r", Some(&order));

        assert_eq!(report.columns(), &order[..]);
        assert_eq!(dropped, vec!["debug".to_string()]);
        assert_eq!(report.rows()[0]["pub"], json!(""));
        assert!(!report.rows()[0].contains_key("debug"));
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = TableBuilder::new().build(Vec::new(), "nothing", None);
        assert!(report.is_empty());
        assert!(report.columns().is_empty());
        assert_eq!(report.name(), "nothing");
    }

    #[test]
    fn empty_input_keeps_explicit_columns() {
        let order = cols(&["id", "label"]);
        let report = TableBuilder::new().build(Vec::new(), "r", Some(&order));
        assert!(report.is_empty());
        assert_eq!(report.columns(), &order[..]);
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-e]", prop_oneof![
            Just(Value::Null),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(Value::String),
        ], 0..5)
        .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn every_row_has_exactly_the_report_columns(
            records in prop::collection::vec(arb_record(), 0..8),
            order in prop::option::of(prop::collection::vec("[a-g]", 0..5)),
        ) {
            let report = TableBuilder::new().build(records, "p", order.as_deref());
            for row in report.rows() {
                let keys: Vec<&String> = row.keys().collect();
                let mut expected: Vec<&String> = report.columns().iter().collect();
                expected.sort();
                prop_assert_eq!(keys, expected);
                prop_assert!(row.values().all(|v| !v.is_null()));
            }
        }
    }
}
