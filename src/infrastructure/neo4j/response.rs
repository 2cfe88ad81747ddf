use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::error::ReportError;
use crate::domain::report::Record;

/// Body of a transactional commit request carrying one statement.
pub fn request_body(query: &str) -> Value {
    json!({ "statements": [ { "statement": query } ] })
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Convert a transactional endpoint response body into flat records.
///
/// Each `row` becomes one record keyed by the statement's `columns`, in
/// column order. Any entry in `errors` fails the whole response.
pub fn parse_response(server: &str, body: &str) -> Result<Vec<Record>, ReportError> {
    let parsed: TxResponse = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(180).collect();
        ReportError::query(server, format!("unexpected response ({e}): {preview}"))
    })?;

    if let Some(first) = parsed.errors.first() {
        let mut message = format!("{}: {}", first.code, first.message);
        if parsed.errors.len() > 1 {
            message.push_str(&format!(" (+{} more)", parsed.errors.len() - 1));
        }
        return Err(ReportError::query(server, message));
    }

    let mut records = Vec::new();
    for result in parsed.results {
        for (i, data) in result.data.into_iter().enumerate() {
            if data.row.len() != result.columns.len() {
                return Err(ReportError::query(
                    server,
                    format!(
                        "row {} has {} values for {} columns",
                        i,
                        data.row.len(),
                        result.columns.len()
                    ),
                ));
            }
            let record: Record = result.columns.iter().cloned().zip(data.row).collect();
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_become_records_in_column_order() {
        let body = r#"{
            "results": [{
                "columns": ["ds.short_form", "ds.label", "license", "individuals"],
                "data": [
                    {"row": ["Ito2013", "Ito lineage clones", null, 12], "meta": []},
                    {"row": ["Yu2013", "Yu lineage clones", "CC-BY", 3], "meta": []}
                ]
            }],
            "errors": []
        }"#;
        let records = parse_response("pdb", body).unwrap();
        assert_eq!(records.len(), 2);
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["ds.short_form", "ds.label", "license", "individuals"]);
        assert_eq!(records[0]["license"], Value::Null);
        assert_eq!(records[1]["individuals"], json!(3));
    }

    #[test]
    fn server_errors_fail_the_query() {
        let body = r#"{
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input 'X'"}]
        }"#;
        let err = parse_response("dev", body).unwrap_err();
        assert_eq!(err.kind(), "query");
        assert!(err.to_string().contains("SyntaxError"), "got: {err}");
    }

    #[test]
    fn malformed_body_is_a_query_error() {
        let err = parse_response("dev", "<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), "query");
        assert!(err.to_string().contains("Bad Gateway"), "got: {err}");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let body = r#"{"results":[{"columns":["a","b"],"data":[{"row":[1]}]}],"errors":[]}"#;
        assert!(parse_response("pdb", body).is_err());
    }

    #[test]
    fn empty_result_set() {
        let body = r#"{"results":[{"columns":["a"],"data":[]}],"errors":[]}"#;
        assert!(parse_response("pdb", body).unwrap().is_empty());
    }

    #[test]
    fn request_body_wraps_single_statement() {
        let body = request_body("RETURN 1");
        assert_eq!(body["statements"][0]["statement"], json!("RETURN 1"));
    }
}
