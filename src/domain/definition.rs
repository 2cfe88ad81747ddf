use serde::{Deserialize, Serialize};

use crate::domain::error::ReportError;

/// A literal find/replace applied to query text before it is sent.
///
/// Filters are expressed this way because the filter clause differs per
/// entity type in the graph query language; there is no generic binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRewrite {
    pub find: String,
    pub replace: String,
}

impl QueryRewrite {
    pub fn new(find: &str, replace: &str) -> Self {
        Self {
            find: find.to_string(),
            replace: replace.to_string(),
        }
    }

    /// Replace every occurrence; a query without `find` is returned as-is.
    pub fn apply(&self, query: &str) -> String {
        query.replace(&self.find, &self.replace)
    }

    /// Like [`apply`](Self::apply) but `None` when `find` does not occur.
    pub fn apply_strict(&self, query: &str) -> Option<String> {
        query.contains(&self.find).then(|| self.apply(query))
    }
}

fn default_true() -> bool {
    true
}

/// Declarative description of one report: a query template, the column
/// order of the result and how it takes part in diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    pub query: String,
    /// Authoritative output column order. Fields outside it are dropped.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Column identifying the compared entity. Defaults to the first column.
    #[serde(default)]
    pub key_column: Option<String>,
    /// Rewrite that restricts the query to production entities.
    #[serde(default)]
    pub production_filter: Option<QueryRewrite>,
    #[serde(default)]
    pub production_only: bool,
    /// Whether the batch runner compares this report across servers.
    #[serde(default = "default_true")]
    pub diff: bool,
    /// Servers this report is pinned to. When set, it runs on exactly these
    /// servers whatever their own `reports` lists say.
    #[serde(default)]
    pub servers: Option<Vec<String>>,
}

impl ReportDefinition {
    pub fn new(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            columns: None,
            key_column: None,
            production_filter: None,
            production_only: false,
            diff: true,
            servers: None,
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_key_column(mut self, column: &str) -> Self {
        self.key_column = Some(column.to_string());
        self
    }

    pub fn with_production_filter(mut self, find: &str, replace: &str) -> Self {
        self.production_filter = Some(QueryRewrite::new(find, replace));
        self
    }

    pub fn production_only(mut self, on: bool) -> Self {
        self.production_only = on;
        self
    }

    pub fn without_diff(mut self) -> Self {
        self.diff = false;
        self
    }

    pub fn on_servers(mut self, servers: &[&str]) -> Self {
        self.servers = Some(servers.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Substitute `value` for every `{{name}}` placeholder in the query.
    pub fn bind(mut self, name: &str, value: &str) -> Self {
        let placeholder = format!("{{{{{name}}}}}");
        self.query = QueryRewrite::new(&placeholder, value).apply(&self.query);
        self
    }

    /// Key column used when diffing, if one can be determined statically.
    pub fn key_column(&self) -> Option<&str> {
        self.key_column
            .as_deref()
            .or_else(|| self.columns.as_ref().and_then(|c| c.first()).map(String::as_str))
    }

    /// Final query text for one server.
    ///
    /// The production filter is applied first and must match its anchor;
    /// the server's own rewrites follow and are applied only where they match.
    pub fn render_query(
        &self,
        server: &str,
        server_rewrites: &[QueryRewrite],
    ) -> Result<String, ReportError> {
        let mut query = self.query.clone();

        if self.production_only {
            let filter = self.production_filter.as_ref().ok_or_else(|| {
                ReportError::query(
                    server,
                    format!("report '{}' has no production filter", self.name),
                )
            })?;
            query = filter.apply_strict(&query).ok_or_else(|| {
                ReportError::query(
                    server,
                    format!(
                        "production filter anchor {:?} not found in query for '{}'",
                        filter.find, self.name
                    ),
                )
            })?;
        }

        for rewrite in server_rewrites {
            query = rewrite.apply(&query);
        }

        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> ReportDefinition {
        ReportDefinition::new("ds", "MATCH (ds:DataSet) WITH ds RETURN ds.production[0]")
            .with_production_filter(
                "MATCH (ds:DataSet) WITH ds ",
                "MATCH (ds:DataSet) WITH ds WHERE ds.production[0] = true ",
            )
    }

    #[test]
    fn query_is_unchanged_without_flags() {
        let q = def().render_query("pdb", &[]).unwrap();
        assert_eq!(q, "MATCH (ds:DataSet) WITH ds RETURN ds.production[0]");
    }

    #[test]
    fn production_only_inserts_filter() {
        let q = def().production_only(true).render_query("pdb", &[]).unwrap();
        assert!(q.contains("WHERE ds.production[0] = true"), "got: {q}");
    }

    #[test]
    fn server_rewrites_apply_after_filter() {
        let rewrites = vec![QueryRewrite::new("production[0]", "production")];
        let q = def()
            .production_only(true)
            .render_query("kb", &rewrites)
            .unwrap();
        assert!(!q.contains("production[0]"), "got: {q}");
        assert!(q.contains("WHERE ds.production = true"), "got: {q}");
    }

    #[test]
    fn missing_anchor_is_a_query_error() {
        let d = ReportDefinition::new("x", "MATCH (n) RETURN n")
            .with_production_filter("MATCH (ds:DataSet)", "MATCH (ds:DataSet) WHERE true")
            .production_only(true);
        let err = d.render_query("pdb", &[]).unwrap_err();
        assert_eq!(err.kind(), "query");
    }

    #[test]
    fn production_only_without_filter_is_a_query_error() {
        let d = ReportDefinition::new("x", "MATCH (n) RETURN n").production_only(true);
        assert!(d.render_query("pdb", &[]).is_err());
    }

    #[test]
    fn bind_fills_every_placeholder() {
        let d = ReportDefinition::new("ids", "MATCH (s {short_form:\"{{site}}\"}) RETURN \"{{site}}\" AS site")
            .bind("site", "catmaid_fafb");
        assert_eq!(
            d.query,
            "MATCH (s {short_form:\"catmaid_fafb\"}) RETURN \"catmaid_fafb\" AS site"
        );
        assert_eq!(d.bind("other", "x").query.matches("catmaid_fafb").count(), 2);
    }

    #[test]
    fn key_column_defaults_to_first_column() {
        let d = ReportDefinition::new("x", "q").with_columns(&["id", "label"]);
        assert_eq!(d.key_column(), Some("id"));
        assert_eq!(d.clone().with_key_column("label").key_column(), Some("label"));
        assert_eq!(ReportDefinition::new("y", "q").key_column(), None);
    }
}
