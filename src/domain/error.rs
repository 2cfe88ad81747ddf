use thiserror::Error;

/// Failures that stop one report or one diff, never a whole batch.
///
/// Every variant keeps the server or report names it concerns so a single
/// log line is enough to tell which output file will be missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The database instance could not be reached or refused the credentials.
    #[error("cannot reach server '{server}': {message}")]
    Connection { server: String, message: String },

    /// The query was rejected or the response did not have the expected shape.
    #[error("query failed on server '{server}': {message}")]
    Query { server: String, message: String },

    /// No response within the configured timeout.
    #[error("query on server '{server}' timed out after {seconds}s")]
    QueryTimeout { server: String, seconds: u64 },

    /// The two reports share no usable key column.
    #[error("cannot diff '{left}' against '{right}': {message}")]
    SchemaMismatch {
        left: String,
        right: String,
        message: String,
    },

    /// The report was built but could not be persisted.
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

impl ReportError {
    /// Short, stable name of the error kind, used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Connection { .. } => "connection",
            ReportError::Query { .. } => "query",
            ReportError::QueryTimeout { .. } => "timeout",
            ReportError::SchemaMismatch { .. } => "schema_mismatch",
            ReportError::Write { .. } => "write",
        }
    }

    pub fn query(server: &str, message: impl Into<String>) -> Self {
        ReportError::Query {
            server: server.to_string(),
            message: message.into(),
        }
    }

    pub fn connection(server: &str, message: impl Into<String>) -> Self {
        ReportError::Connection {
            server: server.to_string(),
            message: message.into(),
        }
    }

    pub fn schema_mismatch(left: &str, right: &str, message: impl Into<String>) -> Self {
        ReportError::SchemaMismatch {
            left: left.to_string(),
            right: right.to_string(),
            message: message.into(),
        }
    }
}
