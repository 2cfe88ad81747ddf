use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::domain::error::ReportError;
use crate::domain::ports::QueryExecutor;
use crate::domain::report::Record;
use crate::infrastructure::config::{QueryConfig, ServerConfig};
use crate::infrastructure::neo4j::response::{parse_response, request_body};

/// Runs queries through a Neo4j server's HTTP transactional endpoint.
pub struct Neo4jExecutor {
    client: Client,
    timeout_secs: u64,
}

impl Neo4jExecutor {
    pub fn new(cfg: &QueryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vfb-reports/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            timeout_secs: cfg.timeout_secs,
        })
    }

    fn transport_error(&self, server: &ServerConfig, e: reqwest::Error) -> ReportError {
        if e.is_timeout() {
            ReportError::QueryTimeout {
                server: server.label.clone(),
                seconds: self.timeout_secs,
            }
        } else if e.is_decode() {
            ReportError::query(&server.label, e.to_string())
        } else {
            ReportError::connection(&server.label, format!("{} ({})", e, server.endpoint))
        }
    }
}

#[async_trait]
impl QueryExecutor for Neo4jExecutor {
    async fn execute(
        &self,
        server: &ServerConfig,
        query: &str,
    ) -> Result<Vec<Record>, ReportError> {
        let url = server.url();
        debug!("POST {}", url);

        let mut request = self.client.post(&url).json(&request_body(query));
        if !server.user.is_empty() {
            request = request.basic_auth(&server.user, Some(&server.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(server, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(server, e))?;

        classify_status(&server.label, status, &body)?;
        parse_response(&server.label, &body)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// Rejected credentials and server-side failures mean the instance is not
/// usable (`Connection`); other client errors point at the request (`Query`).
fn classify_status(server: &str, status: StatusCode, body: &str) -> Result<(), ReportError> {
    if status.is_success() {
        return Ok(());
    }
    let preview: String = body.chars().take(180).collect();
    let message = format!("HTTP {status}: {preview}");
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
    {
        Err(ReportError::connection(server, message))
    } else {
        Err(ReportError::query(server, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_passes() {
        assert!(classify_status("pdb", StatusCode::OK, "").is_ok());
    }

    #[test]
    fn auth_failure_is_connection_error() {
        let err = classify_status("pdb", StatusCode::UNAUTHORIZED, "nope").unwrap_err();
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn gateway_failure_is_connection_error() {
        let err = classify_status("pdb", StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn bad_request_is_query_error() {
        let err = classify_status("pdb", StatusCode::BAD_REQUEST, "bad").unwrap_err();
        assert_eq!(err.kind(), "query");
        assert!(err.to_string().contains("400"), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        let exec = Neo4jExecutor::new(&QueryConfig {
            timeout_secs: 2,
            connect_timeout_secs: 1,
        })
        .unwrap();
        // port 9 (discard) on localhost is closed in test environments
        let server = ServerConfig::new("nowhere", "http://127.0.0.1:9");
        let err = exec.execute(&server, "RETURN 1").await.unwrap_err();
        assert!(
            matches!(err.kind(), "connection" | "timeout"),
            "got: {err}"
        );
    }
    #[tokio::test]
    async fn silent_server_is_a_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept, then hold the socket open without answering
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let exec = Neo4jExecutor::new(&QueryConfig {
            timeout_secs: 1,
            connect_timeout_secs: 1,
        })
        .unwrap();
        let server = ServerConfig::new("silent", &format!("http://{addr}"));
        let err = exec.execute(&server, "RETURN 1").await.unwrap_err();
        assert_eq!(err.kind(), "timeout", "got: {err}");
        assert_eq!(
            err,
            ReportError::QueryTimeout {
                server: "silent".into(),
                seconds: 1
            }
        );
    }
}
