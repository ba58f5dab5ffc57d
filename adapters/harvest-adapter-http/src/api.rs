//! Workflow-execution REST API client.
//!
//! Three endpoints are used: submit an execution, read its status, and read
//! its result rows.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{HttpError, HttpResult};

/// REST client for a workflow-execution service.
pub struct WorkflowApiClient {
    /// HTTP client with timeouts configured.
    client: Client,
    /// API base URL (without trailing slash).
    base_url: String,
    /// Optional bearer token.
    token: Option<String>,
}

impl std::fmt::Debug for WorkflowApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WorkflowApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
    ) -> HttpResult<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(HttpError::Configuration(format!(
                "base_url must be an http(s) URL, got '{base_url}'"
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(HttpError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> HttpResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let resp = self.authorize(self.client.get(&url)).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> HttpResult<T> {
        let url = self.url(path);
        debug!("POST {}", url);

        let resp = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    /// Deserialize a success body, or map the status to an error.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> HttpResult<T> {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            Ok(serde_json::from_str(&text)?)
        } else {
            let message = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(HttpError::NotFound(message)),
                _ => Err(HttpError::ApiError {
                    status: status.as_u16(),
                    message,
                }),
            }
        }
    }

    /// Start an execution of a saved workflow.
    #[instrument(skip(self, request))]
    pub async fn submit_execution(
        &self,
        workflow_ref: &str,
        request: &SubmitExecutionRequest,
    ) -> HttpResult<SubmitExecutionResponse> {
        debug!(
            start = %request.time_window.start_date,
            end = %request.time_window.end_date,
            "Submitting execution"
        );
        self.post(&format!("workflows/{workflow_ref}/executions"), request)
            .await
    }

    /// Read the state of an execution.
    #[instrument(skip(self))]
    pub async fn get_execution(&self, execution_id: &str) -> HttpResult<ExecutionStatusResponse> {
        self.get(&format!("executions/{execution_id}")).await
    }

    /// Read the result rows of a finished execution.
    #[instrument(skip(self))]
    pub async fn get_rows(&self, execution_id: &str) -> HttpResult<RowsResponse> {
        self.get(&format!("executions/{execution_id}/rows")).await
    }
}

// ---------------------------------------------------------------------------
// Request / response serde types
// ---------------------------------------------------------------------------

/// Request body for `POST /workflows/{workflow_ref}/executions`.
#[derive(Debug, Serialize)]
pub struct SubmitExecutionRequest {
    pub instance_id: String,
    pub user_id: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub time_window: TimeWindow,
}

/// Inclusive date range, `YYYY-MM-DD`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
}

/// Response from `POST /workflows/{workflow_ref}/executions`.
#[derive(Debug, Deserialize)]
pub struct SubmitExecutionResponse {
    pub execution_id: String,
    #[serde(default)]
    pub status: Option<ExecutionState>,
}

/// Execution state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Anything this client does not know; treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

/// Response from `GET /executions/{execution_id}`.
#[derive(Debug, Deserialize)]
pub struct ExecutionStatusResponse {
    pub status: ExecutionState,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response from `GET /executions/{execution_id}/rows`.
#[derive(Debug, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_submit_request_shape() {
        let mut parameters = serde_json::Map::new();
        parameters.insert("metric".into(), json!("clicks"));
        let request = SubmitExecutionRequest {
            instance_id: "inst-1".into(),
            user_id: "user-1".into(),
            parameters,
            time_window: TimeWindow {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "instance_id": "inst-1",
                "user_id": "user-1",
                "parameters": { "metric": "clicks" },
                "time_window": { "start_date": "2024-01-01", "end_date": "2024-01-07" }
            })
        );
    }

    #[test]
    fn test_status_response_parsing() {
        let done: ExecutionStatusResponse =
            serde_json::from_str(r#"{"status":"SUCCEEDED","row_count":12}"#).unwrap();
        assert_eq!(done.status, ExecutionState::Succeeded);
        assert_eq!(done.row_count, Some(12));
        assert!(done.status.is_terminal());

        let failed: ExecutionStatusResponse =
            serde_json::from_str(r#"{"status":"FAILED","error":"bad column"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("bad column"));
        assert!(failed.status.is_terminal());

        let queued: ExecutionStatusResponse =
            serde_json::from_str(r#"{"status":"QUEUED"}"#).unwrap();
        assert_eq!(queued.status, ExecutionState::Unknown);
        assert!(!queued.status.is_terminal());
    }

    #[test]
    fn test_rows_default_empty() {
        let rows: RowsResponse = serde_json::from_str("{}").unwrap();
        assert!(rows.rows.is_empty());
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let err = WorkflowApiClient::new("ftp://example", None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, HttpError::Configuration(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = WorkflowApiClient::new(
            "https://workflows.example.com/api/",
            Some("secret-token".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(client.base_url(), "https://workflows.example.com/api");
    }
}
