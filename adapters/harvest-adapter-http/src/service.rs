//! `WorkflowService` implementation over the REST client.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use harvest_workflow::{
    ExecutionHandle, ExecutionRequest, Row, WorkflowResult, WorkflowService,
};
use tracing::{debug, info, instrument};

use crate::api::{
    ExecutionState, ExecutionStatusResponse, SubmitExecutionRequest, TimeWindow, WorkflowApiClient,
};
use crate::error::{HttpError, HttpResult};

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV: &str = "HARVEST_WORKFLOW_TOKEN";

/// Connection and polling settings for [`HttpWorkflowService`].
#[derive(Debug, Clone)]
pub struct HttpWorkflowConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub poll_interval: Duration,
    /// Upper bound on one execution, submission to terminal state.
    pub max_wait: Duration,
    pub request_timeout: Duration,
}

impl HttpWorkflowConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60 * 60),
            request_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Runs workflows on a remote execution service.
///
/// `execute` submits the execution and polls it to a terminal state;
/// `fetch_rows` downloads the result rows.
#[derive(Debug)]
pub struct HttpWorkflowService {
    client: WorkflowApiClient,
    poll_interval: Duration,
    max_wait: Duration,
}

impl HttpWorkflowService {
    /// Create the service. Without a configured token, `HARVEST_WORKFLOW_TOKEN`
    /// is used when set.
    pub fn new(config: HttpWorkflowConfig) -> HttpResult<Self> {
        if config.poll_interval.is_zero() {
            return Err(HttpError::Configuration(
                "poll_interval must be positive".into(),
            ));
        }
        let token = config
            .token
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.is_empty());
        if token.is_none() {
            debug!("no workflow service token configured");
        }

        Ok(Self {
            client: WorkflowApiClient::new(config.base_url, token, config.request_timeout)?,
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        })
    }
}

/// Poll `fetch` every `interval` until it reports a terminal state or
/// `max_wait` has passed.
async fn poll_until_terminal<F, Fut>(
    execution_id: &str,
    interval: Duration,
    max_wait: Duration,
    mut fetch: F,
) -> HttpResult<ExecutionStatusResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HttpResult<ExecutionStatusResponse>>,
{
    let deadline = tokio::time::Instant::now() + max_wait;
    loop {
        let status = fetch().await?;
        match status.status {
            ExecutionState::Succeeded => return Ok(status),
            ExecutionState::Failed | ExecutionState::Cancelled => {
                let reason = status
                    .error
                    .unwrap_or_else(|| format!("execution {execution_id} ended as {:?}", status.status));
                return Err(HttpError::ExecutionFailed(reason));
            }
            ExecutionState::Pending | ExecutionState::Running | ExecutionState::Unknown => {}
        }

        if tokio::time::Instant::now() + interval > deadline {
            return Err(HttpError::Timeout(execution_id.to_string()));
        }
        tokio::time::sleep(interval).await;
    }
}

#[async_trait]
impl WorkflowService for HttpWorkflowService {
    fn name(&self) -> &str {
        self.client.base_url()
    }

    #[instrument(skip_all, fields(workflow = %request.workflow_ref, window = %request.window))]
    async fn execute(&self, request: &ExecutionRequest) -> WorkflowResult<ExecutionHandle> {
        let body = SubmitExecutionRequest {
            instance_id: request.instance_ref.to_string(),
            user_id: request.user_id.clone(),
            parameters: request.parameters.clone(),
            time_window: TimeWindow {
                start_date: request.window.start,
                end_date: request.window.end,
            },
        };

        let submitted = self
            .client
            .submit_execution(request.workflow_ref.as_str(), &body)
            .await?;
        debug!(execution = %submitted.execution_id, status = ?submitted.status, "execution submitted");
        let execution_id = submitted.execution_id;

        let finished = poll_until_terminal(&execution_id, self.poll_interval, self.max_wait, || {
            self.client.get_execution(&execution_id)
        })
        .await?;

        info!(execution = %execution_id, rows = ?finished.row_count, "execution succeeded");
        let handle = ExecutionHandle::new(execution_id);
        Ok(match finished.row_count {
            Some(rows) => handle.with_row_count(rows),
            None => handle,
        })
    }

    async fn fetch_rows(&self, handle: &ExecutionHandle) -> WorkflowResult<Option<Vec<Row>>> {
        let rows = self.client.get_rows(handle.execution_id.as_str()).await?;
        Ok(Some(rows.rows))
    }
}
