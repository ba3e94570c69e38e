//! HTTP client for the research backend

use futures::StreamExt;
use reqwest::{Method, StatusCode};
use reqwest_eventsource::{EventSource, retry};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    stream::{ResearchEventStream, create_stream},
    types::{
        BatchResearchRequest, BatchResearchResponse, BookmarkState, HealthReport, HistoryItem,
        ModelInfo, ResearchEvent, ResearchRequest, ResearchResult, Settings, SettingsUpdate,
        TaskStatus,
    },
};

/// Backend address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable overriding the backend address
pub const BASE_URL_ENV: &str = "DEEPR_BASE_URL";

const API_PREFIX: &str = "/api/v1";

/// Research backend client
#[derive(Debug, Clone)]
pub struct ResearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl ResearchClient {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_http_client(client: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        Ok(Self { client, base_url })
    }

    /// Create from `DEEPR_BASE_URL`, falling back to the default address
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn task_url(&self, task_id: &str, suffix: &str) -> String {
        self.api_url(&format!(
            "/research/{}{}",
            urlencoding::encode(task_id),
            suffix
        ))
    }

    /// Open the research event stream for a question.
    ///
    /// The request is sent lazily, on first poll. Reconnection is disabled:
    /// a failed stream yields one `error` event and ends.
    pub fn stream_research(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<ResearchEventStream> {
        let url = self.api_url("/research/stream");
        tracing::debug!(url = %url, max_iterations = ?request.max_iterations, "Opening research stream");

        let request_builder = self.client.post(&url).json(request);
        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;
        event_source.set_retry_policy(Box::new(retry::Never));

        Ok(Box::pin(create_stream(event_source, cancel)))
    }

    /// Run a research stream to completion, handing each event to `on_event`.
    pub async fn research_with<F>(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(ResearchEvent),
    {
        let mut stream = self.stream_research(request, cancel)?;
        while let Some(event) = stream.next().await {
            on_event(event);
        }
        Ok(())
    }

    /// Run a question to completion server-side and return the result
    pub async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult> {
        self.send_json(Method::POST, self.api_url("/research"), Some(request))
            .await
    }

    /// Queue a question as a background task; poll it with [`task_status`](Self::task_status)
    pub async fn research_async(&self, request: &ResearchRequest) -> Result<TaskStatus> {
        self.send_json(Method::POST, self.api_url("/research/async"), Some(request))
            .await
    }

    /// Queue several questions as background tasks
    pub async fn research_batch(
        &self,
        request: &BatchResearchRequest,
    ) -> Result<BatchResearchResponse> {
        self.send_json(Method::POST, self.api_url("/research/batch"), Some(request))
            .await
    }

    /// List past research runs
    pub async fn history(&self) -> Result<Vec<HistoryItem>> {
        self.send_json(Method::GET, self.api_url("/research/history"), None::<&()>)
            .await
    }

    /// Fetch the stored result of one run
    pub async fn research_result(&self, task_id: &str) -> Result<ResearchResult> {
        self.send_json(Method::GET, self.task_url(task_id, ""), None::<&()>)
            .await
    }

    /// Fetch the progress of one run
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        self.send_json(Method::GET, self.task_url(task_id, "/status"), None::<&()>)
            .await
    }

    /// Flip the bookmark flag of a run, returning the new server-side value
    pub async fn toggle_bookmark(&self, task_id: &str) -> Result<BookmarkState> {
        self.send_json(Method::POST, self.task_url(task_id, "/bookmark"), None::<&()>)
            .await
    }

    /// Permanently delete a run
    pub async fn delete_research(&self, task_id: &str) -> Result<()> {
        let url = self.task_url(task_id, "?force=true");
        let response = self.client.delete(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    /// Current model configuration
    pub async fn settings(&self) -> Result<Settings> {
        self.send_json(Method::GET, self.api_url("/settings"), None::<&()>)
            .await
    }

    /// Update model configuration; returns the settings as stored
    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        self.send_json(Method::POST, self.api_url("/settings"), Some(update))
            .await
    }

    /// Models the backend can be switched to
    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.send_json(Method::GET, self.api_url("/settings/models"), None::<&()>)
            .await
    }

    /// Backend dependency health. A 503 still carries a report.
    pub async fn health(&self) -> Result<HealthReport> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(response.json().await?);
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn send_json<T, B>(&self, method: Method, url: String, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        tracing::debug!(%method, url = %url, "Backend request");
        let mut builder = self.client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = check_status(builder.send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), api_error_message(&text)))
}

/// Extract FastAPI's `{"detail": ...}` message from an error body.
pub(crate) fn api_error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        detail: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::InvalidConfig(format!(
            "base URL must start with http:// or https://, got '{}'",
            raw
        )));
    }
    Ok(trimmed.to_string())
}
