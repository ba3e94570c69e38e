//! Wire types shared with the research backend

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a streamed research event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Think,
    ToolStart,
    ToolResponse,
    Answer,
    FinalAnswer,
    Error,
    Timeout,
    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::Think => "think",
            EventKind::ToolStart => "tool_start",
            EventKind::ToolResponse => "tool_response",
            EventKind::Answer => "answer",
            EventKind::FinalAnswer => "final_answer",
            EventKind::Error => "error",
            EventKind::Timeout => "timeout",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of the research stream (`data: <json>` frame)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Text payload
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: String,
    /// Name of the invoked tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Agent iteration counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    /// Terminal reason code, e.g. `answer` or `max_iterations_exceeded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<String>,
    /// Tool arguments, sent with `tool_start`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl ResearchEvent {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool: None,
            iteration: None,
            termination: None,
            arguments: None,
        }
    }

    /// Synthetic `error` event
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_termination(mut self, termination: impl Into<String>) -> Self {
        self.termination = Some(termination.into());
        self
    }

    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::FinalAnswer | EventKind::Error | EventKind::Timeout
        )
    }
}

/// Accepts strings, null, or any other JSON value (rendered as JSON text).
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Body of `POST /api/v1/research/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl ResearchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Body of `POST /api/v1/research/batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResearchRequest {
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl BatchResearchRequest {
    pub fn new<I, S>(questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            questions: questions.into_iter().map(Into::into).collect(),
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

fn accepted() -> String {
    "accepted".to_string()
}

/// Response of `POST /api/v1/research/batch`: one background task per question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResearchResponse {
    pub batch_id: String,
    pub task_ids: Vec<String>,
    #[serde(default = "accepted")]
    pub status: String,
}

/// Lifecycle status of a research task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResearchStatus::Pending => "pending",
            ResearchStatus::Running => "running",
            ResearchStatus::Completed => "completed",
            ResearchStatus::Failed => "failed",
            ResearchStatus::Timeout => "timeout",
            ResearchStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Entry of `GET /api/v1/research/history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub task_id: String,
    pub question: String,
    pub status: ResearchStatus,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bookmarked: Option<bool>,
}

impl HistoryItem {
    pub fn bookmarked(&self) -> bool {
        self.is_bookmarked.unwrap_or(false)
    }

    /// Answer text, if the run produced a non-blank one
    pub fn answer_text(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.trim().is_empty())
    }

    pub fn created_at_display(&self) -> String {
        display_timestamp(&self.created_at)
    }
}

/// Response of `POST /api/v1/research/{task_id}/bookmark`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkState {
    pub is_bookmarked: bool,
}

/// Response of `GET /api/v1/research/{task_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    pub status: ResearchStatus,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub termination_reason: String,
    #[serde(default)]
    pub created_at: String,
}

impl From<ResearchResult> for HistoryItem {
    fn from(result: ResearchResult) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        HistoryItem {
            task_id: result.task_id,
            question: result.question,
            status: result.status,
            iterations: result.iterations,
            execution_time: result.execution_time,
            created_at: result.created_at,
            answer: non_empty(result.answer),
            termination_reason: non_empty(result.termination_reason),
            is_bookmarked: None,
        }
    }
}

/// Response of `GET /api/v1/research/{task_id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub status: ResearchStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub current_iteration: u32,
    #[serde(default)]
    pub message: String,
}

/// Backend model settings (`GET /api/v1/settings`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model_name: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_iterations: u32,
    pub max_context_tokens: u32,
    #[serde(default, alias = "openai_api_key_masked")]
    pub openrouter_api_key_masked: String,
    #[serde(default)]
    pub serper_api_key_masked: String,
}

impl Settings {
    /// Merge an update into this value the way the backend would
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(ref name) = update.model_name {
            self.model_name = name.clone();
        }
        if let Some(t) = update.temperature {
            self.temperature = t;
        }
        if let Some(p) = update.top_p {
            self.top_p = p;
        }
        if let Some(n) = update.max_iterations {
            self.max_iterations = n;
        }
        if let Some(n) = update.max_context_tokens {
            self.max_context_tokens = n;
        }
        if let Some(key) = update.openrouter_api_key.as_deref().filter(|k| !k.is_empty()) {
            self.openrouter_api_key_masked = mask_key(key);
        }
        if let Some(key) = update.serper_api_key.as_deref().filter(|k| !k.is_empty()) {
            self.serper_api_key_masked = mask_key(key);
        }
    }
}

/// Body of `POST /api/v1/settings`; unset fields are left unchanged
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serper_api_key: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Debug for SettingsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("SettingsUpdate")
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_iterations", &self.max_iterations)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("serper_api_key", &redact(&self.serper_api_key))
            .finish()
    }
}

/// Mask an API key as `abc****wxyz`; short keys become `****`.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Entry of `GET /api/v1/settings/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

/// Health of one backend dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub result: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub details: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.result == "succeed"
    }
}

/// Format a backend timestamp (RFC 3339 or naive ISO 8601) for display.
pub fn display_timestamp(raw: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if raw.is_empty() {
        "unknown".to_string()
    } else {
        raw.to_string()
    }
}
