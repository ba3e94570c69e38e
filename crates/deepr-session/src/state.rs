//! Session state: reasoning timeline, discovered sources, and the report buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a reasoning step shows on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Status,
    Think,
    Tool,
}

/// Progress of a reasoning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Active,
    Completed,
}

/// One entry of the reasoning timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: Uuid,
    pub kind: StepKind,
    /// Display text; a tool step gets a completion suffix appended
    pub content: String,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReasoningStep {
    pub(crate) fn active(kind: StepKind, content: String, tool_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content,
            state: StepState::Active,
            tool_name,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == StepState::Active
    }
}

/// A citation discovered in a tool response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub title: String,
    /// Deduplication key within a session
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,
}

/// How the last run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchOutcome {
    /// `final_answer` received
    Completed { termination: Option<String> },
    /// `error` received (including transport failures)
    Failed { message: String },
    /// `timeout` received
    TimedOut { message: String },
    /// Stopped by the user
    Stopped,
    /// Stream closed without a terminal event
    Closed,
}

impl ResearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResearchOutcome::Completed { .. })
    }
}

/// Everything the presentation layer renders for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// Current question
    pub query: String,
    /// Gate preventing concurrent submissions
    pub is_researching: bool,
    pub steps: Vec<ReasoningStep>,
    pub sources: Vec<ResearchSource>,
    pub report: String,
    /// Last iteration number reported by the backend
    pub iteration: Option<u32>,
    /// Last termination code reported by the backend
    pub termination: Option<String>,
    /// Outcome of the last finished run
    pub outcome: Option<ResearchOutcome>,
}

impl ResearchState {
    /// The step currently in progress, if any
    pub fn active_step(&self) -> Option<&ReasoningStep> {
        self.steps.iter().rev().find(|s| s.is_active())
    }

    pub fn has_source(&self, url: &str) -> bool {
        self.sources.iter().any(|s| s.url == url)
    }
}
