//! Session event types

use serde::{Deserialize, Serialize};

use crate::state::{ReasoningStep, ResearchOutcome, ResearchSource};

/// Changes emitted while a research stream is reduced into session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A submission was accepted and the state reset
    ResearchStart { query: String },

    /// A new step became active
    StepStart { index: usize, step: ReasoningStep },

    /// A step was closed (its content may have been suffixed)
    StepEnd { index: usize, step: ReasoningStep },

    /// Newly discovered, non-duplicate sources
    SourcesAdded { sources: Vec<ResearchSource> },

    /// Text appended to the report
    ReportDelta { delta: String },

    /// The backend reported a new iteration
    Iteration { iteration: u32 },

    /// The run is over and the session is idle again
    ResearchEnd { outcome: ResearchOutcome },
}

impl SessionEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::ResearchEnd { .. })
    }
}
