//! Plain-text rendering of session events

use deepr_session::{ResearchOutcome, SessionEvent, StepKind};

use crate::utils::{one_line, truncate_chars};

const THINK_PREVIEW_CHARS: usize = 160;

/// Turns session events into terminal output.
///
/// Report text streams inline; everything else is printed on its own line,
/// so the renderer remembers whether the cursor sits mid-report.
#[derive(Debug, Default)]
pub struct Renderer {
    in_report: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for one event (may be empty)
    pub fn render(&mut self, event: &SessionEvent) -> String {
        match event {
            SessionEvent::ReportDelta { delta } => {
                let prefix = if self.in_report { "" } else { "\n" };
                self.in_report = true;
                format!("{}{}", prefix, delta)
            }
            other => match self.line(other) {
                Some(line) => {
                    let prefix = if std::mem::take(&mut self.in_report) {
                        "\n"
                    } else {
                        ""
                    };
                    format!("{}{}\n", prefix, line)
                }
                None => String::new(),
            },
        }
    }

    fn line(&self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::ResearchStart { query } => Some(format!("Researching: {}", query)),
            SessionEvent::Iteration { iteration } => Some(format!("-- iteration {} --", iteration)),
            SessionEvent::StepStart { step, .. } => match step.kind {
                StepKind::Status => Some(format!("[status] {}", one_line(&step.content))),
                StepKind::Think => Some(format!(
                    "[think] {}",
                    truncate_chars(&one_line(&step.content), THINK_PREVIEW_CHARS)
                )),
                StepKind::Tool => Some(format!("[tool] {}...", step.content)),
            },
            SessionEvent::StepEnd { step, .. } if step.kind == StepKind::Tool => {
                Some(format!("[tool] {}", step.content))
            }
            SessionEvent::StepEnd { .. } => None,
            SessionEvent::SourcesAdded { sources } => Some(
                sources
                    .iter()
                    .map(|s| format!("  + {} <{}>", truncate_chars(&s.title, 80), s.url))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            SessionEvent::ResearchEnd { outcome } => Some(outcome_line(outcome)),
            SessionEvent::ReportDelta { .. } => None,
        }
    }
}

/// One-line summary of how a run ended
pub fn outcome_line(outcome: &ResearchOutcome) -> String {
    match outcome {
        ResearchOutcome::Completed {
            termination: Some(reason),
        } => format!("[Research complete: {}]", reason),
        ResearchOutcome::Completed { termination: None } => "[Research complete]".to_string(),
        ResearchOutcome::Failed { message } => format!("[Research failed: {}]", message),
        ResearchOutcome::TimedOut { message } => format!("[Research timed out: {}]", message),
        ResearchOutcome::Stopped => "[Research stopped]".to_string(),
        ResearchOutcome::Closed => "[Connection closed before the research finished]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepr_session::{ReasoningStep, ResearchSource, StepState};

    fn step(kind: StepKind, content: &str) -> ReasoningStep {
        ReasoningStep {
            id: uuid::Uuid::nil(),
            kind,
            content: content.into(),
            state: StepState::Active,
            tool_name: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_report_streams_inline_then_breaks_line() {
        let mut r = Renderer::new();
        assert_eq!(
            r.render(&SessionEvent::ReportDelta { delta: "Hello".into() }),
            "\nHello"
        );
        assert_eq!(
            r.render(&SessionEvent::ReportDelta { delta: " world".into() }),
            " world"
        );
        assert_eq!(
            r.render(&SessionEvent::ResearchEnd {
                outcome: ResearchOutcome::Completed { termination: None }
            }),
            "\n[Research complete]\n"
        );
    }

    #[test]
    fn test_step_lines() {
        let mut r = Renderer::new();
        let think = step(StepKind::Think, "Let me\nconsider this");
        assert_eq!(
            r.render(&SessionEvent::StepStart { index: 0, step: think.clone() }),
            "[think] Let me consider this\n"
        );
        assert_eq!(r.render(&SessionEvent::StepEnd { index: 0, step: think }), "");

        let tool = step(StepKind::Tool, "Invoking search ✓");
        assert_eq!(
            r.render(&SessionEvent::StepEnd { index: 1, step: tool }),
            "[tool] Invoking search ✓\n"
        );
    }

    #[test]
    fn test_sources_listed() {
        let mut r = Renderer::new();
        let out = r.render(&SessionEvent::SourcesAdded {
            sources: vec![ResearchSource {
                title: "Paper A".into(),
                url: "https://a.com/p".into(),
                snippet: None,
                relevance: None,
            }],
        });
        assert_eq!(out, "  + Paper A <https://a.com/p>\n");
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(
            outcome_line(&ResearchOutcome::Completed {
                termination: Some("answer".into())
            }),
            "[Research complete: answer]"
        );
        assert_eq!(outcome_line(&ResearchOutcome::Stopped), "[Research stopped]");
        assert!(outcome_line(&ResearchOutcome::Failed { message: "boom".into() }).contains("boom"));
    }
}
