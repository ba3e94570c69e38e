//! Reduction of backend research events into session state

use deepr_api::{EventKind, ResearchEvent};

use crate::{
    events::SessionEvent,
    extractor::extract_sources,
    state::{ReasoningStep, ResearchOutcome, ResearchSource, ResearchState, StepKind, StepState},
};

/// Appended to a step once its tool has responded
pub const TOOL_DONE_SUFFIX: &str = " ✓";

impl ResearchState {
    /// Reset everything for a new question and enter the researching state.
    pub fn begin(&mut self, query: &str) -> SessionEvent {
        *self = ResearchState {
            query: query.to_string(),
            is_researching: true,
            ..Default::default()
        };
        SessionEvent::ResearchStart {
            query: query.to_string(),
        }
    }

    /// Apply one backend event, returning the resulting changes in order.
    ///
    /// Events arriving while no run is in progress are ignored.
    pub fn apply(&mut self, event: &ResearchEvent) -> Vec<SessionEvent> {
        let mut changes = Vec::new();

        if !self.is_researching {
            tracing::debug!("Ignoring {} event outside of a research run", event.kind);
            return changes;
        }

        if let Some(iteration) = event.iteration {
            if self.iteration != Some(iteration) {
                self.iteration = Some(iteration);
                changes.push(SessionEvent::Iteration { iteration });
            }
        }
        if let Some(ref termination) = event.termination {
            self.termination = Some(termination.clone());
        }

        match event.kind {
            EventKind::Status => {
                self.open_step(StepKind::Status, event.content.clone(), event.tool.clone(), &mut changes);
            }
            EventKind::Think => {
                self.open_step(StepKind::Think, event.content.clone(), event.tool.clone(), &mut changes);
            }
            EventKind::ToolStart => {
                let content = match event.tool.as_deref().filter(|t| !t.is_empty()) {
                    Some(tool) => format!("Invoking {}", tool),
                    None => event.content.clone(),
                };
                self.open_step(StepKind::Tool, content, event.tool.clone(), &mut changes);
            }
            EventKind::ToolResponse => {
                let found = extract_sources(event.tool.as_deref(), &event.content);
                let added = self.merge_sources(found);
                if !added.is_empty() {
                    changes.push(SessionEvent::SourcesAdded { sources: added });
                }

                if let Some(index) = self.steps.len().checked_sub(1) {
                    let step = &mut self.steps[index];
                    step.state = StepState::Completed;
                    if !step.content.ends_with(TOOL_DONE_SUFFIX) {
                        step.content.push_str(TOOL_DONE_SUFFIX);
                    }
                    changes.push(SessionEvent::StepEnd {
                        index,
                        step: step.clone(),
                    });
                }
            }
            EventKind::Answer => {
                self.append_report(&event.content, &mut changes);
            }
            EventKind::FinalAnswer => {
                // Content normally arrives through `answer` events first; only
                // fall back to this event's copy when nothing streamed.
                if self.report.trim().is_empty() && !event.content.trim().is_empty() {
                    self.append_report(&event.content, &mut changes);
                }
                let termination = self.termination.clone();
                self.finish(ResearchOutcome::Completed { termination }, &mut changes);
            }
            EventKind::Error => {
                let block = self.error_block("Error", &event.content);
                self.append_report(&block, &mut changes);
                let message = event.content.clone();
                self.finish(ResearchOutcome::Failed { message }, &mut changes);
            }
            EventKind::Timeout => {
                let block = self.error_block("Timeout", &event.content);
                self.append_report(&block, &mut changes);
                let message = event.content.clone();
                self.finish(ResearchOutcome::TimedOut { message }, &mut changes);
            }
            EventKind::Unknown => {
                tracing::debug!("Ignoring research event of unknown type");
            }
        }

        changes
    }

    /// End the current run without a backend terminal event (stop or close).
    pub fn interrupt(&mut self, outcome: ResearchOutcome) -> Vec<SessionEvent> {
        let mut changes = Vec::new();
        if self.is_researching {
            self.finish(outcome, &mut changes);
        }
        changes
    }

    fn open_step(
        &mut self,
        kind: StepKind,
        content: String,
        tool_name: Option<String>,
        changes: &mut Vec<SessionEvent>,
    ) {
        self.complete_active(changes);
        self.steps.push(ReasoningStep::active(kind, content, tool_name));
        let index = self.steps.len() - 1;
        changes.push(SessionEvent::StepStart {
            index,
            step: self.steps[index].clone(),
        });
    }

    fn complete_active(&mut self, changes: &mut Vec<SessionEvent>) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.state == StepState::Active {
                step.state = StepState::Completed;
                changes.push(SessionEvent::StepEnd {
                    index,
                    step: step.clone(),
                });
            }
        }
    }

    /// Add sources whose URL is not known yet; first seen wins.
    fn merge_sources(&mut self, found: Vec<ResearchSource>) -> Vec<ResearchSource> {
        let mut added = Vec::new();
        for source in found {
            if self.has_source(&source.url) {
                continue;
            }
            self.sources.push(source.clone());
            added.push(source);
        }
        added
    }

    fn append_report(&mut self, text: &str, changes: &mut Vec<SessionEvent>) {
        if text.is_empty() {
            return;
        }
        self.report.push_str(text);
        changes.push(SessionEvent::ReportDelta {
            delta: text.to_string(),
        });
    }

    fn error_block(&self, label: &str, message: &str) -> String {
        let separator = if self.report.is_empty() { "" } else { "\n\n" };
        let message = message.trim();
        let message = if message.is_empty() {
            "no details provided"
        } else {
            message
        };
        format!("{}> **{}:** {}\n", separator, label, message)
    }

    fn finish(&mut self, outcome: ResearchOutcome, changes: &mut Vec<SessionEvent>) {
        self.complete_active(changes);
        self.is_researching = false;
        self.outcome = Some(outcome.clone());
        changes.push(SessionEvent::ResearchEnd { outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, content: &str) -> ResearchEvent {
        ResearchEvent::new(kind, content)
    }

    fn researching() -> ResearchState {
        let mut state = ResearchState::default();
        state.begin("question");
        state
    }

    fn active_count(state: &ResearchState) -> usize {
        state.steps.iter().filter(|s| s.is_active()).count()
    }

    #[test]
    fn test_begin_resets_everything() {
        let mut state = researching();
        state.apply(&ev(EventKind::Status, "s"));
        state.apply(&ev(EventKind::ToolResponse, "[A](https://a.com)"));
        state.apply(&ev(EventKind::Answer, "partial"));
        state.apply(&ev(EventKind::FinalAnswer, ""));

        let start = state.begin("next question");
        assert_eq!(
            start,
            SessionEvent::ResearchStart {
                query: "next question".into()
            }
        );
        assert!(state.is_researching);
        assert!(state.steps.is_empty());
        assert!(state.sources.is_empty());
        assert!(state.report.is_empty());
        assert!(state.outcome.is_none());
    }

    #[test]
    fn test_opening_events_close_previous_step() {
        let mut state = researching();
        state.apply(&ev(EventKind::Status, "Iteration 1...").with_iteration(1));
        state.apply(&ev(EventKind::Think, "need to search"));
        state.apply(&ev(EventKind::ToolStart, "Calling tool: search").with_tool("search"));

        assert_eq!(state.steps.len(), 3);
        assert_eq!(state.steps[0].state, StepState::Completed);
        assert_eq!(state.steps[1].state, StepState::Completed);
        assert_eq!(state.steps[2].state, StepState::Active);
        assert_eq!(state.steps[2].kind, StepKind::Tool);
        assert_eq!(state.steps[2].content, "Invoking search");
        assert_eq!(state.steps[2].tool_name.as_deref(), Some("search"));
        assert_eq!(state.iteration, Some(1));
    }

    #[test]
    fn test_tool_start_without_tool_uses_content() {
        let mut state = researching();
        state.apply(&ev(EventKind::ToolStart, "Calling tool"));
        assert_eq!(state.steps[0].content, "Calling tool");
        assert!(state.steps[0].tool_name.is_none());
    }

    #[test]
    fn test_tool_response_completes_and_suffixes_last_step() {
        let mut state = researching();
        state.apply(&ev(EventKind::ToolStart, "").with_tool("search"));
        let changes = state.apply(
            &ev(EventKind::ToolResponse, "1. [Doc](https://doc.rs/x)").with_tool("search"),
        );

        assert_eq!(state.steps.len(), 1);
        assert_eq!(state.steps[0].state, StepState::Completed);
        assert_eq!(state.steps[0].content, format!("Invoking search{}", TOOL_DONE_SUFFIX));
        assert_eq!(state.sources.len(), 1);
        assert!(matches!(changes[0], SessionEvent::SourcesAdded { .. }));
        assert!(matches!(changes[1], SessionEvent::StepEnd { index: 0, .. }));
    }

    #[test]
    fn test_repeated_tool_response_suffixes_once() {
        let mut state = researching();
        state.apply(&ev(EventKind::ToolStart, "").with_tool("search"));
        state.apply(&ev(EventKind::ToolResponse, "a").with_tool("search"));
        state.apply(&ev(EventKind::ToolResponse, "b").with_tool("search"));
        assert_eq!(state.steps[0].content.matches(TOOL_DONE_SUFFIX).count(), 1);
    }

    #[test]
    fn test_tool_response_without_steps() {
        let mut state = researching();
        let changes = state.apply(&ev(EventKind::ToolResponse, "[A](https://a.com)"));
        assert!(state.steps.is_empty());
        assert_eq!(state.sources.len(), 1);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_at_most_one_active_step() {
        let mut state = researching();
        let sequence = vec![
            ev(EventKind::Status, "a"),
            ev(EventKind::Think, "b"),
            ev(EventKind::ToolStart, "").with_tool("search"),
            ev(EventKind::ToolStart, "").with_tool("visit"),
            ev(EventKind::ToolResponse, "x").with_tool("search"),
            ev(EventKind::Status, "c"),
            ev(EventKind::ToolResponse, "y").with_tool("visit"),
            ev(EventKind::Think, "d"),
            ev(EventKind::Answer, "report"),
            ev(EventKind::FinalAnswer, "report"),
        ];
        for event in &sequence {
            state.apply(event);
            assert!(active_count(&state) <= 1, "after {:?}", event.kind);
        }
        assert_eq!(active_count(&state), 0);
    }

    #[test]
    fn test_answers_concatenate_exactly() {
        let mut state = researching();
        let parts = ["# Title\n", "para one", "", " and ", "two\n"];
        for part in parts {
            state.apply(&ev(EventKind::Answer, part));
        }
        assert_eq!(state.report, parts.concat());
    }

    #[test]
    fn test_duplicate_url_keeps_first_title() {
        let mut state = researching();
        state.apply(&ev(EventKind::ToolResponse, "[First](https://same.com/a)").with_tool("search"));
        let changes = state
            .apply(&ev(EventKind::ToolResponse, "[Second](https://same.com/a)").with_tool("search"));

        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].title, "First");
        assert!(!changes
            .iter()
            .any(|c| matches!(c, SessionEvent::SourcesAdded { .. })));
    }

    #[test]
    fn test_final_answer_goes_idle_without_touching_report() {
        let mut state = researching();
        state.apply(&ev(EventKind::Answer, "streamed"));
        state.apply(&ev(EventKind::FinalAnswer, "something else").with_termination("answer"));

        assert!(!state.is_researching);
        assert_eq!(state.report, "streamed");
        assert_eq!(
            state.outcome,
            Some(ResearchOutcome::Completed {
                termination: Some("answer".into())
            })
        );
    }

    #[test]
    fn test_final_answer_fills_empty_report() {
        let mut state = researching();
        state.apply(&ev(EventKind::FinalAnswer, "only here"));
        assert_eq!(state.report, "only here");
    }

    #[test]
    fn test_error_appends_block_and_goes_idle() {
        let mut state = researching();
        state.apply(&ev(EventKind::Think, "thinking"));
        state.apply(&ev(EventKind::Answer, "partial"));
        state.apply(&ev(EventKind::Error, "Max iterations exceeded"));

        assert!(!state.is_researching);
        assert_eq!(state.report, "partial\n\n> **Error:** Max iterations exceeded\n");
        assert_eq!(active_count(&state), 0);
        assert!(matches!(state.outcome, Some(ResearchOutcome::Failed { .. })));
    }

    #[test]
    fn test_error_on_empty_report_has_no_separator() {
        let mut state = researching();
        state.apply(&ev(EventKind::Error, ""));
        assert_eq!(state.report, "> **Error:** no details provided\n");
    }

    #[test]
    fn test_timeout_is_terminal() {
        let mut state = researching();
        state.apply(&ev(EventKind::Status, "Iteration 9..."));
        state.apply(&ev(EventKind::Timeout, "Research timeout"));

        assert!(!state.is_researching);
        assert!(state.report.contains("**Timeout:** Research timeout"));
        assert_eq!(
            state.outcome,
            Some(ResearchOutcome::TimedOut {
                message: "Research timeout".into()
            })
        );
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let mut state = researching();
        state.apply(&ev(EventKind::Error, "Max iterations exceeded"));
        let report = state.report.clone();

        let changes = state.apply(
            &ev(EventKind::FinalAnswer, "Max iterations reached without final answer")
                .with_termination("max_iterations_exceeded"),
        );
        assert!(changes.is_empty());
        assert_eq!(state.report, report);
        assert!(matches!(state.outcome, Some(ResearchOutcome::Failed { .. })));
    }

    #[test]
    fn test_unknown_event_is_noop() {
        let mut state = researching();
        let changes = state.apply(&ev(EventKind::Unknown, "?"));
        assert!(changes.is_empty());
        assert!(state.is_researching);
    }

    #[test]
    fn test_interrupt_completes_active_step() {
        let mut state = researching();
        state.apply(&ev(EventKind::ToolStart, "").with_tool("visit"));
        let changes = state.interrupt(ResearchOutcome::Stopped);

        assert!(!state.is_researching);
        assert_eq!(active_count(&state), 0);
        assert_eq!(state.outcome, Some(ResearchOutcome::Stopped));
        assert!(changes.last().is_some_and(|c| c.is_terminal()));

        // Interrupting an idle session does nothing.
        assert!(state.interrupt(ResearchOutcome::Closed).is_empty());
        assert_eq!(state.outcome, Some(ResearchOutcome::Stopped));
    }

    #[test]
    fn test_iteration_change_emitted_once() {
        let mut state = researching();
        let first = state.apply(&ev(EventKind::Status, "Iteration 2...").with_iteration(2));
        let second = state.apply(&ev(EventKind::ToolStart, "").with_tool("search").with_iteration(2));
        assert!(first.contains(&SessionEvent::Iteration { iteration: 2 }));
        assert!(!second.iter().any(|c| matches!(c, SessionEvent::Iteration { .. })));
    }
}
