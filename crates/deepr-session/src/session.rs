//! Live research session: submission gate, stream loop, and cancellation

use std::sync::Arc;

use deepr_api::{ResearchEvent, ResearchEventStream, ResearchRequest};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    events::SessionEvent,
    state::{ResearchOutcome, ResearchState},
    transport::Transport,
};

/// Why a submission was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The question was empty or whitespace only
    EmptyQuestion,
    /// Another run is still in progress
    AlreadyResearching,
}

/// Result of [`ResearchSession::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Rejected(RejectReason),
    Finished(ResearchOutcome),
}

struct Inner {
    state: ResearchState,
    /// Bumped on every accepted submission
    generation: u64,
    cancel: CancellationToken,
}

/// One research session (one per user tab / terminal).
///
/// Cloning is cheap and every clone drives the same session, so a clone can
/// be handed to a signal handler to call [`stop`](Self::stop).
#[derive(Clone)]
pub struct ResearchSession {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<SessionEvent>,
    max_iterations: Option<u32>,
}

impl ResearchSession {
    /// Create an idle session
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ResearchState::default(),
                generation: 0,
                cancel: CancellationToken::new(),
            })),
            transport,
            event_tx,
            max_iterations: None,
        }
    }

    /// Iteration cap sent with every submission (backend default when unset)
    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ResearchState {
        self.inner.lock().state.clone()
    }

    /// Whether a run is in progress
    pub fn is_researching(&self) -> bool {
        self.inner.lock().state.is_researching
    }

    /// Abort the run in progress. Returns `false` when idle.
    pub fn stop(&self) -> bool {
        let inner = self.inner.lock();
        if !inner.state.is_researching {
            return false;
        }
        tracing::info!("Stopping research run");
        inner.cancel.cancel();
        true
    }

    /// Clear the previous run's results. Returns `false` while researching.
    pub fn reset(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_researching {
            return false;
        }
        inner.state = ResearchState::default();
        true
    }

    /// Submit a question with the session's iteration cap
    pub async fn submit(&self, question: &str) -> Submission {
        self.submit_with(question, self.max_iterations).await
    }

    /// Submit a question and drive its stream to the end.
    ///
    /// Empty questions and submissions during a run are rejected without
    /// touching state or the network. Dropping the returned future ends the
    /// run as `Stopped`.
    pub async fn submit_with(&self, question: &str, max_iterations: Option<u32>) -> Submission {
        let question = question.trim();
        if question.is_empty() {
            tracing::debug!("Rejecting empty question");
            return Submission::Rejected(RejectReason::EmptyQuestion);
        }

        let (generation, cancel, start) = {
            let mut inner = self.inner.lock();
            if inner.state.is_researching {
                tracing::debug!("Rejecting submission while a run is in progress");
                return Submission::Rejected(RejectReason::AlreadyResearching);
            }
            inner.generation += 1;
            inner.cancel = CancellationToken::new();
            let start = inner.state.begin(question);
            (inner.generation, inner.cancel.clone(), start)
        };
        self.emit(start);
        let mut guard = RunGuard {
            session: self,
            generation,
            cancel: cancel.clone(),
            armed: true,
        };

        tracing::info!(generation, ?max_iterations, "Starting research: {}", question);
        let request = ResearchRequest::new(question).with_max_iterations(max_iterations);
        let mut stream = self.open_stream(&request, cancel.clone()).await;

        let mut finished = None;
        while let Some(event) = stream.next().await {
            let applied = {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    None
                } else {
                    let changes = inner.state.apply(&event);
                    let outcome = (!inner.state.is_researching)
                        .then(|| inner.state.outcome.clone().unwrap_or(ResearchOutcome::Closed));
                    Some((changes, outcome))
                }
            };
            let Some((changes, outcome)) = applied else {
                tracing::warn!(generation, "Dropping events of a superseded run");
                break;
            };
            for change in changes {
                self.emit(change);
            }
            if outcome.is_some() {
                finished = outcome;
                break;
            }
        }
        drop(stream);
        guard.armed = false;

        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                let (changes, outcome) = {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        (Vec::new(), ResearchOutcome::Closed)
                    } else {
                        let reason = if cancel.is_cancelled() {
                            ResearchOutcome::Stopped
                        } else {
                            ResearchOutcome::Closed
                        };
                        let changes = inner.state.interrupt(reason);
                        let outcome = inner
                            .state
                            .outcome
                            .clone()
                            .unwrap_or(ResearchOutcome::Closed);
                        (changes, outcome)
                    }
                };
                for change in changes {
                    self.emit(change);
                }
                outcome
            }
        };

        tracing::info!(generation, ?outcome, "Research finished");
        Submission::Finished(outcome)
    }

    /// Open the transport; a failure to open becomes a synthetic `error` event.
    async fn open_stream(
        &self,
        request: &ResearchRequest,
        cancel: CancellationToken,
    ) -> ResearchEventStream {
        match self.transport.open(request, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to open research stream: {}", e);
                let event = ResearchEvent::error(e.user_message());
                Box::pin(futures::stream::once(async move { event }))
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Ends a run as `Stopped` when its submitting future is dropped mid-stream.
struct RunGuard<'a> {
    session: &'a ResearchSession,
    generation: u64,
    cancel: CancellationToken,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        let changes = {
            let mut inner = self.session.inner.lock();
            if inner.generation != self.generation {
                return;
            }
            inner.state.interrupt(ResearchOutcome::Stopped)
        };
        tracing::info!(generation = self.generation, "Research abandoned by caller");
        for change in changes {
            self.session.emit(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepState;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use deepr_api::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// A transport replaying canned events, optionally held back by a gate.
    struct ScriptedTransport {
        events: Vec<ResearchEvent>,
        gate: Option<Arc<Notify>>,
        opened: AtomicUsize,
        requests: Mutex<Vec<ResearchRequest>>,
        fail_open: bool,
    }

    impl ScriptedTransport {
        fn new(events: Vec<ResearchEvent>) -> Self {
            Self {
                events,
                gate: None,
                opened: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                fail_open: false,
            }
        }

        fn gated(events: Vec<ResearchEvent>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(events)
            }
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(
            &self,
            request: &ResearchRequest,
            cancel: CancellationToken,
        ) -> deepr_api::Result<ResearchEventStream> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            if self.fail_open {
                return Err(deepr_api::Error::Sse("refused".into()));
            }

            let events = self.events.clone();
            let gate = self.gate.clone();
            Ok(Box::pin(async_stream::stream! {
                let mut released = true;
                if let Some(gate) = gate {
                    released = tokio::select! {
                        _ = gate.notified() => true,
                        _ = cancel.cancelled() => false,
                    };
                }
                if released {
                    for event in events {
                        if cancel.is_cancelled() {
                            break;
                        }
                        yield event;
                    }
                }
            }))
        }
    }

    fn ev(kind: EventKind, content: &str) -> ResearchEvent {
        ResearchEvent::new(kind, content)
    }

    fn full_run() -> Vec<ResearchEvent> {
        vec![
            ev(EventKind::Status, "Iteration 1...").with_iteration(1),
            ev(EventKind::Think, "search first"),
            ev(EventKind::ToolStart, "Calling tool: search").with_tool("search"),
            ev(EventKind::ToolResponse, "1. [Rust](https://rust-lang.org)").with_tool("search"),
            ev(EventKind::Answer, "Rust is "),
            ev(EventKind::Answer, "a language."),
            ev(EventKind::FinalAnswer, "Rust is a language.").with_termination("answer"),
        ]
    }

    #[tokio::test]
    async fn test_full_run() {
        let transport = Arc::new(ScriptedTransport::new(full_run()));
        let session = ResearchSession::new(transport.clone()).with_max_iterations(Some(5));

        let result = session.submit("  What is Rust?  ").await;
        assert_eq!(
            result,
            Submission::Finished(ResearchOutcome::Completed {
                termination: Some("answer".into())
            })
        );

        let state = session.snapshot();
        assert_eq!(state.query, "What is Rust?");
        assert!(!state.is_researching);
        assert_eq!(state.report, "Rust is a language.");
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.steps.len(), 3);
        assert!(state.steps.iter().all(|s| s.state == StepState::Completed));

        let requests = transport.requests.lock();
        assert_eq!(requests[0].question, "What is Rust?");
        assert_eq!(requests[0].max_iterations, Some(5));
    }

    #[tokio::test]
    async fn test_empty_question_is_noop() {
        let transport = Arc::new(ScriptedTransport::new(full_run()));
        let session = ResearchSession::new(transport.clone());

        assert_eq!(
            session.submit("   \n\t").await,
            Submission::Rejected(RejectReason::EmptyQuestion)
        );
        assert_eq!(transport.opened(), 0);
        assert_eq!(session.snapshot(), ResearchState::default());
    }

    #[tokio::test]
    async fn test_submission_while_researching_is_rejected() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::gated(full_run(), gate.clone()));
        let session = ResearchSession::new(transport.clone());
        let mut rx = session.subscribe();

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.submit("first").await }
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::ResearchStart { .. }
        ));
        assert!(session.is_researching());

        assert_eq!(
            session.submit("second").await,
            Submission::Rejected(RejectReason::AlreadyResearching)
        );
        assert!(!session.reset());
        assert_eq!(transport.opened(), 1);
        assert_eq!(session.snapshot().query, "first");

        gate.notify_one();
        let result = running.await.unwrap();
        assert!(matches!(result, Submission::Finished(ResearchOutcome::Completed { .. })));
        assert!(!session.is_researching());
    }

    #[tokio::test]
    async fn test_stop_cancels_stream() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::gated(full_run(), gate));
        let session = ResearchSession::new(transport);
        let mut rx = session.subscribe();

        assert!(!session.stop());

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.submit("slow question").await }
        });
        rx.recv().await.unwrap();

        assert!(session.stop());
        assert_eq!(
            running.await.unwrap(),
            Submission::Finished(ResearchOutcome::Stopped)
        );
        let state = session.snapshot();
        assert!(!state.is_researching);
        assert!(state.report.is_empty());
    }

    #[tokio::test]
    async fn test_error_event_ends_run() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ev(EventKind::Status, "Iteration 1..."),
            ev(EventKind::Error, "Research request failed with HTTP 500"),
            ev(EventKind::Answer, "never applied"),
        ]));
        let session = ResearchSession::new(transport);

        let result = session.submit("q").await;
        assert!(matches!(result, Submission::Finished(ResearchOutcome::Failed { .. })));

        let state = session.snapshot();
        assert!(!state.is_researching);
        assert!(state.report.contains("HTTP 500"));
        assert!(!state.report.contains("never applied"));
    }

    #[tokio::test]
    async fn test_open_failure_becomes_error_event() {
        let transport = Arc::new(ScriptedTransport {
            fail_open: true,
            ..ScriptedTransport::new(Vec::new())
        });
        let session = ResearchSession::new(transport);

        let result = session.submit("q").await;
        assert!(matches!(result, Submission::Finished(ResearchOutcome::Failed { .. })));
        assert!(session.snapshot().report.contains("refused"));
    }

    #[tokio::test]
    async fn test_stream_closed_without_terminal_event() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ev(EventKind::Think, "hmm"),
            ev(EventKind::Answer, "half"),
        ]));
        let session = ResearchSession::new(transport);

        assert_eq!(
            session.submit("q").await,
            Submission::Finished(ResearchOutcome::Closed)
        );
        let state = session.snapshot();
        assert!(!state.is_researching);
        assert!(state.active_step().is_none());
        assert_eq!(state.report, "half");
    }

    #[tokio::test]
    async fn test_resubmission_clears_previous_run() {
        let transport = Arc::new(ScriptedTransport::new(full_run()));
        let session = ResearchSession::new(transport.clone());

        session.submit("one").await;
        session.submit("two").await;

        let state = session.snapshot();
        assert_eq!(state.query, "two");
        assert_eq!(state.report, "Rust is a language.");
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.steps.len(), 3);
        assert_eq!(transport.opened(), 2);

        assert!(session.reset());
        assert_eq!(session.snapshot(), ResearchState::default());
    }

    #[tokio::test]
    async fn test_events_broadcast_in_order() {
        let transport = Arc::new(ScriptedTransport::new(full_run()));
        let session = ResearchSession::new(transport);
        let mut rx = session.subscribe();

        session.submit("q").await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert!(matches!(received.first(), Some(SessionEvent::ResearchStart { .. })));
        assert!(received.last().is_some_and(|e| e.is_terminal()));

        let deltas: String = received
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ReportDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, "Rust is a language.");
    }

    #[tokio::test]
    async fn test_dropped_submission_releases_gate() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::gated(full_run(), gate.clone()));
        let session = ResearchSession::new(transport.clone());

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), session.submit("q")).await;
        assert!(timed_out.is_err());

        let state = session.snapshot();
        assert!(!state.is_researching);
        assert_eq!(state.outcome, Some(ResearchOutcome::Stopped));
        assert!(state.active_step().is_none());
        assert!(!session.stop());
        assert!(session.reset());

        gate.notify_one();
        assert!(matches!(
            session.submit("again").await,
            Submission::Finished(ResearchOutcome::Completed { .. })
        ));
        assert_eq!(transport.opened(), 2);
    }

    /// Bumps the session generation when the stream is dropped, as a
    /// concurrent submission landing right after the terminal event would.
    struct BumpOnDrop(Arc<Mutex<Inner>>);

    impl Drop for BumpOnDrop {
        fn drop(&mut self) {
            self.0.lock().generation += 1;
        }
    }

    struct RacingTransport {
        inner: Mutex<Option<Arc<Mutex<Inner>>>>,
    }

    #[async_trait]
    impl Transport for RacingTransport {
        async fn open(
            &self,
            _request: &ResearchRequest,
            _cancel: CancellationToken,
        ) -> deepr_api::Result<ResearchEventStream> {
            let bump = self.inner.lock().clone().map(BumpOnDrop);
            Ok(Box::pin(async_stream::stream! {
                let _bump = bump;
                for event in full_run() {
                    yield event;
                }
            }))
        }
    }

    #[tokio::test]
    async fn test_outcome_survives_generation_change_after_finish() {
        let transport = Arc::new(RacingTransport {
            inner: Mutex::new(None),
        });
        let session = ResearchSession::new(transport.clone());
        *transport.inner.lock() = Some(session.inner.clone());

        assert_eq!(
            session.submit("q").await,
            Submission::Finished(ResearchOutcome::Completed {
                termination: Some("answer".into())
            })
        );
    }
}
