//! deepr-session: Live research session runtime
//!
//! Reduces the backend's research event stream into a reasoning timeline,
//! a list of cited sources and a streamed report, and keeps local copies of
//! history and settings that are updated optimistically.

pub mod error;
pub mod events;
pub mod export;
pub mod extractor;
pub mod library;
pub mod mutation;
pub mod reducer;
pub mod session;
pub mod settings;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use events::SessionEvent;
pub use export::{ExportFormat, export_filename, export_to_dir, render_history_detail, render_markdown};
pub use extractor::extract_sources;
pub use library::HistoryLibrary;
pub use mutation::optimistic;
pub use session::{RejectReason, ResearchSession, Submission};
pub use settings::SettingsStore;
pub use state::{ReasoningStep, ResearchOutcome, ResearchSource, ResearchState, StepKind, StepState};
pub use transport::{HttpTransport, Transport};
