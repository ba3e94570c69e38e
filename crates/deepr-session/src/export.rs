//! Report export: file naming and Markdown rendering

use std::path::{Path, PathBuf};

use deepr_api::HistoryItem;

use crate::{error::Result, state::ResearchState};

/// Filename stem used when the question has no usable characters
pub const FALLBACK_STEM: &str = "research_report";

const MAX_STEM_CHARS: usize = 50;

/// Message shown for a history item without an answer
pub const EMPTY_ANSWER: &str = "No report was generated for this research run.";

/// Output formats supported by [`export_to_dir`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Markdown,
    /// Full session snapshot, including the reasoning timeline
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(ExportFormat::Markdown),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

fn is_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Build a filename from a question.
///
/// Every character outside ASCII alphanumerics and the CJK unified range
/// becomes `_`; the stem is capped at 50 characters.
pub fn export_filename(question: &str, ext: &str) -> String {
    let stem: String = question
        .chars()
        .map(|c| if is_filename_char(c) { c } else { '_' })
        .take(MAX_STEM_CHARS)
        .collect();

    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };
    format!("{}.{}", stem, ext)
}

/// Render the session as a standalone Markdown document
pub fn render_markdown(state: &ResearchState) -> String {
    let mut out = String::new();
    let title = state.query.trim();
    out.push_str("# ");
    out.push_str(if title.is_empty() { "Research Report" } else { title });
    out.push_str("\n\n");

    let report = state.report.trim();
    if !report.is_empty() {
        out.push_str(report);
        out.push('\n');
    }

    if !state.sources.is_empty() {
        out.push_str("\n## Sources\n\n");
        for (i, source) in state.sources.iter().enumerate() {
            out.push_str(&format!("{}. [{}]({})\n", i + 1, source.title, source.url));
        }
    }
    out
}

/// Render a stored run for the detail view
pub fn render_history_detail(item: &HistoryItem) -> String {
    let mut out = format!("# {}\n\n", item.question.trim());
    out.push_str(&format!(
        "Status: {} · Iterations: {} · Time: {:.1}s · {}\n\n",
        item.status,
        item.iterations,
        item.execution_time,
        item.created_at_display()
    ));

    match item.answer_text() {
        Some(answer) => {
            out.push_str(answer.trim());
            out.push('\n');
        }
        None => {
            out.push_str(EMPTY_ANSWER);
            out.push('\n');
            if let Some(reason) = item.termination_reason.as_deref().filter(|r| !r.is_empty()) {
                out.push_str(&format!("Termination reason: {}\n", reason));
            }
        }
    }
    out
}

/// Write the session into `dir`, returning the path written
pub fn export_to_dir(state: &ResearchState, dir: &Path, format: ExportFormat) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(&state.query, format.extension()));
    let body = match format {
        ExportFormat::Markdown => render_markdown(state),
        ExportFormat::Json => serde_json::to_string_pretty(state)?,
    };
    std::fs::write(&path, body)?;
    tracing::info!("Exported report to {}", path.display());
    Ok(path)
}
