//! /history, /show, /bookmark and /delete

use super::CommandResult;
use deepr_api::HistoryItem;

use crate::utils::{one_line, truncate_chars};

pub struct HistoryCommand;

impl HistoryCommand {
    /// Execute /history - `bookmarked` (or `b`) limits the listing
    pub fn list(args: &str) -> CommandResult {
        match args.to_lowercase().as_str() {
            "" | "all" => CommandResult::History {
                bookmarked_only: false,
            },
            "bookmarked" | "bookmarks" | "b" => CommandResult::History {
                bookmarked_only: true,
            },
            other => CommandResult::Message(format!(
                "Unknown history filter '{}'. Use /history or /history bookmarked",
                other
            )),
        }
    }

    /// Commands that need a task reference
    pub fn with_task(args: &str, make: fn(String) -> CommandResult) -> CommandResult {
        if args.is_empty() {
            CommandResult::Message(
                "Missing task: pass a number from /history or a task id".to_string(),
            )
        } else {
            make(args.to_string())
        }
    }

    /// Format a history listing as text
    pub fn list_text(items: &[HistoryItem]) -> String {
        if items.is_empty() {
            return "No research history yet.".to_string();
        }

        let mut output = String::new();
        output.push_str(&format!(
            "{:<4} {:<3} {:<10} {:<20} {:>5}  Question\n",
            "#", "", "Status", "Created", "Iter"
        ));
        output.push_str(&"-".repeat(90));
        output.push('\n');

        for (i, item) in items.iter().enumerate() {
            let marker = if item.bookmarked() { "*" } else { "" };
            output.push_str(&format!(
                "{:<4} {:<3} {:<10} {:<20} {:>5}  {}\n",
                i + 1,
                marker,
                item.status.to_string(),
                item.created_at_display(),
                item.iterations,
                truncate_chars(&one_line(&item.question), 50)
            ));
        }
        output.push_str("\nShow a run with: /show <#>");
        output
    }
}

/// Resolve a task reference: a 1-based position in `items`, an exact task
/// id, or a unique task id prefix.
pub fn resolve_task<'a>(reference: &str, items: &'a [HistoryItem]) -> Option<&'a HistoryItem> {
    let reference = reference.trim();
    if let Ok(n) = reference.parse::<usize>() {
        if n >= 1 && n <= items.len() {
            return Some(&items[n - 1]);
        }
    }

    if let Some(item) = items.iter().find(|i| i.task_id == reference) {
        return Some(item);
    }

    let mut matches = items.iter().filter(|i| i.task_id.starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(item), None) if !reference.is_empty() => Some(item),
        _ => None,
    }
}
