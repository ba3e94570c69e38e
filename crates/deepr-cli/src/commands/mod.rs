//! Slash commands for interactive mode

mod history;
mod models;
mod settings;

pub use history::{HistoryCommand, resolve_task};
pub use models::list_models_text;
pub use settings::{parse_settings_update, settings_text};

use deepr_session::ExportFormat;

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Reset the session
    Clear,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
    /// List past runs, optionally only bookmarked ones
    History { bookmarked_only: bool },
    /// Show a past run by index or task id
    Show(String),
    /// Toggle the bookmark of a past run
    Bookmark(String),
    /// Delete a past run
    Delete(String),
    /// Write the current report to the export directory
    Export(ExportFormat),
    /// List sources of the current session
    Sources,
    /// Show backend settings
    ShowSettings,
    /// Update backend settings from `key=value` pairs
    SetSettings(String),
    /// List models offered by the backend
    Models,
}

/// Parse a slash command
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = input[1..].splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" | "hist" => HistoryCommand::list(args),

        "show" => HistoryCommand::with_task(args, CommandResult::Show),

        "bookmark" | "b" => HistoryCommand::with_task(args, CommandResult::Bookmark),

        "delete" | "rm" => HistoryCommand::with_task(args, CommandResult::Delete),

        "export" | "e" => {
            if args.is_empty() {
                CommandResult::Export(ExportFormat::default())
            } else {
                match ExportFormat::from_extension(args) {
                    Some(format) => CommandResult::Export(format),
                    None => CommandResult::Message(format!(
                        "Unsupported export format '{}'. Use md or json.",
                        args
                    )),
                }
            }
        }

        "sources" | "src" => CommandResult::Sources,

        "settings" | "set" => {
            if args.is_empty() {
                CommandResult::ShowSettings
            } else {
                CommandResult::SetSettings(args.to_string())
            }
        }

        "models" | "m" => CommandResult::Models,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?             Show this help message
  /history [bookmarked]     List past research runs
  /show <n|task-id>         Show a past run's report
  /bookmark, /b <n|id>      Toggle a run's bookmark
  /delete, /rm <n|id>       Delete a past run
  /export, /e [md|json]     Export the current report
  /sources                  List sources of the current report
  /settings [key=value ..]  Show or change backend settings
  /models, /m               List models offered by the backend
  /clear, /c                Start a fresh session
  /quit, /exit, /q          Exit deepr

Anything else is submitted as a research question.
Ctrl-C stops a run in progress; at the prompt it exits deepr.

Examples:
  /history bookmarked       Only bookmarked runs
  /show 2                   Second run of the last listing
  /settings temperature=0.3 max_iterations=40"#
        .to_string()
}
