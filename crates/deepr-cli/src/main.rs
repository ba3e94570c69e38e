//! deepr - terminal client for the deep research backend

mod commands;
mod config;
mod render;
mod utils;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use deepr_api::{
    BatchResearchRequest, HistoryItem, ResearchBackend, ResearchClient, ResearchRequest,
};
use deepr_session::{
    ExportFormat, HistoryLibrary, HttpTransport, RejectReason, ResearchOutcome, ResearchSession,
    SettingsStore, Submission, export_to_dir, render_history_detail,
};
use tokio::sync::broadcast::error::RecvError;

use commands::{CommandResult, HistoryCommand};
use render::Renderer;
use utils::truncate_chars;

/// deepr - deep research from the terminal
#[derive(Parser, Debug)]
#[command(name = "deepr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Research backend address (default: http://localhost:8000)
    #[arg(long)]
    base_url: Option<String>,

    /// Iteration cap for research runs (1-100)
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a question and print the report
    Research {
        /// The question to research
        #[arg(required = true)]
        question: Vec<String>,

        /// Also export the report (md or json)
        #[arg(long)]
        export: Option<String>,

        /// Queue the question as a background task and print its id
        #[arg(long = "async", conflicts_with_all = ["export", "no_stream"])]
        background: bool,

        /// Wait for the whole report instead of streaming progress
        #[arg(long, conflicts_with = "export")]
        no_stream: bool,
    },
    /// Queue several questions as background tasks
    Batch {
        /// Questions to research, one per argument
        #[arg(required = true)]
        questions: Vec<String>,
    },
    /// List past research runs
    History {
        /// Only bookmarked runs
        #[arg(short, long)]
        bookmarked: bool,
    },
    /// Show a past run's report
    Show { task: String },
    /// Show the status of a research task
    Status { task_id: String },
    /// Toggle a run's bookmark
    Bookmark { task: String },
    /// Delete a past run
    Delete { task: String },
    /// Show or change backend settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// List models offered by the backend
    Models,
    /// Check backend health
    Health,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Change settings, e.g. `temperature=0.3 max_iterations=40`
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
}

/// Everything a command needs to talk to the backend
struct App {
    config: config::Config,
    client: ResearchClient,
    session: ResearchSession,
    library: HistoryLibrary,
    settings: SettingsStore,
    /// Last printed history listing, for `/show 2` style references
    listing: Vec<HistoryItem>,
    max_iterations: Option<u32>,
}

impl App {
    fn new(config: config::Config, base_url: String, max_iterations: Option<u32>) -> anyhow::Result<Self> {
        let client = ResearchClient::new(base_url)?;
        let backend: Arc<dyn ResearchBackend> = Arc::new(client.clone());
        let transport = Arc::new(HttpTransport::new(client.clone()));
        let max_iterations = max_iterations.or(config.max_iterations);
        let session = ResearchSession::new(transport).with_max_iterations(max_iterations);

        Ok(Self {
            config,
            client,
            session,
            library: HistoryLibrary::new(backend.clone()),
            settings: SettingsStore::new(backend),
            listing: Vec::new(),
            max_iterations,
        })
    }

    /// Find a run by listing position, task id, or id prefix
    async fn resolve(&mut self, reference: &str) -> anyhow::Result<HistoryItem> {
        if let Some(item) = commands::resolve_task(reference, &self.listing) {
            return Ok(item.clone());
        }
        let items = self.library.refresh().await?;
        if let Some(item) = commands::resolve_task(reference, &items) {
            return Ok(item.clone());
        }
        let result = self
            .client
            .research_result(reference)
            .await
            .with_context(|| format!("No research run matches '{}'", reference))?;
        Ok(result.into())
    }

    async fn history(&mut self, bookmarked_only: bool) -> anyhow::Result<String> {
        self.library.refresh().await?;
        self.listing = if bookmarked_only {
            self.library.bookmarked()
        } else {
            self.library.items()
        };
        Ok(HistoryCommand::list_text(&self.listing))
    }

    async fn show(&mut self, reference: &str) -> anyhow::Result<String> {
        let item = self.resolve(reference).await?;
        Ok(render_history_detail(&item))
    }

    async fn bookmark(&mut self, reference: &str) -> anyhow::Result<String> {
        let item = self.resolve(reference).await?;
        if self.library.find(&item.task_id).is_none() {
            self.library.refresh().await?;
        }
        let bookmarked = self.library.toggle_bookmark(&item.task_id).await?;
        if let Some(listed) = self.listing.iter_mut().find(|i| i.task_id == item.task_id) {
            listed.is_bookmarked = Some(bookmarked);
        }
        Ok(if bookmarked {
            format!("Bookmarked: {}", item.question)
        } else {
            format!("Removed bookmark: {}", item.question)
        })
    }

    async fn delete(&mut self, reference: &str) -> anyhow::Result<String> {
        let item = self.resolve(reference).await?;
        if self.library.find(&item.task_id).is_none() {
            self.library.refresh().await?;
        }
        self.library.delete(&item.task_id).await?;
        self.listing.retain(|i| i.task_id != item.task_id);
        Ok(format!("Deleted: {}", item.question))
    }

    async fn show_settings(&self) -> anyhow::Result<String> {
        let settings = self.settings.load().await?;
        Ok(commands::settings_text(&settings))
    }

    async fn set_settings(&self, args: &str) -> anyhow::Result<String> {
        let update = commands::parse_settings_update(args).map_err(anyhow::Error::msg)?;
        let saved = self.settings.update(update).await?;
        Ok(format!("Settings saved.\n{}", commands::settings_text(&saved)))
    }

    async fn models(&self) -> anyhow::Result<String> {
        let current = match self.settings.current() {
            Some(settings) => Some(settings.model_name),
            None => self.settings.load().await.ok().map(|s| s.model_name),
        };
        let models = self.settings.models().await?;
        Ok(commands::list_models_text(&models, current.as_deref()))
    }

    async fn research_blocking(&self, question: &str) -> anyhow::Result<String> {
        let request = ResearchRequest::new(question).with_max_iterations(self.max_iterations);
        let result = self.client.research(&request).await?;
        Ok(render_history_detail(&result.into()))
    }

    async fn research_background(&self, question: &str) -> anyhow::Result<String> {
        let request = ResearchRequest::new(question).with_max_iterations(self.max_iterations);
        let status = self.client.research_async(&request).await?;
        Ok(format!(
            "Queued task {} ({})\nCheck with: deepr status {}",
            status.task_id, status.status, status.task_id
        ))
    }

    async fn research_batch(&self, questions: &[String]) -> anyhow::Result<String> {
        let request = BatchResearchRequest::new(questions.iter().map(|q| q.trim()))
            .with_max_iterations(self.max_iterations);
        let response = self.client.research_batch(&request).await?;
        let mut output = format!(
            "Batch {} {} ({} tasks):\n",
            response.batch_id,
            response.status,
            response.task_ids.len()
        );
        for (task_id, question) in response.task_ids.iter().zip(questions) {
            output.push_str(&format!("  {}  {}\n", task_id, truncate_chars(question, 60)));
        }
        output.push_str("\nCheck with: deepr status <task-id>");
        Ok(output)
    }

    fn export(&self, format: ExportFormat) -> anyhow::Result<String> {
        let state = self.session.snapshot();
        if state.report.trim().is_empty() {
            return Ok("Nothing to export yet.".to_string());
        }
        let path = export_to_dir(&state, &self.config.export_dir(), format)?;
        Ok(format!("Exported to {}", path.display()))
    }

    fn sources(&self) -> String {
        let state = self.session.snapshot();
        if state.sources.is_empty() {
            return "No sources yet.".to_string();
        }
        let mut output = format!("Sources ({}):\n", state.sources.len());
        for (i, source) in state.sources.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n     {}\n", i + 1, source.title, source.url));
        }
        output
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("deepr=debug")
            .with_writer(io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();
    let base_url = cfg.resolve_base_url(args.base_url);
    tracing::debug!("Using research backend at {}", base_url);
    let mut app = App::new(cfg, base_url, args.max_iterations)?;
    spawn_interrupt_handler(app.session.clone());

    match args.command {
        None => run_interactive(&mut app).await,
        Some(Command::Research {
            question,
            background: true,
            ..
        }) => print_result(app.research_background(&question.join(" ")).await),
        Some(Command::Research {
            question,
            no_stream: true,
            ..
        }) => print_result(app.research_blocking(&question.join(" ")).await),
        Some(Command::Research {
            question, export, ..
        }) => {
            let format = match export.as_deref() {
                Some(ext) => Some(
                    ExportFormat::from_extension(ext)
                        .with_context(|| format!("Unsupported export format '{}'", ext))?,
                ),
                None => None,
            };
            run_research(&app.session, &question.join(" ")).await;
            if let Some(format) = format {
                println!("{}", app.export(format)?);
            }
            match app.session.snapshot().outcome {
                Some(ref outcome) if !outcome.is_success() => std::process::exit(1),
                _ => Ok(()),
            }
        }
        Some(Command::Batch { questions }) => print_result(app.research_batch(&questions).await),
        Some(Command::History { bookmarked }) => print_result(app.history(bookmarked).await),
        Some(Command::Show { task }) => print_result(app.show(&task).await),
        Some(Command::Status { task_id }) => {
            let status = app.client.task_status(&task_id).await?;
            println!("Task:       {}", status.task_id);
            println!("Status:     {}", status.status);
            println!("Iteration:  {}", status.current_iteration);
            if let Some(progress) = status.progress {
                println!("Progress:   {}%", progress);
            }
            if !status.message.is_empty() {
                println!("Message:    {}", status.message);
            }
            Ok(())
        }
        Some(Command::Bookmark { task }) => print_result(app.bookmark(&task).await),
        Some(Command::Delete { task }) => print_result(app.delete(&task).await),
        Some(Command::Settings { action }) => match action {
            None | Some(SettingsAction::Show) => print_result(app.show_settings().await),
            Some(SettingsAction::Set { pairs }) => {
                print_result(app.set_settings(&pairs.join(" ")).await)
            }
        },
        Some(Command::Models) => print_result(app.models().await),
        Some(Command::Health) => check_health(&app.client).await,
    }
}

fn print_result(result: anyhow::Result<String>) -> anyhow::Result<()> {
    println!("{}", result?);
    Ok(())
}

async fn check_health(client: &ResearchClient) -> anyhow::Result<()> {
    let report = client.health().await?;
    println!(
        "Backend: {} ({})",
        report.result,
        deepr_api::display_timestamp(&report.timestamp)
    );
    for (name, component) in &report.details {
        match component.message.as_deref() {
            Some(message) if !message.is_empty() => {
                println!("  {:<12} {} - {}", name, component.result, message)
            }
            _ => println!("  {:<12} {}", name, component.result),
        }
    }
    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

/// What Ctrl-C does at a given moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// A run was in progress and has been stopped
    Stopped,
    /// Nothing to stop; leave the program
    Exit,
}

fn interrupt(session: &ResearchSession) -> Interrupt {
    if session.stop() {
        Interrupt::Stopped
    } else {
        Interrupt::Exit
    }
}

/// Ctrl-C stops a run in progress and exits when idle.
fn spawn_interrupt_handler(session: ResearchSession) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt(&session) == Interrupt::Exit {
                eprintln!();
                std::process::exit(130);
            }
        }
    });
}

/// Run one question to completion, printing events as they arrive.
async fn run_research(session: &ResearchSession, question: &str) -> Submission {
    let mut receiver = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut renderer = Renderer::new();
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    print!("{}", renderer.render(&event));
                    io::stdout().flush().ok();
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Display fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let submission = session.submit(question).await;

    match submission {
        Submission::Rejected(reason) => {
            printer.abort();
            match reason {
                RejectReason::EmptyQuestion => eprintln!("Please enter a question."),
                RejectReason::AlreadyResearching => {
                    eprintln!("A research run is already in progress.")
                }
            }
        }
        Submission::Finished(ref outcome) => {
            if tokio::time::timeout(Duration::from_secs(1), printer)
                .await
                .is_err()
            {
                tracing::debug!("Printer did not see the end of the run");
            }
            if matches!(outcome, ResearchOutcome::Closed) {
                tracing::warn!("Stream closed without a final answer");
            }
        }
    }
    submission
}

async fn run_interactive(app: &mut App) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("deepr ({})", app.client.base_url());
        eprintln!("Ask a research question, or type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input) {
            let output = match result {
                CommandResult::Exit => break,
                CommandResult::Clear => {
                    if app.session.reset() {
                        Ok("Started a fresh session.".to_string())
                    } else {
                        Ok("A research run is still in progress.".to_string())
                    }
                }
                CommandResult::Message(msg) => Ok(msg),
                CommandResult::Unknown(cmd) => Ok(format!(
                    "Unknown command: /{}\nType /help for available commands.",
                    cmd
                )),
                CommandResult::History { bookmarked_only } => app.history(bookmarked_only).await,
                CommandResult::Show(reference) => app.show(&reference).await,
                CommandResult::Bookmark(reference) => app.bookmark(&reference).await,
                CommandResult::Delete(reference) => app.delete(&reference).await,
                CommandResult::Export(format) => app.export(format),
                CommandResult::Sources => Ok(app.sources()),
                CommandResult::ShowSettings => app.show_settings().await,
                CommandResult::SetSettings(args) => app.set_settings(&args).await,
                CommandResult::Models => app.models().await,
            };
            match output {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Error: {:#}", e),
            }
            println!();
            continue;
        }

        println!();
        run_research(&app.session, input).await;
        println!();
    }

    Ok(())
}
