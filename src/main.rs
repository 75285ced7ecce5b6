//! gdocs-sync - edit Google Docs as local Markdown.
//!
//! Subcommands that talk to the worker once (`list`, `auth`, `health`,
//! `install-credentials`) run to completion on the tokio runtime and print
//! to stdout. `open`, `new` and no argument start the TUI.

mod app;
mod ui;

use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gdocs_sync::bridge::{self, DataDirReply, DocsRequest, ListReply};
use gdocs_sync::config::{Config, ConfigArgs};
use gdocs_sync::credentials::install_credentials;
use gdocs_sync::health;
use gdocs_sync::ipc::RpcClient;
use gdocs_sync::models::{AuthOutcome, DocumentId};

use app::{App, StartAction, View};

/// Target frame rate for UI rendering (60fps = ~16ms per frame)
const FRAME_DURATION: Duration = Duration::from_millis(16);

/// The OAuth flow waits for the user in a browser.
const AUTH_TIMEOUT: Duration = Duration::from_secs(300);

const LOG_FILE: &str = "gdocs-sync.log";

// =============================================================================
// Command line
// =============================================================================

#[derive(Parser, Debug)]
#[command(version, about = "Edit Google Docs as local Markdown", long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "With no command the editor starts on the document list.\n\
    Logging is filtered by RUST_LOG (default gdocs_sync=info).")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Open a document in the editor
    Open {
        /// Document id or docs.google.com URL
        #[arg(value_parser = parse_document_id)]
        target: DocumentId,
    },
    /// Create a document and open it
    New {
        /// Title; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Print your documents
    List,
    /// Authorize access to Google Docs
    Auth,
    /// Check the worker and account setup
    Health,
    /// Install an OAuth client credentials file
    InstallCredentials {
        /// Credentials JSON downloaded from the Cloud console
        path: PathBuf,
    },
}

impl Commands {
    /// Editor start action, or `None` for one-shot commands.
    fn start_action(&self) -> Option<StartAction> {
        match self {
            Commands::Open { target } => Some(StartAction::Open(target.clone())),
            Commands::New { title } => Some(StartAction::Create(title.join(" "))),
            _ => None,
        }
    }
}

fn parse_document_id(input: &str) -> Result<DocumentId, String> {
    DocumentId::parse(input).ok_or_else(|| format!("not a document id or URL: {}", input))
}

// =============================================================================
// Terminal safety
// =============================================================================

/// Global flag to track if terminal is in raw mode (for panic cleanup)
static TERMINAL_RAW: AtomicBool = AtomicBool::new(false);

/// RAII guard for terminal state management.
/// Ensures terminal is restored to normal state when dropped, even on panic or early return.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        TERMINAL_RAW.store(true, Ordering::SeqCst);

        // If execute! fails, we must restore terminal state before returning error
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            TERMINAL_RAW.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        TERMINAL_RAW.store(false, Ordering::SeqCst);
    }
}

/// Install a panic hook that restores terminal state before printing panic info.
fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        if TERMINAL_RAW.load(Ordering::SeqCst) {
            // Best effort cleanup - ignore errors
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            let _ = io::stdout().flush();
        }
        default_hook(panic_info);
    }));
}

// =============================================================================
// Logging
// =============================================================================

/// Log to stderr, or to `log_file` while the TUI owns the terminal.
fn init_logging(log_file: Option<File>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gdocs_sync=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init(),
        None => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .init(),
    }
}

/// Open the TUI log file, if a cache directory is available.
fn open_log_file() -> Option<(PathBuf, File)> {
    let dir = Config::log_dir()?;
    fs::create_dir_all(&dir).ok()?;
    let path = dir.join(LOG_FILE);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    Some((path, file))
}

// =============================================================================
// Entry point
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    let start = match &cli.command {
        None => Some(StartAction::List),
        Some(command) => command.start_action(),
    };

    if start.is_some() {
        // Install panic hook FIRST for terminal safety
        install_panic_hook();
        let log = open_log_file();
        let log_path = log.as_ref().map(|(path, _)| path.clone());
        init_logging(log.map(|(_, file)| file));
        if let Some(path) = log_path {
            eprintln!("Logging to {}", path.display());
        }
    } else {
        init_logging(None);
    }

    info!("Starting gdocs-sync v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from(cli.config);
    let runtime = Runtime::new().context("Failed to start the async runtime")?;
    let mut client = RpcClient::new(config.locator(), runtime.handle().clone());
    client.set_timeout(config.request_timeout);

    let result = match (start, cli.command) {
        (Some(action), _) => run_tui(client, config, action),
        (None, Some(Commands::List)) => runtime.block_on(list(&client, &config)),
        (None, Some(Commands::Auth)) => runtime.block_on(auth(&client)),
        (None, Some(Commands::Health)) => runtime.block_on(check_health(&client, &config)),
        (None, Some(Commands::InstallCredentials { path })) => {
            runtime.block_on(install(&client, &path))
        }
        (None, _) => Ok(()),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

async fn list(client: &RpcClient, config: &Config) -> Result<()> {
    let reply: ListReply = bridge::call_sync(
        client,
        DocsRequest::List {
            max_results: config.list_limit,
        },
    )
    .await?;

    if reply.documents.is_empty() {
        println!("No documents found");
    }
    for doc in &reply.documents {
        println!("{:<46} {:<16} {}", doc.id, doc.modified_display(), doc.name);
    }
    Ok(())
}

async fn auth(client: &RpcClient) -> Result<()> {
    println!("Complete the authorization in your browser...");
    let request = DocsRequest::Auth;
    let value = client
        .call_sync_with_timeout(request.method(), request.params(), AUTH_TIMEOUT)
        .await?;
    let outcome: AuthOutcome = bridge::decode(request.method(), value)?;
    println!(
        "{}",
        outcome
            .message
            .as_deref()
            .unwrap_or("Authentication successful")
    );
    Ok(())
}

async fn check_health(client: &RpcClient, config: &Config) -> Result<()> {
    let report = health::run(client, &config.locator()).await;
    print!("{}", report);
    if !report.is_healthy() {
        bail!("Health check failed");
    }
    Ok(())
}

async fn install(client: &RpcClient, source: &std::path::Path) -> Result<()> {
    let reply: DataDirReply = bridge::call_sync(client, DocsRequest::DataDir)
        .await
        .context("Could not ask the worker for its data directory")?;
    let installed = install_credentials(source, &reply.path)?;
    println!("Installed {}", installed.display());
    println!("Run `gdocs-sync auth` to authorize access.");
    Ok(())
}

// =============================================================================
// TUI
// =============================================================================

fn run_tui(client: RpcClient, config: Config, action: StartAction) -> Result<()> {
    let (exit_tx, exit_rx) = mpsc::channel();
    client.set_exit_listener(move |code| {
        let _ = exit_tx.send(code);
    });
    // Surface launch problems before taking over the terminal.
    client
        .ensure_worker_running()
        .context("Could not start the document worker")?;
    let client = Arc::new(client);

    let mut app = App::new(client.clone(), config);
    app.watch_worker_exits(exit_rx);
    app.start(action);

    // Setup terminal with RAII guard - ensures cleanup on any exit path
    let guard = TerminalGuard::new()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = run_app(&mut terminal, &mut app);

    terminal.show_cursor()?;
    drop(guard);

    client.stop_server();
    info!("gdocs-sync exited");
    result
}

/// Main application loop.
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        // Apply completed worker requests (non-blocking)
        app.poll_sync_events();

        // Fire due auto-sync timers
        app.tick();

        app.maybe_clear_notification();

        // Only redraw if state has changed (dirty-flag optimization)
        if app.take_needs_redraw() {
            terminal.draw(|f| ui::render(f, app))?;
        }

        // Poll for events with frame-rate limiting
        if event::poll(FRAME_DURATION)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
                Event::Resize(_, _) => app.mark_dirty(),
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global quit
    if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c')) {
        app.should_quit = true;
        return;
    }

    // Modal input takes priority over all other handlers
    if app.is_new_document_prompt_active() {
        handle_new_document_input(app, key);
        return;
    }

    match app.view {
        View::Documents => handle_documents_input(app, key),
        View::Editor => handle_editor_input(app, key),
    }
}

fn handle_documents_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => app.select_prev_document(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next_document(),
        KeyCode::Enter => app.open_selected_document(),
        KeyCode::Char('r') => app.refresh_documents(),
        KeyCode::Char('n') => app.open_new_document_prompt(),
        KeyCode::Char('a') => app.authenticate(),
        KeyCode::Esc => app.show_editor(),
        _ => {}
    }
}

fn handle_editor_input(app: &mut App, key: KeyEvent) {
    if !key.modifiers.contains(KeyModifiers::CONTROL) {
        app.editor_input(key);
        return;
    }
    match key.code {
        KeyCode::Char('s') => app.push_active(),
        KeyCode::Char('r') => app.pull_active(),
        KeyCode::Char('l') => app.show_documents(),
        KeyCode::Char('w') => app.close_active(),
        KeyCode::Char('n') => app.next_surface(),
        KeyCode::Char('p') => app.prev_surface(),
        // Remaining chords are textarea shortcuts (undo, word motion, ...)
        _ => app.editor_input(key),
    }
}

fn handle_new_document_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_new_document_prompt(),
        KeyCode::Enter => app.submit_new_document(),
        _ => app.new_document_input(key.into()),
    }
}
