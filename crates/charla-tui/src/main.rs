use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use charla_core::ai::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use charla_core::{
    Config, ConversationStore, FileStorage, GeminiClient, MemoryStorage, Persistence, Storage,
    SubmitPolicy,
};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

/// Log filter variable, e.g. `CHARLA_LOG=charla_core=debug`
const LOG_ENV: &str = "CHARLA_LOG";

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "Chat with Google Gemini from the terminal; history is kept between runs")]
struct Cli {
    /// Gemini model to use
    #[arg(short, long)]
    model: Option<String>,

    /// API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Directory holding the conversation and log file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Wait for each answer before sending the next question
    #[arg(short, long)]
    serialize: bool,

    /// Write the effective settings to the config file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config file: {:#}", e);
        Config::new()
    });
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = Some(base_url);
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }
    if cli.serialize {
        config.serialize_submissions = Some(true);
    }
    if cli.save_config {
        config.save()?;
    }

    let data_dir = config.data_dir.clone().or_else(FileStorage::default_dir);
    let logs = log_dir(data_dir.as_deref());
    if let Err(e) = init_logging(&logs) {
        eprintln!("Logging disabled: {:#}", e);
    }

    let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let base_url = config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let api_key = config.resolve_api_key();
    let client = GeminiClient::new(api_key.as_deref())
        .with_base_url(&base_url)
        .with_model(&model);
    if !client.has_api_key() {
        tracing::warn!("No API key configured; every question will get the error reply");
    }
    let policy = config.submit_policy();
    let key_source = config.key_source();

    tracing::info!(%model, ?policy, data_dir = ?data_dir, "Starting charla");

    match data_dir {
        Some(dir) => {
            let persistence = Persistence::new(FileStorage::new(dir));
            run(persistence, client, policy, &model, key_source).await
        }
        None => {
            // The TUI owns the terminal once it starts, so say it now
            eprintln!("No data directory available; history will not survive this run");
            tracing::warn!("No data directory available; history kept in memory only");
            let persistence = Persistence::new(MemoryStorage::new());
            run(persistence, client, policy, &model, key_source).await
        }
    }
}

async fn run<S: Storage>(
    persistence: Persistence<S>,
    client: GeminiClient,
    policy: SubmitPolicy,
    model: &str,
    key_source: Option<&'static str>,
) -> Result<()> {
    let store = ConversationStore::initialize(persistence, Arc::new(client)).with_policy(policy);
    let mut app = App::new(store, model, key_source);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result: Result<()> = async {
        loop {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
            app.sync_answers();

            if app.should_quit {
                break;
            }
        }
        Ok(())
    }
    .await;

    tui::restore()?;

    if app.is_awaiting() {
        tracing::info!(pending = app.store.pending(), "Quitting with unanswered questions");
    }
    result
}

/// Logs go next to the conversation, or under the temp dir when there is
/// no data directory.
fn log_dir(data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir().join("charla"),
    }
}

/// Log to `{dir}/charla.log`; the terminal belongs to the TUI
fn init_logging(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let path = dir.join("charla.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init();
    Ok(())
}
