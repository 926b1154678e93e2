mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};

use inteliome_core::ids::{ThreadId, UserId};
use inteliome_core::provider::LlmProvider;
use inteliome_core::security::ApiKey;
use inteliome_engine::{Catalog, ControllerConfig, TurnController};
use inteliome_llm::{OpenAiConfig, OpenAiProvider, ReliableConfig, ReliableProvider};
use inteliome_settings::{expand_home, load_settings, load_settings_from_path, StorageBackend};
use inteliome_store::{
    Checkpointer, Database, FactStore, InMemoryCheckpointer, InMemoryFactStore,
    SqliteCheckpointer, SqliteFactStore,
};
use inteliome_telemetry::{init_telemetry, TelemetryConfig, WarningQuery, WarningSink};

use crate::session::{Session, SessionConfig, SessionEnd};

/// Ask questions about the metric catalog in plain English.
#[derive(Debug, Parser)]
#[command(name = "inteliome", version, about)]
struct Cli {
    /// Conversation thread to resume or start. A new id is generated when omitted.
    #[arg(long)]
    thread_id: Option<String>,

    /// Identity that owns the thread and its memories.
    #[arg(long)]
    user_id: Option<String>,

    /// Replace the built-in catalog with this file.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Settings file to use instead of ~/.inteliome/settings.json.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print persisted warnings (for `--thread-id` when given) and exit.
    #[arg(long)]
    warnings: bool,

    /// Maximum number of warnings printed by `--warnings`.
    #[arg(long, default_value_t = 50)]
    warnings_limit: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("loading settings")?;

    let telemetry = init_telemetry(TelemetryConfig::from_settings(&settings.logging));

    if cli.warnings {
        let opened;
        let sink = match telemetry.warnings() {
            Some(sink) => sink,
            None => {
                opened = WarningSink::open(&expand_home(&settings.logging.log_db_path))
                    .context("opening log database")?;
                &opened
            }
        };
        return print_warnings(sink, cli.thread_id.clone(), cli.warnings_limit);
    }

    let api_key = ApiKey::new(std::env::var(&settings.model.api_key_env).unwrap_or_default());
    if api_key.is_empty() {
        if settings.model.base_url.contains("api.openai.com") {
            bail!("{} is not set", settings.model.api_key_env);
        }
        warn!(env = %settings.model.api_key_env, "no API key, sending requests unauthenticated");
    }

    let (facts, checkpointer): (Arc<dyn FactStore>, Arc<dyn Checkpointer>) =
        match settings.storage.backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryFactStore::new()),
                Arc::new(InMemoryCheckpointer::new()),
            ),
            StorageBackend::Sqlite => {
                let db = Database::open(&expand_home(&settings.storage.db_path))
                    .context("opening database")?;
                (
                    Arc::new(SqliteFactStore::new(db.clone())),
                    Arc::new(SqliteCheckpointer::new(db)),
                )
            }
        };

    let catalog_path = cli
        .catalog
        .clone()
        .or_else(|| settings.catalog_path.as_deref().map(expand_home));
    let catalog = Catalog::load_or_builtin(catalog_path.as_deref())?;

    let openai = OpenAiProvider::new(OpenAiConfig::from_settings(&settings.model, api_key))?;
    let provider: Arc<dyn LlmProvider> = Arc::new(ReliableProvider::new(
        openai,
        ReliableConfig::from_settings(&settings.retry),
    ));
    info!(model = provider.model(), backend = ?settings.storage.backend, "starting session");

    let controller = TurnController::new(provider, catalog, ControllerConfig::from_settings(&settings))
        .with_fact_store(facts);
    let session = Session::new(
        controller,
        checkpointer,
        SessionConfig::from_settings(&settings.conversation),
    );

    let thread_id = cli.thread_id.map_or_else(ThreadId::new, ThreadId::from_raw);
    let user_id = UserId::from_raw(
        cli.user_id
            .unwrap_or_else(|| settings.conversation.default_user_id.clone()),
    );

    let end = session
        .run(
            thread_id,
            user_id,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await?;
    if end == SessionEnd::EndOfInput {
        info!("session ended at end of input");
    }
    Ok(())
}

fn print_warnings(sink: &WarningSink, thread_id: Option<String>, limit: u32) -> anyhow::Result<()> {
    let records = sink.query(&WarningQuery {
        level: None,
        thread_id,
        limit: Some(limit),
    })?;
    for record in records.iter().rev() {
        println!("{record}");
    }
    println!("{} shown, {} stored", records.len(), sink.count()?);
    Ok(())
}
