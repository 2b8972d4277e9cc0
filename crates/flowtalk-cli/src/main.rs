//! CLI entry point for FlowTalk.
//!
//! Provides the `flowtalk` command:
//! - `flowtalk serve` — run the chat relay server
//! - `flowtalk migrate` — apply pending schema migrations and exit
//! - `flowtalk status` — print store counts and exit
//!
//! Configuration comes from the environment (a `.env` file is loaded if
//! present): `FLOWTALK_DB`, `JWT_SECRET`, `TRANSLATOR_API_KEY`,
//! `TRANSLATOR_BASE_URL`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowtalk_pipeline::{
    ContentParser, HttpTranslator, HttpTranslatorConfig, LanguageDetector, MemoryCache,
    ParserConfig, PhraseTableTranslator, PipelineConfig, TranslationCache, TranslationPipeline,
    Translator, spawn_cleanup,
};
use flowtalk_store::{Database, MessageStore};
use flowtalk_web::{AppState, TokenSigner, WebConfig, WebServer};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "flowtalk", version, about = "Multilingual chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat relay server.
    Serve {
        /// Interface to bind.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// TCP port.
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Print store counts and exit.
    Status,
}

/// Cache defaults: an hour of TTL, swept every five minutes.
const CACHE_MAX_ENTRIES: usize = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (silently ignore if missing).
    dotenvy::dotenv().ok();
    init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(bind, port).await,
        Commands::Migrate => cmd_migrate().await,
        Commands::Status => cmd_status().await,
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Read an environment variable, treating empty values as unset.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn db_path() -> String {
    env_non_empty("FLOWTALK_DB").unwrap_or_else(|| "data/flowtalk.db".to_string())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(bind: String, port: u16) -> Result<()> {
    let Some(jwt_secret) = env_non_empty("JWT_SECRET") else {
        bail!("JWT_SECRET must be set to run the server");
    };

    let path = db_path();
    if let Some(parent) = std::path::Path::new(&path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = Database::open_and_migrate(path).await?;

    // Online translator when a key is configured, otherwise the built-in
    // phrase table in degraded mode.
    let translator: Arc<dyn Translator> = match env_non_empty("TRANSLATOR_API_KEY") {
        Some(api_key) => {
            let base_url = env_non_empty("TRANSLATOR_BASE_URL")
                .unwrap_or_else(|| "https://translate.flowtalk.dev".to_string());
            info!(base_url = %base_url, "using HTTP translator");
            Arc::new(HttpTranslator::new(HttpTranslatorConfig::new(api_key, base_url))?)
        }
        None => {
            warn!("TRANSLATOR_API_KEY not set; running with the offline phrase table");
            Arc::new(PhraseTableTranslator)
        }
    };

    let cache: Arc<dyn TranslationCache> =
        Arc::new(MemoryCache::new(CACHE_MAX_ENTRIES, CACHE_TTL));
    let cleanup = spawn_cleanup(Arc::clone(&cache), CACHE_CLEANUP_INTERVAL);

    let pipeline = Arc::new(TranslationPipeline::new(
        ContentParser::new(ParserConfig::default()),
        LanguageDetector::new(),
        Arc::clone(&cache),
        translator,
        Arc::new(MessageStore::new(db.clone())),
        PipelineConfig::default(),
    ));

    let state = Arc::new(AppState::new(db, pipeline, TokenSigner::new(&jwt_secret)));
    let server = WebServer::new(WebConfig { bind_addr: bind, port }, state);

    info!(addr = %server.addr(), "flowtalk serving");
    let result = server.start().await;

    // Drain: stop the periodic cache sweep before exiting.
    cleanup.abort();
    info!(cache = %cache.stats(), "shutdown complete");

    result.map_err(|e| anyhow::anyhow!("server error: {e}"))
}

async fn cmd_migrate() -> Result<()> {
    let db = Database::open_and_migrate(db_path()).await?;
    drop(db);
    println!("migrations applied");
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let db = Database::open_and_migrate(db_path()).await?;

    let (users, communities, messages, translations) = db
        .execute(|conn| {
            let count = |sql: &str| -> flowtalk_store::StoreResult<i64> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };
            Ok((
                count("SELECT count(*) FROM users")?,
                count("SELECT count(*) FROM communities")?,
                count("SELECT count(*) FROM messages")?,
                count("SELECT count(*) FROM translations")?,
            ))
        })
        .await?;

    println!("users:        {users}");
    println!("communities:  {communities}");
    println!("messages:     {messages}");
    println!("translations: {translations}");
    Ok(())
}
