//! Main module for the Memoseek CLI application (mseek).
//!
//! This module provides the main function and auxiliary functionalities for
//! the CLI application. It handles command parsing, configuration loading,
//! and wiring of the query engine, as well as invoking the appropriate
//! functionality based on the provided command-line arguments.
//!
//! # Examples
//!
//! Answering a query (cache first, live web on a miss):
//!
//! ```sh
//! mseek search "top bookshops in paris"
//! ```
//!
//! Forcing a fresh scrape even when a cached answer exists:
//!
//! ```sh
//! mseek search --force "top bookshops in paris"
//! ```
//!
//! Initializing the application's configuration:
//!
//! ```sh
//! mseek init
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{
    env,
    error::Error,
    fs,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use memoseek::{
    api,
    cache::SimilarityCache,
    classifier::LlmClassifier,
    commands::{Cli, Commands},
    config::{MemoseekConfig, load_config},
    config_dir,
    embedding::{EMBEDDING_DIMENSION, SentenceEmbedder},
    error::QueryError,
    orchestrator::{QueryEngine, QueryOutcome},
    scrape::WebScraper,
    summarizer::LlmSummarizer,
    vector_store::HnswStore,
    writer::CacheWriter,
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
    dotenvy::dotenv().ok();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Main asynchronous function of the Memoseek CLI application.
///
/// Loads configuration, parses command-line arguments, and executes the
/// appropriate command.
///
/// # Errors
///
/// Returns an error if there is an issue loading the configuration, wiring
/// the engine, or executing the specified command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            force,
            threshold,
        } => {
            let config_path = match env::var("MEMOSEEK_CONFIG") {
                Ok(path) => PathBuf::from(path),
                Err(_) => config_dir()?.join("config.yaml"),
            };
            debug!("loading config from {}", config_path.display());
            let mut config = load_config(
                config_path
                    .to_str()
                    .ok_or("config path is not valid UTF-8")?,
            )?;
            if let Some(t) = threshold {
                config.similarity_threshold = t;
            }

            search(&config, &query, force).await
        }
        Commands::Init => init(),
    }
}

/// Wire the query engine from configuration and handle one query.
async fn search(config: &MemoseekConfig, query: &str, force: bool) -> Result<(), Box<dyn Error>> {
    let llm_timeout = Duration::from_secs(config.llm_timeout_secs);
    let client = api::create_client(config);

    let classifier = Arc::new(LlmClassifier::new(
        client.clone(),
        config.model.clone(),
        llm_timeout,
    ));
    let summarizer = Arc::new(LlmSummarizer::new(client, config.model.clone(), llm_timeout));

    let embedder = Arc::new(SentenceEmbedder::load()?);

    let store_path = match &config.store_path {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("cache_store.yaml"),
    };
    let store = Arc::new(RwLock::new(HnswStore::load_or_create(
        &store_path,
        EMBEDDING_DIMENSION,
    )?));

    let cache = SimilarityCache::new(embedder, store.clone());
    let writer = CacheWriter::new(cache.clone(), store.clone());
    let pipeline = Arc::new(WebScraper::new(
        &config.search_base,
        &config.user_agent,
        Duration::from_secs(config.search_timeout_secs),
        Duration::from_secs(config.fetch_timeout_secs),
    )?);

    let engine = QueryEngine::new(
        classifier,
        cache,
        pipeline,
        summarizer,
        writer,
        config.similarity_threshold,
        config.max_results,
    );

    match engine.handle(query, force).await {
        Ok(QueryOutcome::Cached(hit)) => {
            println!("Cached answer (similarity {:.2})", hit.similarity);
            println!("  matched query: {}", hit.entry.original_query_text);
            println!("  summary:       {}", hit.entry.summary_text);
            println!("  source:        {}", hit.entry.source_url);
            Ok(())
        }
        Ok(QueryOutcome::Fresh { answers, report }) => {
            store.read().await.save(&store_path)?;
            println!("Fresh results for: {query}");
            for answer in &answers {
                println!("  {}", answer.url);
                println!("    {}", answer.summary);
            }
            if !report.failures.is_empty() {
                eprintln!(
                    "Stored {} of {} results; {} failed to persist.",
                    report.stored,
                    answers.len(),
                    report.failures.len()
                );
            }
            Ok(())
        }
        Err(QueryError::Rejected) => {
            println!("This is not a valid query.");
            Ok(())
        }
        Err(QueryError::NoUsableResults) => {
            println!("No results found.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Initializes the application's configuration.
///
/// Creates the configuration directory and writes a starter `config.yaml`
/// with placeholder credentials.
///
/// # Errors
///
/// Returns an error if there is an issue creating the directory or file, or
/// serializing the configuration to YAML.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.yaml");
    let config = MemoseekConfig::default();
    let config_yaml = serde_yaml::to_string(&config)?;
    fs::write(&config_path, config_yaml)?;
    println!("Wrote starter config to {}", config_path.display());
    println!("Set api_key (or MEMOSEEK_API_KEY) before the first search.");

    Ok(())
}
