//! # Memoseek (library root)
//!
//! Semantic answer cache with a live web-search fallback. A free-text query
//! is answered from a previously computed result when a semantically similar
//! query was seen before; otherwise the system searches the web, scrapes the
//! top results, summarizes each page, and persists the new answers for
//! future reuse.
//!
//! The decision pipeline, leaf to root:
//! - [`normalizer`] — canonicalizes query text for embedding consistency.
//! - [`embedding`] — fixed-dimension sentence embeddings (MiniLM via Candle).
//! - [`vector_store`] — persistent nearest-neighbor index over cached
//!   answers.
//! - [`classifier`] — fail-closed LLM gate in front of all expensive work.
//! - [`cache`] — threshold-gated similarity lookup composing the three
//!   above.
//! - [`scrape`] / [`summarizer`] — the cold path: live search, page
//!   extraction, ~50-word summaries.
//! - [`writer`] — persists (query, page) pairs as addressable entries.
//! - [`orchestrator`] — sequences one query end-to-end.
//!
//! Supporting modules: [`api`] (chat-completion plumbing), [`config`],
//! [`commands`], [`error`].
//!
//! ## Quick example
//! ```no_run
//! use memoseek::cache::SimilarityCache;
//! use memoseek::embedding::{EMBEDDING_DIMENSION, SentenceEmbedder};
//! use memoseek::vector_store::HnswStore;
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = Arc::new(SentenceEmbedder::load()?);
//! let store = Arc::new(RwLock::new(HnswStore::new(EMBEDDING_DIMENSION)));
//! let cache = SimilarityCache::new(embedder, store);
//! if let Some(hit) = cache.lookup("top bookshops in paris", 0.72).await? {
//!     println!("cached: {} ({})", hit.entry.summary_text, hit.similarity);
//! }
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;

pub mod api;
pub mod cache;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod scrape;
pub mod summarizer;
pub mod vector_store;
pub mod writer;

/// Return the per-platform configuration directory used by Memoseek.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "awful-sec", "memoseek")`, so you get the right place on each OS
/// (e.g., `~/Library/Application Support/com.awful-sec.memoseek` on macOS).
///
/// The directory is **not** created by this function; callers that need it
/// should create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be
/// determined (which is rare but possible in heavily sandboxed
/// environments).
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "awful-sec", "memoseek")
        .ok_or("Unable to determine config directory")?;

    Ok(proj_dirs.config_dir().to_path_buf())
}
