//! This module provides functionality for loading and handling the
//! application's configuration.
//!
//! It defines the `MemoseekConfig` struct, which holds the configuration
//! parameters, and a `load_config` function to load the configuration from a
//! YAML file. Secrets stay out of the file when possible: `MEMOSEEK_API_KEY`
//! in the environment (or a `.env` file, loaded at startup) overrides the
//! `api_key` field.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use memoseek::config::{MemoseekConfig, load_config};
//!
//! let config: MemoseekConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{env, error::Error, fs};
use tracing::debug;

/// Represents the application's configuration.
///
/// Everything tunable about a query's journey lives here: the LLM endpoint
/// both judgment calls go through, the search endpoint, the similarity
/// threshold gating cache hits, and the per-operation timeouts.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct MemoseekConfig {
    /// API key for the OpenAI-compatible endpoint. Overridden by
    /// `MEMOSEEK_API_KEY` when set.
    pub api_key: String,

    /// Base URL of the OpenAI-compatible endpoint.
    pub api_base: String,

    /// Model used for both classification and summarization.
    pub model: String,

    /// HTML search endpoint accepting a `q` parameter.
    #[serde(default = "default_search_base")]
    pub search_base: String,

    /// User-Agent header sent on search and page requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Minimum cosine similarity for a cache hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum result URLs scraped per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Where the vector-store snapshot lives. Defaults to
    /// `config_dir()/cache_store.yaml` when absent.
    #[serde(default)]
    pub store_path: Option<String>,

    /// Timeout for classifier and summarizer calls, seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Timeout for the search request, seconds.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    /// Timeout for each page fetch, seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for MemoseekConfig {
    /// Starter configuration written by `mseek init`. The API key is a
    /// placeholder; set it in the file or via `MEMOSEEK_API_KEY`.
    fn default() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-3.5-haiku".to_string(),
            search_base: default_search_base(),
            user_agent: default_user_agent(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            store_path: None,
            llm_timeout_secs: default_llm_timeout_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_search_base() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
Chrome/125.0.0.0 Safari/537.36"
        .to_string()
}

fn default_similarity_threshold() -> f32 {
    0.72
}

fn default_max_results() -> usize {
    6
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_search_timeout_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

#[cfg(test)]
impl MemoseekConfig {
    /// Baseline config for unit tests; individual fields are overridden with
    /// struct-update syntax.
    pub(crate) fn for_tests() -> Self {
        Self {
            api_key: "mock_api_key".to_string(),
            api_base: "http://mock.api.base".to_string(),
            model: "mock_model".to_string(),
            search_base: default_search_base(),
            user_agent: "memoseek-test".to_string(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            store_path: None,
            llm_timeout_secs: 5,
            search_timeout_secs: 5,
            fetch_timeout_secs: 5,
        }
    }
}

/// Loads the application's configuration from a YAML file.
///
/// The `MEMOSEEK_API_KEY` environment variable, when present and non-empty,
/// takes precedence over the file's `api_key`.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(MemoseekConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or
///   parsing the YAML.
pub fn load_config(file: &str) -> Result<MemoseekConfig, Box<dyn Error>> {
    debug!("loading config from {file}");
    let content = fs::read_to_string(file)?;
    let mut config: MemoseekConfig = serde_yaml::from_str(&content)?;

    if let Ok(key) = env::var("MEMOSEEK_API_KEY") {
        if !key.is_empty() {
            config.api_key = key;
        }
    }

    Ok(config)
}
