//! Error taxonomy for the query pipeline.
//!
//! The guiding split: **request-level** failures ([`QueryError`]) end a query,
//! while **per-item** failures ([`FetchError`] per URL, [`StoreError`] per
//! cache entry) are isolated, logged, and aggregated by whichever component
//! owns the batch. A cache miss is not an error at all — lookups return
//! `Ok(None)`.
//!
//! The classifier gate is fail-closed: an unreachable classifier rejects the
//! query just like a semantic `INVALID` does, but the two stay distinguishable
//! so callers can tell "out of scope" apart from "gate was down".

use thiserror::Error;

/// A failure that ends the handling of one query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The classifier judged the query out of scope.
    #[error("query rejected as out of scope")]
    Rejected,

    /// The classifier call itself failed (timeout, transport, malformed
    /// endpoint). Fail-closed: treated as a rejection, reported distinctly.
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// The scrape pipeline produced zero usable pages. Terminal for this
    /// query; surfaced to the caller as "no results found", never retried.
    #[error("no usable results for this query")]
    NoUsableResults,

    /// The live search request itself could not be issued or parsed.
    #[error("search request failed: {0}")]
    SearchFailed(String),

    /// Embedding the query failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// The vector store refused an operation outside of per-entry upserts
    /// (e.g. a dimension mismatch on the lookup path).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Classifier transport outcome, kept separate from the semantic verdict.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The judgment service did not answer in time or at all.
    #[error("judgment service unavailable: {0}")]
    Unavailable(String),
}

/// Failure while turning text into a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("model inference failed: {0}")]
    Inference(String),

    #[error("embedding model could not be loaded: {0}")]
    ModelLoad(String),
}

/// Per-URL failure inside the scrape pipeline. Always isolated: one bad URL
/// is skipped, the batch continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("navigation timed out after {0}s")]
    Timeout(u64),

    #[error("non-success status: {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The page loaded but yielded no extractable text.
    #[error("no extractable content")]
    NoContent,
}

/// Per-entry failure at the storage boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Vector length does not match the store's fixed dimensionality.
    #[error("embedding dimension {got} does not match store dimension {want}")]
    DimensionMismatch { got: usize, want: usize },

    /// A required `CacheEntry` field was empty. Entries are validated here,
    /// at the boundary, rather than trusted from the caller.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The ANN index rejected an insert or rebuild.
    #[error("index operation failed: {0}")]
    Index(&'static str),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store (de)serialization failed: {0}")]
    Serde(#[from] serde_yaml::Error),
}
