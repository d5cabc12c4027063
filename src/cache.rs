//! # Similarity cache
//!
//! Answers the question the whole system turns on: *has an equivalent query
//! already been answered?* — without exact string matching, and without ever
//! silently reusing a wrong answer.
//!
//! ## Lookup algorithm
//! 1. Normalize the query ([`crate::normalizer::normalize`]).
//! 2. Embed the normalized text.
//! 3. Ask the store for the top [`TOP_K`] nearest entries by cosine
//!    similarity.
//! 4. Take the single closest entry; it is a hit only if
//!    `similarity >= threshold`.
//!
//! Retrieving K then picking the best (instead of asking for one) keeps the
//! store's query contract open to re-ranking later without changing its
//! shape. Ties at identical best similarity go to whichever entry the index
//! returned first; index order is not guaranteed stable for entries added
//! concurrently, and ties at floating-point equality are vanishingly rare
//! with real embeddings.
//!
//! An empty store or a below-threshold best candidate is `Ok(None)` — a
//! normal outcome, not an error. The lookup path and the storage path embed
//! through the identical normalize-then-embed sequence, which is what
//! guarantees a just-stored query re-hits its own entry.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::QueryError;
use crate::normalizer::normalize;
use crate::vector_store::{SimilarityMatch, VectorStore};

/// Fixed candidate count retrieved per lookup.
pub const TOP_K: usize = 5;

/// Similarity gate over the vector store.
///
/// Clones share the same embedder and store.
#[derive(Clone)]
pub struct SimilarityCache {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<RwLock<dyn VectorStore>>,
}

impl SimilarityCache {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<RwLock<dyn VectorStore>>) -> Self {
        Self { embedder, store }
    }

    /// Embed `query` exactly the way a lookup would.
    ///
    /// The cache writer reuses this so that lookups and stores can never
    /// drift apart on normalization.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>, QueryError> {
        Ok(self.embedder.embed(&normalize(query))?)
    }

    /// Find the best cached answer for `query`, if one clears `threshold`.
    ///
    /// # Parameters
    /// - `query`: raw query text as submitted.
    /// - `threshold`: minimum cosine similarity in `[0, 1]` for a hit.
    ///
    /// # Returns
    /// `Ok(Some(match))` on a hit, `Ok(None)` on a miss or empty store.
    pub async fn lookup(
        &self,
        query: &str,
        threshold: f32,
    ) -> Result<Option<SimilarityMatch>, QueryError> {
        let embedding = self.embed_query(query)?;

        let candidates = self.store.read().await.query(&embedding, TOP_K)?;
        for (rank, candidate) in candidates.iter().enumerate() {
            debug!(
                rank = rank + 1,
                query = %candidate.entry.original_query_text,
                similarity = candidate.similarity,
                "lookup candidate"
            );
        }

        // First-wins on ties: strictly-greater comparison keeps the earliest
        // of equally similar candidates.
        let mut best: Option<SimilarityMatch> = None;
        for candidate in candidates {
            let better = match &best {
                Some(current) => candidate.similarity > current.similarity,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }

        match best {
            Some(m) if m.similarity >= threshold => {
                debug!(similarity = m.similarity, "cache hit");
                Ok(Some(m))
            }
            Some(m) => {
                debug!(best = m.similarity, threshold, "no candidate above threshold");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
