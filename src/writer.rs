//! # Cache writer
//!
//! Persists the outcome of one cold-path query: every scraped page becomes a
//! [`CacheEntry`] addressable by the *query's* embedding.
//!
//! The query is embedded once — through the identical normalize-then-embed
//! path the similarity cache uses for lookups — and that single vector is
//! shared by every page in the batch. The cache indexes by query semantics,
//! not per-page semantics; this is an explicit simplification, not an
//! accident.
//!
//! Per-entry storage failures are collected into the returned report while
//! the writer keeps going with the remaining entries, matching the scrape
//! pipeline's per-URL isolation policy.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::SimilarityCache;
use crate::error::{QueryError, StoreError};
use crate::scrape::ScrapedPage;
use crate::vector_store::{CacheEntry, VectorStore, entry_id_for_url};

/// A scraped page plus its (possibly sentinel) summary, ready to persist.
#[derive(Debug, Clone)]
pub struct SummarizedPage {
    pub page: ScrapedPage,
    pub summary: String,
}

/// One entry that could not be stored.
#[derive(Debug)]
pub struct StoreFailure {
    pub url: String,
    pub error: StoreError,
}

/// Outcome of one store batch: how many entries landed, and which failed.
#[derive(Debug, Default)]
pub struct StoreReport {
    pub stored: usize,
    pub failures: Vec<StoreFailure>,
}

/// Writes (query, page) pairs into the vector store.
pub struct CacheWriter {
    cache: SimilarityCache,
    store: Arc<RwLock<dyn VectorStore>>,
}

impl CacheWriter {
    /// `cache` supplies the normalize+embed path; `store` receives the
    /// entries. Both are shared handles onto the composed pipeline's state.
    pub fn new(cache: SimilarityCache, store: Arc<RwLock<dyn VectorStore>>) -> Self {
        Self { cache, store }
    }

    /// Upsert one [`CacheEntry`] per page under `query`'s embedding.
    ///
    /// # Errors
    /// Only embedding the query can fail the whole batch; individual entry
    /// failures are reported in [`StoreReport::failures`] and never abort
    /// the remaining entries.
    pub async fn store(
        &self,
        query: &str,
        pages: &[SummarizedPage],
    ) -> Result<StoreReport, QueryError> {
        // One embedding for the whole batch.
        let embedding = self.cache.embed_query(query)?;

        let mut report = StoreReport::default();
        let mut store = self.store.write().await;

        for page in pages {
            let entry = CacheEntry {
                entry_id: entry_id_for_url(&page.page.url),
                embedding: embedding.clone(),
                original_query_text: query.to_string(),
                summary_text: page.summary.clone(),
                source_url: page.page.url.clone(),
                document_text: page.page.extracted_text.clone(),
            };

            match store.upsert(entry) {
                Ok(()) => {
                    info!(url = %page.page.url, "stored cache entry");
                    report.stored += 1;
                }
                Err(error) => {
                    warn!(url = %page.page.url, %error, "failed to store entry, continuing");
                    report.failures.push(StoreFailure {
                        url: page.page.url.clone(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, TokenHashEmbedder};
    use crate::vector_store::HnswStore;
    use chrono::Utc;

    const DIM: usize = 32;

    fn harness() -> (CacheWriter, SimilarityCache, Arc<RwLock<HnswStore>>) {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TokenHashEmbedder::new(DIM));
        let store = Arc::new(RwLock::new(HnswStore::new(DIM)));
        let cache = SimilarityCache::new(embedder, store.clone());
        let writer = CacheWriter::new(cache.clone(), store.clone());
        (writer, cache, store)
    }

    fn page(url: &str, text: &str) -> SummarizedPage {
        SummarizedPage {
            page: ScrapedPage {
                url: url.to_string(),
                extracted_text: text.to_string(),
                fetched_at: Utc::now(),
            },
            summary: format!("summary of {url}"),
        }
    }

    #[tokio::test]
    async fn stores_one_entry_per_page() {
        let (writer, _cache, store) = harness();
        let pages = vec![
            page("https://a.example/one", "text one"),
            page("https://b.example/two", "text two"),
            page("https://c.example/three", "text three"),
        ];

        let report = writer.store("top bookshops in paris", &pages).await.unwrap();
        assert_eq!(report.stored, 3);
        assert!(report.failures.is_empty());
        assert_eq!(store.read().await.len(), 3);
    }

    #[tokio::test]
    async fn stored_batch_is_rehittable_by_the_same_query() {
        let (writer, cache, _store) = harness();
        let pages = vec![page("https://a.example/one", "text one")];
        writer.store("top bookshops in paris", &pages).await.unwrap();

        let hit = cache
            .lookup("top bookshops in paris", 1.0)
            .await
            .unwrap()
            .expect("a stored query must re-hit its own entry");
        assert_eq!(hit.entry.original_query_text, "top bookshops in paris");
        assert_eq!(hit.entry.source_url, "https://a.example/one");
        assert_eq!(hit.entry.summary_text, "summary of https://a.example/one");
    }

    #[tokio::test]
    async fn per_entry_failure_is_isolated_and_reported() {
        let (writer, _cache, store) = harness();
        let pages = vec![
            page("https://a.example/one", "text one"),
            page("", "orphaned text"),
            page("https://c.example/three", "text three"),
        ];

        let report = writer.store("some query", &pages).await.unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            StoreError::MissingField("source_url")
        ));
        assert_eq!(store.read().await.len(), 2);
    }

    #[tokio::test]
    async fn rescraping_a_url_replaces_its_entry() {
        let (writer, _cache, store) = harness();
        writer
            .store("first query", &[page("https://a.example/one", "old text")])
            .await
            .unwrap();
        writer
            .store("second query", &[page("https://a.example/one", "new text")])
            .await
            .unwrap();

        assert_eq!(store.read().await.len(), 1, "same url must upsert");
    }
}
