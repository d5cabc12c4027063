//! # Request orchestrator
//!
//! Sequences one query end-to-end:
//!
//! ```text
//! classifier ──reject──▶ error (fail closed)
//!     │accept
//! similarity cache ──hit──▶ cached answer (unless forced)
//!     │miss / forced
//! scrape pipeline ──empty──▶ "no usable results"
//!     │pages
//! summarize each page ──▶ cache writer persists ──▶ fresh answers
//! ```
//!
//! Each query runs in one task end-to-end; the only shared mutable state
//! underneath is the vector store, reached through the cache and the writer.
//! Every collaborator is an injected trait object, so the sequencing logic
//! tests against fakes without any network.

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::SimilarityCache;
use crate::classifier::{Classifier, Verdict};
use crate::error::{ClassifierError, QueryError};
use crate::scrape::SearchPipeline;
use crate::summarizer::Summarizer;
use crate::vector_store::SimilarityMatch;
use crate::writer::{CacheWriter, StoreReport, SummarizedPage};

/// One freshly scraped-and-summarized answer.
#[derive(Debug, Clone)]
pub struct FreshAnswer {
    pub url: String,
    pub summary: String,
}

/// What a handled query produced.
#[derive(Debug)]
pub enum QueryOutcome {
    /// A previously computed answer cleared the similarity threshold.
    Cached(SimilarityMatch),
    /// The cold path ran; answers are fresh and now persisted.
    Fresh {
        answers: Vec<FreshAnswer>,
        report: StoreReport,
    },
}

/// The composed pipeline for handling queries.
pub struct QueryEngine {
    classifier: Arc<dyn Classifier>,
    cache: SimilarityCache,
    pipeline: Arc<dyn SearchPipeline>,
    summarizer: Arc<dyn Summarizer>,
    writer: CacheWriter,
    threshold: f32,
    max_results: usize,
}

impl QueryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<dyn Classifier>,
        cache: SimilarityCache,
        pipeline: Arc<dyn SearchPipeline>,
        summarizer: Arc<dyn Summarizer>,
        writer: CacheWriter,
        threshold: f32,
        max_results: usize,
    ) -> Self {
        Self {
            classifier,
            cache,
            pipeline,
            summarizer,
            writer,
            threshold,
            max_results,
        }
    }

    /// Handle one query.
    ///
    /// # Parameters
    /// - `query`: raw query text.
    /// - `force`: bypass the cache lookup and take the cold path even if a
    ///   similar answer exists. Stored data is never altered by the bypass
    ///   itself, only by the usual upsert at the end.
    ///
    /// # Errors
    /// - [`QueryError::Rejected`] / [`QueryError::ClassifierUnavailable`]:
    ///   the gate said no, or the gate was down — both keep the query out.
    /// - [`QueryError::NoUsableResults`]: the cold path found nothing;
    ///   terminal for this query, not retried.
    pub async fn handle(&self, query: &str, force: bool) -> Result<QueryOutcome, QueryError> {
        match self.classifier.classify(query).await {
            Ok(Verdict::Accept) => debug!("query accepted by classifier"),
            Ok(Verdict::Reject) => return Err(QueryError::Rejected),
            Err(ClassifierError::Unavailable(msg)) => {
                return Err(QueryError::ClassifierUnavailable(msg));
            }
        }

        if !force {
            if let Some(hit) = self.cache.lookup(query, self.threshold).await? {
                info!(
                    similarity = hit.similarity,
                    cached_query = %hit.entry.original_query_text,
                    "serving cached answer"
                );
                return Ok(QueryOutcome::Cached(hit));
            }
        } else {
            debug!("cache bypass forced");
        }

        let pages = self.pipeline.run(query, self.max_results).await?;
        if pages.is_empty() {
            return Err(QueryError::NoUsableResults);
        }
        info!(pages = pages.len(), "scrape pipeline returned pages");

        let mut summarized = Vec::with_capacity(pages.len());
        for page in pages {
            let summary = self.summarizer.summarize(&page.extracted_text).await;
            summarized.push(SummarizedPage { page, summary });
        }

        // Persist before answering, so an identical follow-up query hits.
        let report = self.writer.store(query, &summarized).await?;
        if !report.failures.is_empty() {
            info!(
                stored = report.stored,
                failed = report.failures.len(),
                "batch stored with partial failures"
            );
        }

        let answers = summarized
            .into_iter()
            .map(|p| FreshAnswer {
                url: p.page.url,
                summary: p.summary,
            })
            .collect();

        Ok(QueryOutcome::Fresh { answers, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, TokenHashEmbedder};
    use crate::scrape::ScrapedPage;
    use crate::vector_store::{HnswStore, VectorStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    const DIM: usize = 32;

    struct StaticClassifier(Result<Verdict, ()>);

    #[async_trait]
    impl Classifier for StaticClassifier {
        async fn classify(&self, _query: &str) -> Result<Verdict, ClassifierError> {
            self.0
                .map_err(|_| ClassifierError::Unavailable("gate down".to_string()))
        }
    }

    struct CountingPipeline {
        calls: AtomicUsize,
        pages: Vec<ScrapedPage>,
    }

    impl CountingPipeline {
        fn returning(pages: Vec<ScrapedPage>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                pages,
            })
        }
    }

    #[async_trait]
    impl SearchPipeline for CountingPipeline {
        async fn run(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<ScrapedPage>, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.clone())
        }
    }

    struct StaticSummarizer;

    #[async_trait]
    impl Summarizer for StaticSummarizer {
        async fn summarize(&self, _text: &str) -> String {
            "A fixed summary.".to_string()
        }
    }

    fn pages(urls: &[&str]) -> Vec<ScrapedPage> {
        urls.iter()
            .map(|url| ScrapedPage {
                url: url.to_string(),
                extracted_text: format!("text behind {url}"),
                fetched_at: Utc::now(),
            })
            .collect()
    }

    struct Harness {
        engine: QueryEngine,
        pipeline: Arc<CountingPipeline>,
        store: Arc<RwLock<HnswStore>>,
    }

    fn harness(verdict: Result<Verdict, ()>, pipeline_pages: Vec<ScrapedPage>) -> Harness {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TokenHashEmbedder::new(DIM));
        let store = Arc::new(RwLock::new(HnswStore::new(DIM)));
        let cache = SimilarityCache::new(embedder, store.clone());
        let writer = CacheWriter::new(cache.clone(), store.clone());
        let pipeline = CountingPipeline::returning(pipeline_pages);

        let engine = QueryEngine::new(
            Arc::new(StaticClassifier(verdict)),
            cache.clone(),
            pipeline.clone(),
            Arc::new(StaticSummarizer),
            writer,
            0.72,
            6,
        );

        Harness {
            engine,
            pipeline,
            store,
        }
    }

    #[tokio::test]
    async fn rejected_query_never_reaches_the_pipeline() {
        let h = harness(Ok(Verdict::Reject), pages(&["https://a.example"]));

        let result = h.engine.handle("delete all my files", false).await;
        assert!(matches!(result, Err(QueryError::Rejected)));
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.read().await.is_empty());
    }

    #[tokio::test]
    async fn classifier_outage_fails_closed_but_distinguishably() {
        let h = harness(Err(()), pages(&["https://a.example"]));

        let result = h.engine.handle("top bookshops in paris", false).await;
        assert!(matches!(result, Err(QueryError::ClassifierUnavailable(_))));
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cold_path_summarizes_stores_then_answers() {
        let h = harness(
            Ok(Verdict::Accept),
            pages(&["https://a.example/one", "https://b.example/two"]),
        );

        let outcome = h.engine.handle("top bookshops in paris", false).await.unwrap();
        let QueryOutcome::Fresh { answers, report } = outcome else {
            panic!("expected fresh outcome on an empty cache");
        };
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().all(|a| a.summary == "A fixed summary."));
        assert_eq!(report.stored, 2);
        assert_eq!(h.store.read().await.len(), 2);

        // The follow-up identical query is now a cache hit.
        let outcome = h.engine.handle("top bookshops in paris", false).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Cached(_)));
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rephrased_query_hits_the_first_querys_answer() {
        let h = harness(Ok(Verdict::Accept), pages(&["https://a.example/one"]));

        h.engine.handle("top bookshops in paris", false).await.unwrap();
        let outcome = h.engine.handle("best bookstores paris", false).await.unwrap();

        let QueryOutcome::Cached(hit) = outcome else {
            panic!("synonym-folded rephrasing must hit the cache");
        };
        assert_eq!(hit.entry.original_query_text, "top bookshops in paris");
        assert!(hit.similarity >= 0.72);
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_bypasses_the_cache_without_altering_it() {
        let h = harness(Ok(Verdict::Accept), pages(&["https://a.example/one"]));

        h.engine.handle("top bookshops in paris", false).await.unwrap();
        assert_eq!(h.store.read().await.len(), 1);

        let outcome = h.engine.handle("top bookshops in paris", true).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Fresh { .. }));
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 2);
        // Same URL scraped again upserts the same entry.
        assert_eq!(h.store.read().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_pipeline_is_terminal_and_writer_is_never_invoked() {
        let h = harness(Ok(Verdict::Accept), Vec::new());

        let result = h.engine.handle("top bookshops in paris", false).await;
        assert!(matches!(result, Err(QueryError::NoUsableResults)));
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 1);
        assert!(h.store.read().await.is_empty());

        // Nothing was cached, so the next attempt takes the cold path again.
        let _ = h.engine.handle("top bookshops in paris", false).await;
        assert_eq!(h.pipeline.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn partial_scrape_batch_is_still_stored() {
        // Four of five URLs survived the pipeline; all four must land.
        let h = harness(
            Ok(Verdict::Accept),
            pages(&[
                "https://a.example/1",
                "https://b.example/2",
                "https://c.example/3",
                "https://d.example/4",
            ]),
        );

        let outcome = h.engine.handle("top bookshops in paris", false).await.unwrap();
        let QueryOutcome::Fresh { report, .. } = outcome else {
            panic!("expected fresh outcome");
        };
        assert_eq!(report.stored, 4);
        assert_eq!(h.store.read().await.len(), 4);
    }
}
