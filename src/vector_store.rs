//! # Vector store
//!
//! Persistent nearest-neighbor index over cached query answers.
//!
//! This module provides the fixed [`CacheEntry`] record, the [`VectorStore`]
//! trait the rest of the pipeline is written against, and [`HnswStore`], a
//! wrapper around a [HNSW](https://arxiv.org/abs/1603.09320) approximate
//! nearest-neighbor index (`hora` crate).
//!
//! ## Responsibilities
//! - **Indexing**: maintains a HNSW index for ANN queries over entry
//!   embeddings; candidates are re-scored with exact cosine similarity.
//! - **Identity**: entries are addressed by [`entry_id_for_url`], a SHA-256
//!   digest of the normalized source URL, stable across process runs. The
//!   same URL stored twice upserts the same entry.
//! - **Validation**: entries missing required fields are rejected here, at
//!   the storage boundary, rather than trusted from the caller.
//! - **Persistence**: a YAML snapshot of `{dimension, entries}`. Entries own
//!   their embeddings, so the index is rebuilt from the snapshot on load.
//!
//! The store is always an injected dependency (`Arc<RwLock<dyn VectorStore>>`
//! in the composed pipeline), never a process-wide singleton, so tests can
//! substitute instances freely.

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use url::Url;

use crate::error::StoreError;

/// A persisted answer: one scraped page stored under one query's embedding.
///
/// Never mutated in place — a later store of the same URL is a logical
/// replace, implemented as upsert-by-id. Destroyed only by administrative
/// purge of the snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Stable identity, derived from `source_url` via [`entry_id_for_url`].
    pub entry_id: String,
    /// Embedding of the *query* this page answered (not of the page itself).
    pub embedding: Vec<f32>,
    /// The query as originally submitted.
    pub original_query_text: String,
    /// Short factual summary of the page.
    pub summary_text: String,
    /// Where the document came from.
    pub source_url: String,
    /// Full extracted page text.
    pub document_text: String,
}

/// A candidate returned by a similarity query: an entry plus its cosine
/// similarity to the probe, clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    pub entry: CacheEntry,
    pub similarity: f32,
}

/// Nearest-neighbor storage contract.
///
/// Reads are addressed by embedding similarity, writes by URL-derived id.
/// Implementations must keep one fixed dimensionality for their lifetime.
pub trait VectorStore: Send + Sync {
    /// Dimensionality every stored embedding must match.
    fn dimension(&self) -> usize;

    /// Return up to `k` nearest entries to `embedding`, best first.
    ///
    /// An empty store yields an empty vector, never an error.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarityMatch>, StoreError>;

    /// Insert or replace the entry identified by `entry.entry_id`.
    fn upsert(&mut self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive the stable identity for a source URL.
///
/// The URL is canonicalized first (scheme and host lowercased, default
/// ports dropped) so equivalent spellings collide on the same entry; inputs
/// that do not parse as URLs fall back to their trimmed form. The digest is
/// a cryptographic hash, not a platform hash value, so ids are stable
/// across process runs and platforms.
pub fn entry_id_for_url(url: &str) -> String {
    let canonical = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.trim().to_string(),
    };
    sha256::digest(canonical)
}

/// Exact cosine similarity, clamped to `[0, 1]`.
///
/// Zero-norm vectors score 0 against everything.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    entries: &'a HashMap<String, CacheEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    entries: HashMap<String, CacheEntry>,
}

/// HNSW-backed [`VectorStore`].
///
/// The entry map is the source of truth; the index is an acceleration
/// structure over it. HNSW has no in-place delete, so replacing an existing
/// entry rebuilds the index from the map — replacement is the rare path
/// (a URL re-scraped for a fresh answer), so the rebuild cost is accepted.
pub struct HnswStore {
    /// ANN index mapping vectors to slots in `slot_to_id`.
    index: HNSWIndex<f32, usize>,
    dimension: usize,
    /// entry_id → entry; owns all cached data.
    entries: HashMap<String, CacheEntry>,
    /// Internal index slot → entry_id.
    slot_to_id: Vec<String>,
}

impl HnswStore {
    /// Create an empty store for `dimension`-length embeddings.
    pub fn new(dimension: usize) -> Self {
        Self {
            index: HNSWIndex::new(dimension, &HNSWParams::default()),
            dimension,
            entries: HashMap::new(),
            slot_to_id: Vec::new(),
        }
    }

    /// Load a snapshot from `path`, or create an empty store if the file
    /// does not exist yet.
    ///
    /// # Errors
    /// - I/O or YAML failures reading an existing snapshot.
    /// - [`StoreError::DimensionMismatch`] if the snapshot was written with
    ///   a different embedding dimensionality than `dimension`.
    pub fn load_or_create(path: &Path, dimension: usize) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new(dimension));
        }
        let store = Self::load(path)?;
        if store.dimension != dimension {
            return Err(StoreError::DimensionMismatch {
                got: store.dimension,
                want: dimension,
            });
        }
        Ok(store)
    }

    /// Load a snapshot from `path` and rebuild the index from its entries.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let yaml = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_yaml::from_str(&yaml)?;

        for entry in snapshot.entries.values() {
            if entry.embedding.len() != snapshot.dimension {
                return Err(StoreError::DimensionMismatch {
                    got: entry.embedding.len(),
                    want: snapshot.dimension,
                });
            }
        }

        let mut store = Self {
            index: HNSWIndex::new(snapshot.dimension, &HNSWParams::default()),
            dimension: snapshot.dimension,
            entries: snapshot.entries,
            slot_to_id: Vec::new(),
        };
        store.rebuild_index()?;
        debug!(entries = store.entries.len(), "vector store loaded");
        Ok(store)
    }

    /// Write the current entries as a YAML snapshot.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&SnapshotRef {
            dimension: self.dimension,
            entries: &self.entries,
        })?;
        fs::write(path, yaml)?;
        Ok(())
    }

    fn validate(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        if entry.entry_id.is_empty() {
            return Err(StoreError::MissingField("entry_id"));
        }
        if entry.original_query_text.is_empty() {
            return Err(StoreError::MissingField("original_query_text"));
        }
        if entry.source_url.is_empty() {
            return Err(StoreError::MissingField("source_url"));
        }
        if entry.embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                got: entry.embedding.len(),
                want: self.dimension,
            });
        }
        Ok(())
    }

    /// Rebuild the HNSW index from the entry map.
    ///
    /// Slot order follows map iteration and is not stable across rebuilds;
    /// ties at identical similarity therefore resolve to whichever entry the
    /// index happens to return first.
    fn rebuild_index(&mut self) -> Result<(), StoreError> {
        let mut index = HNSWIndex::new(self.dimension, &HNSWParams::default());
        let mut slot_to_id = Vec::with_capacity(self.entries.len());

        for (entry_id, entry) in &self.entries {
            index
                .add(&entry.embedding, slot_to_id.len())
                .map_err(|_| StoreError::Index("add failed"))?;
            slot_to_id.push(entry_id.clone());
        }
        if !slot_to_id.is_empty() {
            index
                .build(Metric::Euclidean)
                .map_err(|_| StoreError::Index("build failed"))?;
        }

        self.index = index;
        self.slot_to_id = slot_to_id;
        Ok(())
    }
}

impl VectorStore for HnswStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarityMatch>, StoreError> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                got: embedding.len(),
                want: self.dimension,
            });
        }
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // Embeddings are L2-normalized, so Euclidean nearest == cosine
        // nearest; candidates still get exact cosine scores.
        let slots = self.index.search(embedding, k);
        let matches = slots
            .into_iter()
            .filter_map(|slot| self.slot_to_id.get(slot))
            .filter_map(|entry_id| self.entries.get(entry_id))
            .map(|entry| SimilarityMatch {
                similarity: cosine_similarity(embedding, &entry.embedding),
                entry: entry.clone(),
            })
            .collect();
        Ok(matches)
    }

    fn upsert(&mut self, entry: CacheEntry) -> Result<(), StoreError> {
        self.validate(&entry)?;

        let entry_id = entry.entry_id.clone();
        if self.entries.insert(entry_id.clone(), entry).is_some() {
            // Logical replace: HNSW can't evict the stale vector, so the
            // index is rebuilt from the surviving entries.
            debug!(%entry_id, "replacing existing entry, rebuilding index");
            self.rebuild_index()?;
        } else {
            let slot = self.slot_to_id.len();
            let embedding = &self.entries[&entry_id].embedding;
            self.index
                .add(embedding, slot)
                .map_err(|_| StoreError::Index("add failed"))?;
            self.index
                .build(Metric::Euclidean)
                .map_err(|_| StoreError::Index("build failed"))?;
            self.slot_to_id.push(entry_id);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(url: &str, query: &str, embedding: Vec<f32>) -> CacheEntry {
        CacheEntry {
            entry_id: entry_id_for_url(url),
            embedding,
            original_query_text: query.to_string(),
            summary_text: "a summary".to_string(),
            source_url: url.to_string(),
            document_text: "a document".to_string(),
        }
    }

    #[test]
    fn entry_ids_are_stable_across_url_spellings() {
        assert_eq!(
            entry_id_for_url("HTTPS://Example.com/path"),
            entry_id_for_url("https://example.com/path"),
        );
        assert_eq!(
            entry_id_for_url("  https://example.com/path  "),
            entry_id_for_url("https://example.com/path"),
        );
        assert_ne!(
            entry_id_for_url("https://example.com/a"),
            entry_id_for_url("https://example.com/b"),
        );
    }

    #[test]
    fn upsert_rejects_missing_fields_at_the_boundary() {
        let mut store = HnswStore::new(4);

        let mut missing_query = entry("https://a.example", "q", vec![1.0, 0.0, 0.0, 0.0]);
        missing_query.original_query_text.clear();
        assert!(matches!(
            store.upsert(missing_query),
            Err(StoreError::MissingField("original_query_text"))
        ));

        let mut missing_url = entry("https://a.example", "q", vec![1.0, 0.0, 0.0, 0.0]);
        missing_url.source_url.clear();
        assert!(matches!(
            store.upsert(missing_url),
            Err(StoreError::MissingField("source_url"))
        ));

        let wrong_dim = entry("https://a.example", "q", vec![1.0, 0.0]);
        assert!(matches!(
            store.upsert(wrong_dim),
            Err(StoreError::DimensionMismatch { got: 2, want: 4 })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn query_on_empty_store_returns_no_match() {
        let store = HnswStore::new(4);
        let matches = store.query(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn query_finds_nearest_with_cosine_score() {
        let mut store = HnswStore::new(4);
        store
            .upsert(entry("https://a.example", "alpha", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store
            .upsert(entry("https://b.example", "beta", vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();

        let matches = store.query(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(matches.len(), 2);
        let best = matches
            .iter()
            .max_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap())
            .unwrap();
        assert_eq!(best.entry.original_query_text, "alpha");
        assert!((best.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn same_url_upserts_instead_of_duplicating() {
        let mut store = HnswStore::new(4);
        store
            .upsert(entry("https://a.example", "first", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store
            .upsert(entry("https://a.example", "second", vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(store.len(), 1);
        let matches = store.query(&[0.0, 1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(matches[0].entry.original_query_text, "second");
    }

    #[test]
    fn snapshot_round_trips_and_rehits_after_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.yaml");

        let mut store = HnswStore::new(4);
        store
            .upsert(entry("https://a.example", "alpha", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store.save(&path).unwrap();

        let reloaded = HnswStore::load_or_create(&path, 4).unwrap();
        assert_eq!(reloaded.len(), 1);
        let matches = reloaded.query(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(matches[0].entry.original_query_text, "alpha");
        assert!((matches[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn load_or_create_rejects_dimension_drift() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.yaml");

        let store = HnswStore::new(4);
        store.save(&path).unwrap();

        assert!(matches!(
            HnswStore::load_or_create(&path, 8),
            Err(StoreError::DimensionMismatch { got: 4, want: 8 })
        ));
    }

    #[test]
    fn cosine_similarity_clamps_and_guards_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[3.0, 0.0], &[7.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
