//! In-memory exact nearest-neighbor index.
//!
//! One searchable structure per collection, keyed by record id so replaying
//! the same record twice upserts instead of duplicating — that property is
//! what makes ledger rebuild idempotent. The index is a derived, rebuildable
//! cache; durability lives in the backup ledger.
//!
//! Search is an exact scan with a precomputed query norm. Exact scoring keeps
//! result ordering fully deterministic (score order, ties broken by ascending
//! record id), which an approximate engine cannot guarantee.
//!
//! # Thread Safety
//! All state sits behind a `parking_lot::RwLock`; the index is `Send + Sync`
//! and can be shared via `Arc`.

use std::collections::HashMap;

use code_recall_core::{
    CollectionSchema, DistanceMetric, MetadataMap, Record, SchemaValidationError, SearchResult,
};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors from vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A collection with this name exists under a different dimension or
    /// metric. Re-creation with an identical schema is a no-op, not an error.
    #[error("collection '{name}' already exists with a different schema \
             (existing: {existing_dimension}D {existing_metric}, \
             requested: {requested_dimension}D {requested_metric})")]
    CollectionExists {
        name: String,
        existing_dimension: usize,
        existing_metric: DistanceMetric,
        requested_dimension: usize,
        requested_metric: DistanceMetric,
    },

    /// Search/add/info against a name that was never created.
    #[error("collection not found: '{name}'")]
    CollectionNotFound { name: String },

    /// A vector in the batch disagrees with the collection dimension.
    /// The whole batch is rejected; nothing is inserted.
    #[error("dimension mismatch in collection '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Caller-supplied argument is invalid (k == 0, bad query vector, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema failed validation at creation time.
    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

/// Schema plus live record count for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub schema: CollectionSchema,
    pub record_count: usize,
}

struct StoredRecord {
    embedding: Vec<f32>,
    metadata: MetadataMap,
}

struct IndexedCollection {
    schema: CollectionSchema,
    records: HashMap<Uuid, StoredRecord>,
}

/// Exact nearest-neighbor index over named collections.
#[derive(Default)]
pub struct VectorIndex {
    collections: RwLock<HashMap<String, IndexedCollection>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection, idempotently.
    ///
    /// Returns the stored schema. If the name already exists with the same
    /// dimension and metric this is a no-op returning the existing
    /// configuration; a conflicting dimension or metric fails with
    /// `IndexError::CollectionExists`.
    pub fn create_collection(
        &self,
        schema: CollectionSchema,
    ) -> Result<CollectionSchema, IndexError> {
        schema.validate()?;

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(&schema.collection_name) {
            let same = existing.schema.embedding_dimension == schema.embedding_dimension
                && existing.schema.distance_metric == schema.distance_metric;
            if same {
                return Ok(existing.schema.clone());
            }
            return Err(IndexError::CollectionExists {
                name: schema.collection_name.clone(),
                existing_dimension: existing.schema.embedding_dimension,
                existing_metric: existing.schema.distance_metric,
                requested_dimension: schema.embedding_dimension,
                requested_metric: schema.distance_metric,
            });
        }

        debug!(
            collection = %schema.collection_name,
            dimension = schema.embedding_dimension,
            metric = %schema.distance_metric,
            "created collection"
        );
        collections.insert(
            schema.collection_name.clone(),
            IndexedCollection {
                schema: schema.clone(),
                records: HashMap::new(),
            },
        );
        Ok(schema)
    }

    /// Insert a batch of records.
    ///
    /// Validates every vector length before touching the collection: any
    /// mismatch rejects the whole batch with `DimensionMismatch` and nothing
    /// is inserted. Re-inserting an existing id upserts. Returns the count
    /// inserted.
    pub fn add(&self, collection: &str, records: &[Record]) -> Result<usize, IndexError> {
        let mut collections = self.collections.write();
        let indexed =
            collections
                .get_mut(collection)
                .ok_or_else(|| IndexError::CollectionNotFound {
                    name: collection.to_string(),
                })?;

        let expected = indexed.schema.embedding_dimension;
        for record in records {
            if record.embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected,
                    actual: record.embedding.len(),
                });
            }
        }

        for record in records {
            indexed.records.insert(
                record.id,
                StoredRecord {
                    embedding: record.embedding.clone(),
                    metadata: record.metadata.clone(),
                },
            );
        }
        debug!(collection, count = records.len(), "indexed records");
        Ok(records.len())
    }

    /// Top-k search.
    ///
    /// Results are ordered score-descending for similarity metrics
    /// (Cosine/Dot) and distance-ascending for Euclidean, with ties broken by
    /// ascending record id. Returns at most `k` results; `k == 0` and query
    /// dimension mismatches fail with `InvalidArgument`.
    pub fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        with_vectors: bool,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let collections = self.collections.read();
        let indexed = collections
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound {
                name: collection.to_string(),
            })?;

        let expected = indexed.schema.embedding_dimension;
        if query.len() != expected {
            return Err(IndexError::InvalidArgument(format!(
                "query vector has dimension {}, collection '{collection}' expects {expected}",
                query.len()
            )));
        }

        let metric = indexed.schema.distance_metric;
        let query_norm = vector_norm(query);

        let mut hits: Vec<SearchResult> = indexed
            .records
            .iter()
            .map(|(id, stored)| SearchResult {
                id: *id,
                score: score(metric, query, query_norm, &stored.embedding),
                metadata: stored.metadata.clone(),
                vector: with_vectors.then(|| stored.embedding.clone()),
            })
            .collect();

        if metric.is_similarity() {
            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        } else {
            hits.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id)));
        }
        hits.truncate(k);
        Ok(hits)
    }

    /// Schema and record count for a collection.
    pub fn info(&self, collection: &str) -> Result<CollectionInfo, IndexError> {
        let collections = self.collections.read();
        let indexed = collections
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        Ok(CollectionInfo {
            schema: indexed.schema.clone(),
            record_count: indexed.records.len(),
        })
    }

    /// True if the collection has been created in this index.
    pub fn contains(&self, collection: &str) -> bool {
        self.collections.read().contains_key(collection)
    }

    /// Names of all live collections, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn vector_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Score a candidate against the query under the collection metric.
///
/// Cosine is the raw cosine in [-1, 1] (exact match scores 1.0); zero-norm
/// vectors score 0.0 rather than dividing by zero. Euclidean returns the
/// distance (lower is better).
fn score(metric: DistanceMetric, query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let candidate_norm = vector_norm(candidate);
            if query_norm < f32::EPSILON || candidate_norm < f32::EPSILON {
                return 0.0;
            }
            let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
            (dot / (query_norm * candidate_norm)).clamp(-1.0, 1.0)
        }
        DistanceMetric::Dot => query.iter().zip(candidate).map(|(a, b)| a * b).sum(),
        DistanceMetric::Euclidean => query
            .iter()
            .zip(candidate)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt(),
    }
}
