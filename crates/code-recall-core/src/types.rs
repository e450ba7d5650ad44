//! Core types for collections, records and search results.
//!
//! # Serialization Strategy
//! - `CollectionSchema` serializes to the on-disk collection metadata JSON;
//!   field names are part of the file format and must not change.
//! - `DistanceMetric` serializes as `"COSINE" | "DOT" | "EUCLIDEAN"`.
//! - `Record` metadata is an open `serde_json` map the caller controls; in
//!   this domain it carries `id`, `category`, `subcategory` and the code
//!   template text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque, caller-controlled record metadata (string keys, JSON values).
pub type MetadataMap = serde_json::Map<String, serde_json::Value>;

/// Distance metric used to rank search results within a collection.
///
/// Cosine and Dot are similarity metrics (higher is better); Euclidean is a
/// distance metric (lower is better). The metric is fixed at collection
/// creation and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclidean,
}

impl DistanceMetric {
    /// True if larger scores mean better matches (Cosine, Dot).
    pub fn is_similarity(&self) -> bool {
        matches!(self, DistanceMetric::Cosine | DistanceMetric::Dot)
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::Dot => "DOT",
            DistanceMetric::Euclidean => "EUCLIDEAN",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceMetric {
    type Err = SchemaValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COSINE" => Ok(DistanceMetric::Cosine),
            "DOT" => Ok(DistanceMetric::Dot),
            "EUCLIDEAN" => Ok(DistanceMetric::Euclidean),
            other => Err(SchemaValidationError::UnknownMetric {
                metric: other.to_string(),
            }),
        }
    }
}

/// Validation errors for collection schemas.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaValidationError {
    /// Collection name must be non-empty.
    #[error("collection name must not be empty")]
    EmptyName,

    /// Embedding dimension must be a positive integer.
    #[error("embedding dimension must be positive (got {dimension})")]
    ZeroDimension { dimension: usize },

    /// Metric string did not match any known metric.
    #[error("unknown distance metric: '{metric}'")]
    UnknownMetric { metric: String },
}

/// Immutable configuration of a named collection.
///
/// Serializes to exactly the collection metadata file format:
///
/// ```json
/// {
///   "collection_name": "...",
///   "embedding_dimension": 768,
///   "vector_name": "...",
///   "distance_metric": "COSINE"
/// }
/// ```
///
/// Once a collection is created, dimension and metric are immutable for that
/// name; re-creation with an identical schema is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Unique collection name.
    pub collection_name: String,
    /// Dimensionality every stored vector must have.
    pub embedding_dimension: usize,
    /// Name of the dense vector field.
    pub vector_name: String,
    /// Ranking metric for this collection.
    pub distance_metric: DistanceMetric,
}

impl CollectionSchema {
    /// Construct a schema. Call `validate()` before persisting it.
    pub fn new(
        collection_name: impl Into<String>,
        embedding_dimension: usize,
        vector_name: impl Into<String>,
        distance_metric: DistanceMetric,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            embedding_dimension,
            vector_name: vector_name.into(),
            distance_metric,
        }
    }

    /// Checks the schema invariants: non-empty name, positive dimension.
    pub fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.collection_name.is_empty() {
            return Err(SchemaValidationError::EmptyName);
        }
        if self.embedding_dimension == 0 {
            return Err(SchemaValidationError::ZeroDimension {
                dimension: self.embedding_dimension,
            });
        }
        Ok(())
    }
}

/// One id + embedding + metadata entry within a collection.
///
/// The id is generated at insert time and immutable. Invariant:
/// `embedding.len()` equals the owning collection's dimension, enforced
/// before any write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub metadata: MetadataMap,
}

impl Record {
    /// Create a record with a freshly generated v4 id.
    pub fn new(embedding: Vec<f32>, metadata: MetadataMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            metadata,
        }
    }
}

/// One ranked hit from a search.
///
/// For Cosine/Dot collections results are ordered score-descending; for
/// Euclidean, score holds the distance and results are ordered ascending.
/// Ties are broken by ascending record id.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: Uuid,
    pub score: f32,
    pub metadata: MetadataMap,
    /// The stored vector, when requested at search time.
    pub vector: Option<Vec<f32>>,
}
