//! Retrieval configuration.

use std::path::PathBuf;

use code_recall_core::DistanceMetric;
use thiserror::Error;

/// Configuration errors caught before the manager starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("collection name must not be empty")]
    EmptyCollectionName,

    #[error("embedding dimension must be positive")]
    ZeroDimension,

    #[error("ingest batch size must be positive")]
    ZeroBatchSize,
}

/// Default fixed batch size for ingestion-time embedding.
pub const DEFAULT_INGEST_BATCH: usize = 128;

/// Default number of results returned by `query` when callers do not ask for
/// a specific k.
pub const DEFAULT_K: usize = 5;

/// Configuration for the retrieval manager.
///
/// # Defaults
/// - `distance_metric`: Cosine
/// - `embedding_dimension`: 768
/// - `ingest_batch_size`: 128
/// - `default_k`: 5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Collection the manager creates and queries.
    pub collection_name: String,
    /// Dense vector field name within the collection.
    pub vector_name: String,
    /// Dimension the embedding provider must produce.
    pub embedding_dimension: usize,
    /// Ranking metric for the collection.
    pub distance_metric: DistanceMetric,
    /// Root directory of the backup ledger.
    pub backup_root: PathBuf,
    /// Path to the dataset manifest JSON.
    pub dataset_manifest: PathBuf,
    /// Base directory for resolving relative paths in the manifest.
    pub dataset_base_dir: PathBuf,
    /// Fixed batch size for ingestion-time embedding.
    pub ingest_batch_size: usize,
    /// Default k for queries.
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection_name: "code_templates".to_string(),
            vector_name: "template_embeddings".to_string(),
            embedding_dimension: 768,
            distance_metric: DistanceMetric::Cosine,
            backup_root: PathBuf::from("vectorstore/embeddings"),
            dataset_manifest: PathBuf::from("dataset/dataset.json"),
            dataset_base_dir: PathBuf::from("."),
            ingest_batch_size: DEFAULT_INGEST_BATCH,
            default_k: DEFAULT_K,
        }
    }
}

impl RetrievalConfig {
    /// Checks configuration invariants before the manager uses it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_name.is_empty() {
            return Err(ConfigError::EmptyCollectionName);
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        if self.ingest_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RetrievalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest_batch_size, 128);
        assert_eq!(config.default_k, 5);
        assert_eq!(config.distance_metric, DistanceMetric::Cosine);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let mut config = RetrievalConfig::default();
        config.embedding_dimension = 0;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.collection_name.clear();
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.ingest_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
