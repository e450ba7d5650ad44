//! Retrieval layer for code-recall.
//!
//! # Architecture
//! - `provider`: the embedding-provider seam (external collaborator) and the
//!   typed capability check
//! - `config`: retrieval configuration (collection, dataset, batch sizes)
//! - `ingest`: pure dataset-ingestion pipeline — manifest to text/metadata
//!   pairs, no embedding, no storage
//! - `manager`: the lazily-initialized `RetrievalManager` service object
//!   exposing `query(prompt, k)`
//!
//! The manager is constructed once by the application's composition root and
//! passed by reference to callers; there is no process-wide singleton.

pub mod config;
pub mod error;
pub mod ingest;
pub mod manager;
pub mod provider;

pub use config::{ConfigError, RetrievalConfig};
pub use error::RetrievalError;
pub use ingest::{load_entries, load_manifest, DatasetManifest, IngestItem, ManifestEntry};
pub use manager::RetrievalManager;
pub use provider::{CapabilityStatus, EmbedError, EmbeddingProvider, ProviderFactory};
