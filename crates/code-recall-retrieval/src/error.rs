//! Retrieval-layer error taxonomy.
//!
//! Nothing here panics past the component boundary: every manager operation
//! returns one of these, and the manager additionally records the message of
//! the last initialization failure for UI-style callers.

use code_recall_storage::StoreError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::provider::EmbedError;

/// Errors surfaced by the retrieval manager.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Provider or store construction failed; recoverable, retried on the
    /// next call.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A required collaborator was declared unavailable at startup.
    #[error("missing capability: {reason}")]
    MissingCapability { reason: String },

    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The embedding provider failed while encoding.
    #[error(transparent)]
    Embedding(#[from] EmbedError),

    /// The dataset manifest could not be loaded during cold-start ingestion.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The collection store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
