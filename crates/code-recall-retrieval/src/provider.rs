//! Embedding provider seam.
//!
//! Embedding models are external collaborators: this crate defines the
//! contract (text in, fixed-dimension float vectors out) and the typed
//! capability check, but no model implementation.

use std::sync::Arc;

use thiserror::Error;

/// Failure inside an embedding provider, surfaced as a message because
/// provider internals are outside this system's boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("embedding provider failure: {0}")]
pub struct EmbedError(pub String);

impl EmbedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Maps text to fixed-dimension dense vectors.
///
/// The dimension is deterministic per provider and must match the collection
/// schema the provider feeds. Implementations must be `Send + Sync`; encoding
/// a batch returns one vector per input text, in input order.
pub trait EmbeddingProvider: Send + Sync {
    /// The fixed output dimension of this provider.
    fn dimension(&self) -> usize;

    /// Encode a batch of texts. Output order matches input order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Constructs the embedding provider on first use.
///
/// The factory runs at most once per successful manager initialization; a
/// failing factory is retried on the next call (failure is not sticky).
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn EmbeddingProvider>, EmbedError> + Send + Sync>;

/// Typed capability status, evaluated once at startup by the composition
/// root and passed into the manager.
///
/// Replaces ad-hoc probing for optional dependencies: a caller that cannot
/// supply an embedding provider constructs `Missing` with the reason, and the
/// manager reports that reason instead of attempting initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    /// All collaborators needed for retrieval are available.
    Ready,
    /// A required collaborator is unavailable.
    Missing { reason: String },
}

impl CapabilityStatus {
    pub fn missing(reason: impl Into<String>) -> Self {
        CapabilityStatus::Missing {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CapabilityStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    impl EmbeddingProvider for FixedProvider {
        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn provider_is_object_safe() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FixedProvider);
        assert_eq!(provider.dimension(), 2);
        let out = provider.encode(&["hello".to_string()]).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn capability_status_reports_readiness() {
        assert!(CapabilityStatus::Ready.is_ready());
        let missing = CapabilityStatus::missing("no model weights");
        assert!(!missing.is_ready());
        assert_eq!(
            missing,
            CapabilityStatus::Missing {
                reason: "no model weights".to_string()
            }
        );
    }

    #[test]
    fn embed_error_displays_message() {
        let err = EmbedError::new("model crashed");
        assert_eq!(err.to_string(), "embedding provider failure: model crashed");
    }
}
