//! Lazily-initialized retrieval manager.
//!
//! An explicit service object: the application's composition root constructs
//! one `RetrievalManager` and passes it by reference to every caller. There
//! is no process-wide singleton and no implicit global state.
//!
//! # Lifecycle
//! `Uninitialized → Ready` on the first successful call, or
//! `Uninitialized → Failed` with a recorded error message. Failed is not
//! sticky: the next call re-attempts initialization, since a missing
//! collaborator or a transient path problem may have been fixed in between.
//! A single `parking_lot::Mutex` guards initialization, so concurrent first
//! calls construct the embedding provider at most once; re-entrant calls
//! block until initialization settles.
//!
//! # Cold start
//! On first initialization the manager opens the collection store and either
//! rebuilds the collection from its backup ledger (if one exists on disk) or
//! creates the collection and ingests the dataset: manifest entries are
//! loaded, descriptions are encoded in fixed-size batches, and each batch is
//! stored with its metadata in order — embedding/metadata pairing is never
//! shuffled.

use std::sync::Arc;

use code_recall_core::{CollectionSchema, SearchResult};
use code_recall_storage::{CollectionStore, RebuildReport};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::error::RetrievalError;
use crate::ingest;
use crate::provider::{CapabilityStatus, EmbeddingProvider, ProviderFactory};

struct ManagerInner {
    provider: Arc<dyn EmbeddingProvider>,
    store: CollectionStore,
}

#[derive(Default)]
struct ManagerState {
    inner: Option<ManagerInner>,
    last_error: Option<String>,
}

/// Retrieval service: lazy initialization, cold-start ingestion, and a
/// single `query(prompt, k)` entry point.
pub struct RetrievalManager {
    config: RetrievalConfig,
    capabilities: CapabilityStatus,
    provider_factory: ProviderFactory,
    state: Mutex<ManagerState>,
}

impl RetrievalManager {
    /// Build a manager from its collaborators. Nothing is initialized yet;
    /// the first `query` or `ensure_initialized` call does the work.
    pub fn new(
        config: RetrievalConfig,
        capabilities: CapabilityStatus,
        provider_factory: ProviderFactory,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self {
            config,
            capabilities,
            provider_factory,
            state: Mutex::new(ManagerState::default()),
        })
    }

    /// Initialize if not already initialized.
    ///
    /// On failure the error message is recorded (see `last_error`) and the
    /// manager stays uninitialized; the next call retries.
    pub fn ensure_initialized(&self) -> Result<(), RetrievalError> {
        let mut state = self.state.lock();
        self.init_locked(&mut state)
    }

    /// True once initialization has succeeded and `unload` has not been
    /// called since.
    pub fn is_ready(&self) -> bool {
        self.state.lock().inner.is_some()
    }

    /// The recorded message of the most recent initialization failure.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Embed the prompt and return the top-k matches from the collection.
    ///
    /// Ensures initialization first; never panics past this boundary. The
    /// returned error's `Display` is the reportable message.
    pub fn query(&self, prompt: &str, k: usize) -> Result<Vec<SearchResult>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let mut state = self.state.lock();
        self.init_locked(&mut state)?;
        let Some(inner) = state.inner.as_ref() else {
            return Err(RetrievalError::Initialization(
                "initialization did not produce a ready state".to_string(),
            ));
        };

        let vectors = inner.provider.encode(&[prompt.to_string()])?;
        let Some(query_vector) = vectors.into_iter().next() else {
            return Err(RetrievalError::Initialization(
                "embedding provider returned no vector for the prompt".to_string(),
            ));
        };

        Ok(inner
            .store
            .search(&self.config.collection_name, &query_vector, k, false)?)
    }

    /// Rebuild the collection from its backup ledger.
    ///
    /// Recovery entry point; safe to run repeatedly (replay upserts by id).
    pub fn rebuild(&self) -> Result<RebuildReport, RetrievalError> {
        let mut state = self.state.lock();
        self.init_locked(&mut state)?;
        let Some(inner) = state.inner.as_ref() else {
            return Err(RetrievalError::Initialization(
                "initialization did not produce a ready state".to_string(),
            ));
        };
        Ok(inner.store.rebuild_from_disk()?)
    }

    /// Close the store and drop the provider, returning the manager to the
    /// uninitialized state. Safe to call multiple times.
    pub fn unload(&self) {
        let mut state = self.state.lock();
        if let Some(inner) = state.inner.take() {
            inner.store.close();
            info!("retrieval manager unloaded");
        }
    }

    fn init_locked(&self, state: &mut ManagerState) -> Result<(), RetrievalError> {
        if state.inner.is_some() {
            return Ok(());
        }
        match self.build_inner() {
            Ok(inner) => {
                state.inner = Some(inner);
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "retrieval manager initialization failed");
                state.last_error = Some(message);
                Err(e)
            }
        }
    }

    fn build_inner(&self) -> Result<ManagerInner, RetrievalError> {
        if let CapabilityStatus::Missing { reason } = &self.capabilities {
            return Err(RetrievalError::MissingCapability {
                reason: reason.clone(),
            });
        }

        let provider = (self.provider_factory)()
            .map_err(|e| RetrievalError::Initialization(e.to_string()))?;
        if provider.dimension() != self.config.embedding_dimension {
            return Err(RetrievalError::Initialization(format!(
                "embedding provider produces {}-dimensional vectors, configuration expects {}",
                provider.dimension(),
                self.config.embedding_dimension
            )));
        }

        let store = CollectionStore::open(&self.config.backup_root)?;

        let collection = self.config.collection_name.as_str();
        if store.has_backup(collection) {
            let report = store.rebuild_from_disk()?;
            info!(
                collection,
                records = report.total_records(),
                "restored collection from backup ledger"
            );
        } else {
            self.cold_start(&provider, &store)?;
        }

        Ok(ManagerInner { provider, store })
    }

    /// First-run ingestion: create the collection and feed it the dataset.
    fn cold_start(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
        store: &CollectionStore,
    ) -> Result<(), RetrievalError> {
        let schema = CollectionSchema::new(
            self.config.collection_name.clone(),
            self.config.embedding_dimension,
            self.config.vector_name.clone(),
            self.config.distance_metric,
        );
        store.create_collection(schema)?;

        let manifest = ingest::load_manifest(&self.config.dataset_manifest)?;
        let items = ingest::load_entries(&manifest, &self.config.dataset_base_dir);

        let mut ingested = 0;
        for chunk in items.chunks(self.config.ingest_batch_size) {
            let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();
            let embeddings = provider.encode(&texts)?;
            let metadata = chunk.iter().map(|item| item.metadata.clone()).collect();

            ingested += store
                .add_data(&self.config.collection_name, embeddings, metadata, true)?
                .len();
        }

        info!(
            collection = %self.config.collection_name,
            ingested,
            "cold-start ingestion complete"
        );
        Ok(())
    }
}
