//! Collection store: one consistent API over the vector index and the
//! backup ledger.
//!
//! # Failure semantics
//! - `create_collection` writes the index schema first, then the ledger
//!   metadata. A ledger failure after index success surfaces as
//!   `PartialCreate`; retrying the whole call is safe because index creation
//!   is idempotent.
//! - `add_data` writes the index first, then appends to the ledger. An
//!   index-only write is recoverable (the caller can re-add), whereas a
//!   ledger-only write would be silently unqueryable. A crash between the two
//!   steps leaves the index ahead of the ledger; `rebuild_from_disk` is the
//!   reconciliation path.

use std::collections::BTreeMap;
use std::path::Path;

use code_recall_core::{CollectionSchema, MetadataMap, Record, SearchResult};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::index::{CollectionInfo, IndexError, VectorIndex};
use crate::ledger::{BackupLedger, LedgerError};

/// Replay chunk size during rebuild: bounds memory without changing results.
const REBUILD_BATCH: usize = 256;

/// Errors from collection store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `embeddings` and `metadata_list` lengths disagree; the whole batch is
    /// rejected and nothing is written.
    #[error("batch size mismatch: {embeddings} embeddings but {metadata} metadata entries")]
    BatchSizeMismatch { embeddings: usize, metadata: usize },

    /// The index schema was created but the ledger metadata write failed.
    /// Retryable: calling `create_collection` again re-attempts only the
    /// ledger write (index creation is idempotent).
    #[error("collection '{name}' created in index but ledger metadata write failed: {source}")]
    PartialCreate {
        name: String,
        #[source]
        source: LedgerError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Per-collection replay counts from `rebuild_from_disk`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Collection name -> number of records replayed into the index.
    pub collections: BTreeMap<String, usize>,
}

impl RebuildReport {
    /// Total records replayed across all collections.
    pub fn total_records(&self) -> usize {
        self.collections.values().sum()
    }
}

/// Vector index + backup ledger behind a single API.
pub struct CollectionStore {
    index: VectorIndex,
    ledger: BackupLedger,
}

impl CollectionStore {
    /// Open a store whose backups live under `backup_root`.
    pub fn open(backup_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            index: VectorIndex::new(),
            ledger: BackupLedger::open(backup_root)?,
        })
    }

    /// Create a collection in the index, then persist its metadata file.
    ///
    /// Idempotent for an identical schema. Returns the stored schema.
    pub fn create_collection(
        &self,
        schema: CollectionSchema,
    ) -> Result<CollectionSchema, StoreError> {
        let stored = self.index.create_collection(schema)?;
        self.ledger
            .write_metadata(&stored)
            .map_err(|source| StoreError::PartialCreate {
                name: stored.collection_name.clone(),
                source,
            })?;
        Ok(stored)
    }

    /// Insert a batch of embeddings with their metadata.
    ///
    /// Assigns a fresh unique id to every record, writes the index first,
    /// then — when `backup` is set — appends to the ledger. Returns the
    /// assigned ids in input order.
    ///
    /// A ledger append failure is surfaced after the index write; the index
    /// entries are not rolled back (see module docs for the recovery story).
    pub fn add_data(
        &self,
        collection: &str,
        embeddings: Vec<Vec<f32>>,
        metadata_list: Vec<MetadataMap>,
        backup: bool,
    ) -> Result<Vec<Uuid>, StoreError> {
        if embeddings.len() != metadata_list.len() {
            return Err(StoreError::BatchSizeMismatch {
                embeddings: embeddings.len(),
                metadata: metadata_list.len(),
            });
        }

        let records: Vec<Record> = embeddings
            .into_iter()
            .zip(metadata_list)
            .map(|(embedding, metadata)| Record::new(embedding, metadata))
            .collect();

        let inserted = self.index.add(collection, &records)?;
        if backup {
            self.ledger.append(collection, &records)?;
        }

        info!(collection, inserted, backup, "added records");
        Ok(records.iter().map(|r| r.id).collect())
    }

    /// Reconstruct every backed-up collection from the ledger.
    ///
    /// For each collection with a metadata file: recreate the index schema,
    /// then replay all ledger records into the index in chunks, preserving
    /// the persisted record ids and never re-appending to the ledger.
    /// Replay upserts by id, so rebuilding twice yields the same record set
    /// as rebuilding once. Collections without a metadata file are skipped.
    pub fn rebuild_from_disk(&self) -> Result<RebuildReport, StoreError> {
        let mut report = RebuildReport::default();

        for name in self.ledger.list_collections()? {
            let schema = match self.ledger.read_metadata(&name) {
                Ok(schema) => schema,
                Err(LedgerError::MetadataMissing { .. }) => {
                    warn!(collection = %name, "skipping rebuild: no metadata file");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.index.create_collection(schema)?;

            let mut replayed = 0;
            let mut batch = Vec::with_capacity(REBUILD_BATCH);
            for record in self.ledger.read_all(&name)? {
                batch.push(record?);
                if batch.len() == REBUILD_BATCH {
                    replayed += self.index.add(&name, &batch)?;
                    batch.clear();
                }
            }
            if !batch.is_empty() {
                replayed += self.index.add(&name, &batch)?;
            }

            info!(collection = %name, replayed, "rebuilt collection from ledger");
            report.collections.insert(name, replayed);
        }
        Ok(report)
    }

    /// Top-k search over one collection. See `VectorIndex::search` for the
    /// ordering contract.
    pub fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        with_vectors: bool,
    ) -> Result<Vec<SearchResult>, StoreError> {
        Ok(self.index.search(collection, query, k, with_vectors)?)
    }

    /// Schema and record count for a collection.
    pub fn info(&self, collection: &str) -> Result<CollectionInfo, StoreError> {
        Ok(self.index.info(collection)?)
    }

    /// True if the collection is live in the index.
    pub fn contains(&self, collection: &str) -> bool {
        self.index.contains(collection)
    }

    /// True if the collection has a backup on disk (metadata file present).
    pub fn has_backup(&self, collection: &str) -> bool {
        self.ledger.has_metadata(collection)
    }

    /// Number of records persisted in the collection's ledger.
    pub fn backup_record_count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.ledger.record_count(collection)?)
    }

    /// Release the ledger's writer handles. Safe to call multiple times.
    pub fn close(&self) {
        self.ledger.close();
    }
}
