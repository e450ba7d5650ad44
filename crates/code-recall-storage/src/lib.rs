//! Storage layer for the code-recall vector store.
//!
//! # Architecture
//! - `serialization`: JSON for collection metadata, MessagePack for ledger
//!   records, framing constants for the append-only log
//! - `ledger`: append-only, per-collection backup log — the durable source of
//!   truth for disaster recovery
//! - `index`: in-memory exact nearest-neighbor engine — a derived, rebuildable
//!   cache over the ledger
//! - `store`: composes index + ledger behind one consistent API, including
//!   `rebuild_from_disk`
//!
//! # Consistency model
//! Writes go to the index first, then the ledger. A crash between the two
//! steps can leave the index ahead of the ledger; `rebuild_from_disk` replays
//! the ledger into a fresh index and is the reconciliation path.

pub mod index;
pub mod ledger;
pub mod serialization;
pub mod store;

pub use index::{CollectionInfo, IndexError, VectorIndex};
pub use ledger::{BackupLedger, LedgerError, LedgerReader};
pub use serialization::SerializationError;
pub use store::{CollectionStore, RebuildReport, StoreError};
