//! Append-only backup ledger.
//!
//! One directory per collection under the backup root:
//!
//! ```text
//! <root>/<collection>/collection_metadata.json   written once at creation
//! <root>/<collection>/records.log                append-only record stream
//! ```
//!
//! The log is a versioned, self-describing record stream: a 6-byte header
//! (magic + format version) followed by length-prefixed MessagePack records.
//! Records are only ever appended — never rewritten in place — and replay
//! preserves append order. The ledger is the source of truth for disaster
//! recovery; the vector index is rebuilt from it.
//!
//! Every append flushes and fsyncs before returning.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use code_recall_core::{CollectionSchema, Record};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::serialization::{
    self, SerializationError, LEDGER_HEADER_LEN,
};

/// Collection metadata file name, one per collection.
pub const METADATA_FILE: &str = "collection_metadata.json";

/// Record log file name, one per collection.
pub const RECORDS_FILE: &str = "records.log";

/// Upper bound on a single framed record; anything larger is corruption.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Errors from ledger operations, always carrying the collection name and
/// the operation that failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Disk failure during a ledger operation. Index entries already written
    /// for the same batch are not rolled back; rebuild reconciles.
    #[error("ledger I/O failed for collection '{collection}' during {op}: {source}")]
    Io {
        collection: String,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The log file exists but its contents are not replayable.
    #[error("ledger for collection '{collection}' is corrupt: {detail}")]
    Corrupt { collection: String, detail: String },

    /// No metadata file exists for this collection.
    #[error("no backup metadata for collection '{collection}'")]
    MetadataMissing { collection: String },

    /// Record or schema encoding/decoding failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl LedgerError {
    fn io(collection: &str, op: &'static str, source: std::io::Error) -> Self {
        LedgerError::Io {
            collection: collection.to_string(),
            op,
            source,
        }
    }
}

/// Append-only, per-collection backup store.
///
/// Holds one cached writer handle per collection (single-writer discipline);
/// `close()` drops the handles and is safe to call repeatedly. Reads never go
/// through the cached handles — `read_all` opens the log independently, so the
/// reader is restartable.
pub struct BackupLedger {
    root: PathBuf,
    writers: Mutex<HashMap<String, File>>,
}

impl BackupLedger {
    /// Open a ledger rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| LedgerError::io("<root>", "create root", e))?;
        Ok(Self {
            root,
            writers: Mutex::new(HashMap::new()),
        })
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    fn metadata_path(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).join(METADATA_FILE)
    }

    fn log_path(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).join(RECORDS_FILE)
    }

    /// Overwrite-safe write of the one metadata file per collection.
    ///
    /// Called once at creation; calling again with the same schema is
    /// harmless (the file is replaced atomically, never duplicated).
    pub fn write_metadata(&self, schema: &CollectionSchema) -> Result<(), LedgerError> {
        let name = schema.collection_name.as_str();
        fs::create_dir_all(self.collection_dir(name))
            .map_err(|e| LedgerError::io(name, "create collection dir", e))?;
        serialization::write_schema_json(&self.metadata_path(name), schema)
            .map_err(|e| LedgerError::io(name, "write metadata", e))
    }

    /// True if a metadata file exists for this collection.
    pub fn has_metadata(&self, collection: &str) -> bool {
        self.metadata_path(collection).is_file()
    }

    /// Read the schema back from the metadata file.
    pub fn read_metadata(&self, collection: &str) -> Result<CollectionSchema, LedgerError> {
        let path = self.metadata_path(collection);
        if !path.is_file() {
            return Err(LedgerError::MetadataMissing {
                collection: collection.to_string(),
            });
        }
        Ok(serialization::read_schema_json(&path)?)
    }

    /// Append records to the collection's log, preserving order.
    ///
    /// The log header is written when the file is first created; afterwards
    /// the file is only ever opened in append mode. Flushes and fsyncs before
    /// returning.
    pub fn append(&self, collection: &str, records: &[Record]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut writers = self.writers.lock();
        let file = match writers.entry(collection.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(self.open_writer(collection)?)
            }
        };

        for record in records {
            let bytes = serialization::encode_record(record)?;
            let len = bytes.len() as u32;
            file.write_all(&len.to_le_bytes())
                .and_then(|_| file.write_all(&bytes))
                .map_err(|e| LedgerError::io(collection, "append record", e))?;
        }
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| LedgerError::io(collection, "sync log", e))?;

        debug!(collection, count = records.len(), "appended records to backup ledger");
        Ok(())
    }

    fn open_writer(&self, collection: &str) -> Result<File, LedgerError> {
        fs::create_dir_all(self.collection_dir(collection))
            .map_err(|e| LedgerError::io(collection, "create collection dir", e))?;

        let path = self.log_path(collection);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::io(collection, "open log", e))?;

        let len = file
            .metadata()
            .map_err(|e| LedgerError::io(collection, "stat log", e))?
            .len();
        if len == 0 {
            file.write_all(&serialization::ledger_header())
                .and_then(|_| file.sync_all())
                .map_err(|e| LedgerError::io(collection, "write log header", e))?;
        }
        Ok(file)
    }

    /// Enumerate collection names that have a backup (a metadata file).
    ///
    /// Sorted for deterministic rebuild order.
    pub fn list_collections(&self) -> Result<Vec<String>, LedgerError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| LedgerError::io("<root>", "list root", e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LedgerError::io("<root>", "list root", e))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.has_metadata(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Lazy sequence of all appended records for a collection, in append
    /// order. Each call reopens the log, so iteration is restartable.
    ///
    /// A collection with no log yet yields an empty sequence.
    pub fn read_all(&self, collection: &str) -> Result<LedgerReader, LedgerError> {
        let path = self.log_path(collection);
        if !path.is_file() {
            return Ok(LedgerReader::empty(collection));
        }

        let file = File::open(&path).map_err(|e| LedgerError::io(collection, "open log", e))?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; LEDGER_HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| LedgerError::io(collection, "read log header", e))?;
        serialization::parse_ledger_header(&header)?;

        Ok(LedgerReader {
            collection: collection.to_string(),
            reader: Some(reader),
        })
    }

    /// Count of replayable records for a collection.
    pub fn record_count(&self, collection: &str) -> Result<usize, LedgerError> {
        let mut count = 0;
        for record in self.read_all(collection)? {
            record?;
            count += 1;
        }
        Ok(count)
    }

    /// Drop all cached writer handles. Safe to call multiple times; the next
    /// append transparently reopens.
    pub fn close(&self) {
        self.writers.lock().clear();
    }
}

/// Iterator over the framed records of one collection log.
///
/// Yields `Err` once on the first unreadable frame, then stops.
pub struct LedgerReader {
    collection: String,
    reader: Option<BufReader<File>>,
}

impl LedgerReader {
    fn empty(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            reader: None,
        }
    }

    /// Read the 4-byte length prefix. Distinguishes a clean end of log
    /// (no bytes left) from a truncated prefix (some bytes left).
    fn read_len(&mut self) -> Option<Result<u32, LedgerError>> {
        let reader = self.reader.as_mut()?;
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Some(Err(LedgerError::io(&self.collection, "read frame length", e)))
                }
            }
        }
        match filled {
            0 => None,
            4 => Some(Ok(u32::from_le_bytes(buf))),
            n => Some(Err(LedgerError::Corrupt {
                collection: self.collection.clone(),
                detail: format!("truncated length prefix ({n} of 4 bytes)"),
            })),
        }
    }
}

impl Iterator for LedgerReader {
    type Item = Result<Record, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = match self.read_len()? {
            Ok(len) => len,
            Err(e) => {
                self.reader = None;
                return Some(Err(e));
            }
        };

        if len > MAX_FRAME_LEN {
            self.reader = None;
            return Some(Err(LedgerError::Corrupt {
                collection: self.collection.clone(),
                detail: format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}"),
            }));
        }

        let mut payload = vec![0u8; len as usize];
        let reader = self.reader.as_mut()?;
        if let Err(e) = reader.read_exact(&mut payload) {
            self.reader = None;
            let err = if e.kind() == std::io::ErrorKind::UnexpectedEof {
                LedgerError::Corrupt {
                    collection: self.collection.clone(),
                    detail: format!("truncated record (expected {len} payload bytes)"),
                }
            } else {
                LedgerError::io(&self.collection, "read record", e)
            };
            return Some(Err(err));
        }

        match serialization::decode_record(&payload) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.reader = None;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_recall_core::{DistanceMetric, MetadataMap};
    use serde_json::json;
    use tempfile::TempDir;

    fn schema(name: &str) -> CollectionSchema {
        CollectionSchema::new(name, 4, "v", DistanceMetric::Cosine)
    }

    fn record(tag: &str) -> Record {
        let mut metadata = MetadataMap::new();
        metadata.insert("id".into(), json!(tag));
        Record::new(vec![0.1, 0.2, 0.3, 0.4], metadata)
    }

    #[test]
    fn append_then_read_all_preserves_order() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        ledger.write_metadata(&schema("c")).unwrap();

        let batch_one = vec![record("a"), record("b")];
        let batch_two = vec![record("c")];
        ledger.append("c", &batch_one).unwrap();
        ledger.append("c", &batch_two).unwrap();

        let replayed: Vec<Record> = ledger
            .read_all("c")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0], batch_one[0]);
        assert_eq!(replayed[1], batch_one[1]);
        assert_eq!(replayed[2], batch_two[0]);
    }

    #[test]
    fn read_all_is_restartable() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        ledger.append("c", &[record("a"), record("b")]).unwrap();

        let first: Vec<_> = ledger.read_all("c").unwrap().collect();
        let second: Vec<_> = ledger.read_all("c").unwrap().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn empty_collection_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.read_all("ghost").unwrap().count(), 0);
        assert_eq!(ledger.record_count("ghost").unwrap(), 0);
    }

    #[test]
    fn list_collections_requires_metadata() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();

        // Records without metadata: not listed (matches rebuild skipping).
        ledger.append("orphan", &[record("x")]).unwrap();
        ledger.write_metadata(&schema("real")).unwrap();

        assert_eq!(ledger.list_collections().unwrap(), vec!["real".to_string()]);
    }

    #[test]
    fn list_collections_sorted() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            ledger.write_metadata(&schema(name)).unwrap();
        }
        assert_eq!(
            ledger.list_collections().unwrap(),
            vec!["alpha".to_string(), "mid".to_string(), "zeta".to_string()]
        );
    }

    #[test]
    fn metadata_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        let s = schema("c");
        ledger.write_metadata(&s).unwrap();
        assert_eq!(ledger.read_metadata("c").unwrap(), s);

        assert!(matches!(
            ledger.read_metadata("ghost"),
            Err(LedgerError::MetadataMissing { .. })
        ));
    }

    #[test]
    fn truncated_tail_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        ledger.append("c", &[record("a"), record("b")]).unwrap();
        ledger.close();

        // Chop bytes off the final frame.
        let path = dir.path().join("c").join(RECORDS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let results: Vec<_> = ledger.read_all("c").unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn bad_header_rejected() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("c").join(RECORDS_FILE), b"not-a-ledger").unwrap();

        assert!(matches!(
            ledger.read_all("c"),
            Err(LedgerError::Serialization(_))
        ));
    }

    #[test]
    fn close_is_idempotent_and_append_reopens() {
        let dir = TempDir::new().unwrap();
        let ledger = BackupLedger::open(dir.path()).unwrap();
        ledger.append("c", &[record("a")]).unwrap();
        ledger.close();
        ledger.close();
        ledger.append("c", &[record("b")]).unwrap();
        assert_eq!(ledger.record_count("c").unwrap(), 2);
    }
}
