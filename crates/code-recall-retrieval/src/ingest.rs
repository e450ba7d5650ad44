//! Dataset ingestion pipeline.
//!
//! Pure I/O stage, deliberately decoupled from embedding and storage: the
//! manifest is read into typed entries, each entry's description and code
//! files are loaded, and the result is a list of (text, metadata) pairs ready
//! for batch encoding. A failure reading one entry is logged and that entry
//! skipped — one malformed dataset entry must not block the rest.
//!
//! Manifest format:
//!
//! ```json
//! {
//!   "objects": [
//!     {
//!       "id": "cube_01",
//!       "category": "primitives",
//!       "subcategory": "mesh",
//!       "description_file": "descriptions/cube_01.txt",
//!       "code_file": "code/cube_01.py"
//!     }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the configured base directory.

use std::fs;
use std::path::{Path, PathBuf};

use code_recall_core::MetadataMap;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from manifest loading. Per-entry file failures are not errors —
/// those entries are skipped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read manifest {path:?}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path:?}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One dataset object as declared in the manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub category: String,
    pub subcategory: String,
    pub description_file: PathBuf,
    pub code_file: PathBuf,
}

/// The whole dataset manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatasetManifest {
    pub objects: Vec<ManifestEntry>,
}

/// One ingestible item: the text to embed plus the metadata stored with it.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestItem {
    /// Text fed to the embedding provider.
    pub text: String,
    /// Metadata stored alongside the vector: `{id, category, subcategory, code}`.
    pub metadata: MetadataMap,
}

/// Load and parse the dataset manifest.
pub fn load_manifest(path: &Path) -> Result<DatasetManifest, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| IngestError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Turn manifest entries into embeddable items, best-effort.
///
/// Reads each entry's description and code files (whitespace-trimmed),
/// resolving relative paths against `base_dir`. Entries whose files cannot be
/// read are logged with `warn!` and skipped.
pub fn load_entries(manifest: &DatasetManifest, base_dir: &Path) -> Vec<IngestItem> {
    let mut items = Vec::with_capacity(manifest.objects.len());

    for entry in &manifest.objects {
        let description = match read_trimmed(&resolve(&entry.description_file, base_dir)) {
            Ok(text) => text,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "skipping dataset entry: unreadable description");
                continue;
            }
        };
        let code = match read_trimmed(&resolve(&entry.code_file, base_dir)) {
            Ok(text) => text,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "skipping dataset entry: unreadable code");
                continue;
            }
        };

        let mut metadata = MetadataMap::new();
        metadata.insert("id".into(), json!(entry.id));
        metadata.insert("category".into(), json!(entry.category));
        metadata.insert("subcategory".into(), json!(entry.subcategory));
        metadata.insert("code".into(), json!(code));

        items.push(IngestItem {
            text: format!("Object description: {description}"),
            metadata,
        });
    }

    debug!(
        loaded = items.len(),
        declared = manifest.objects.len(),
        "loaded dataset entries"
    );
    items
}

fn resolve(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_trimmed(path: &Path) -> std::io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}
