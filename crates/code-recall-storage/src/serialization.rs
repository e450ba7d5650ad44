//! Serialization utilities for the storage layer.
//!
//! # Strategy
//! - **CollectionSchema**: pretty JSON — metadata files stay human-readable
//!   and any implementation can parse them.
//! - **Record**: MessagePack (`rmp-serde`) — record metadata is an open
//!   `serde_json::Value` map, which needs a self-describing format.
//! - **Ledger framing**: magic + version header, then `u32` little-endian
//!   length prefix per record. The header is the format's forward
//!   compatibility tag; readers reject files they do not understand.

use std::fs;
use std::io::Write;
use std::path::Path;

use code_recall_core::{CollectionSchema, Record};
use thiserror::Error;

/// Magic bytes at the start of every ledger log file.
pub const LEDGER_MAGIC: [u8; 4] = *b"CRLG";

/// Current ledger format version, bumped on incompatible changes.
pub const LEDGER_VERSION: u16 = 1;

/// Size of the ledger file header: magic + u16 version.
pub const LEDGER_HEADER_LEN: usize = LEDGER_MAGIC.len() + 2;

/// Errors from encoding/decoding schemas and records.
///
/// Underlying rmp/serde_json errors do not implement Clone, so messages are
/// stored as String.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Encode one ledger record as MessagePack.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, SerializationError> {
    // Named format so the open metadata map round-trips field-for-field.
    rmp_serde::to_vec_named(record).map_err(|e| SerializationError::EncodeFailed(e.to_string()))
}

/// Decode one ledger record from MessagePack bytes.
pub fn decode_record(bytes: &[u8]) -> Result<Record, SerializationError> {
    rmp_serde::from_slice(bytes).map_err(|e| SerializationError::DecodeFailed(e.to_string()))
}

/// Build the ledger file header for the current format version.
pub fn ledger_header() -> [u8; LEDGER_HEADER_LEN] {
    let mut header = [0u8; LEDGER_HEADER_LEN];
    header[..4].copy_from_slice(&LEDGER_MAGIC);
    header[4..].copy_from_slice(&LEDGER_VERSION.to_le_bytes());
    header
}

/// Validate a ledger file header, returning the version it declares.
pub fn parse_ledger_header(bytes: &[u8; LEDGER_HEADER_LEN]) -> Result<u16, SerializationError> {
    if bytes[..4] != LEDGER_MAGIC {
        return Err(SerializationError::DecodeFailed(format!(
            "bad ledger magic: {:02x?}",
            &bytes[..4]
        )));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != LEDGER_VERSION {
        return Err(SerializationError::DecodeFailed(format!(
            "unsupported ledger version {version} (supported: {LEDGER_VERSION})"
        )));
    }
    Ok(version)
}

/// Write a collection schema as pretty JSON, overwrite-safe.
///
/// Writes to a temporary sibling file and renames it into place, so a crash
/// mid-write never leaves a truncated metadata file behind.
pub fn write_schema_json(path: &Path, schema: &CollectionSchema) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(schema)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Read a collection schema back from its JSON metadata file.
pub fn read_schema_json(path: &Path) -> Result<CollectionSchema, SerializationError> {
    let bytes =
        fs::read(path).map_err(|e| SerializationError::DecodeFailed(format!("{path:?}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SerializationError::DecodeFailed(format!("{path:?}: {e}")))
}
