//! Shared data model for the code-recall vector store.
//!
//! This crate holds the types every other layer agrees on:
//! - `DistanceMetric`: the similarity function a collection is ranked by
//! - `CollectionSchema`: the immutable configuration of a named collection
//! - `Record`: one id + embedding + metadata entry
//! - `SearchResult`: one ranked hit returned to callers
//!
//! No I/O happens here; storage and retrieval layers build on these types.

pub mod types;

pub use types::{
    CollectionSchema, DistanceMetric, MetadataMap, Record, SchemaValidationError, SearchResult,
};
