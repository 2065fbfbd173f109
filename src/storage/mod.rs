//! Storage module for persisting scraped records
//!
//! Every record lives in its own pretty-printed JSON file named after its
//! identifier. The directory doubles as the source of truth for what has
//! already been downloaded: a startup scan classifies each file as complete or
//! incomplete so the crawl state can be rebuilt after a crash.

mod record_store;

pub use record_store::{RecordStore, ScanReport};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during record storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Record identifier is not a plain file name: {0:?}")]
    InvalidId(String),

    #[error("Invalid record file {path}: {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
