//! thermomix-scraper: a resumable recipe scraper
//!
//! This crate discovers every recipe identifier through the site's hosted
//! search index, downloads each recipe page through an authenticated session
//! and stores one JSON file per recipe. Progress is checkpointed so an
//! interrupted run can pick up where it stopped.

pub mod config;
pub mod crawler;
pub mod discovery;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for scraper runs
///
/// Only `Config`, `Configuration` and `Authentication` abort a run. The other
/// variants are raised per record and contained by the coordinator.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery setup failed: {0}")]
    Configuration(discovery::DiscoveryError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for scraper operations
pub type Result<T> = std::result::Result<T, CrawlError>;

// Re-export commonly used types
pub use config::{Config, RunMode};
pub use crawler::Coordinator;
pub use output::CrawlStats;
pub use record::{Record, RecordId};
