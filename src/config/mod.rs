//! Configuration module for the scraper
//!
//! Configuration is layered: built-in defaults, an optional TOML file,
//! environment variables, then command-line flags. The merged result is
//! validated once and shared read-only for the rest of the run.
//!
//! # Example
//!
//! ```no_run
//! use thermomix_scraper::config::{apply_process_env, load_config, validate};
//! use std::path::Path;
//!
//! let mut config = load_config(Path::new("scraper.toml")).unwrap();
//! apply_process_env(&mut config).unwrap();
//! validate(&config).unwrap();
//! println!("Writing recipes to {}", config.output.directory.display());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CredentialsConfig, OutputConfig, RunConfig, RunMode, SiteConfig, TimingConfig,
    STATE_FILE_NAME,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, apply_process_env, compute_config_hash, load_config,
    load_config_with_hash,
};

pub use validation::validate;
