//! Output module for run summaries
//!
//! This module handles:
//! - Counting run outcomes
//! - Rendering the end-of-run summary

pub mod stats;

pub use stats::{print_statistics, CrawlStats};
