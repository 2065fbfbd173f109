//! State module for tracking crawl progress
//!
//! This module owns the per-record lifecycle sets and the recovery file they
//! are persisted to between runs.
//!
//! # Components
//!
//! - `RecordStatus`: Lifecycle stage of a single record identifier
//! - `CrawlState`: Serializable snapshot written to the recovery file
//! - `StateTracker`: Mutates the sets while keeping them consistent
//! - `decide`: Run-mode fetch policy

mod crawl_state;
mod policy;
mod record_state;
mod tracker;

// Re-export main types
pub use crawl_state::{CrawlState, StateError};
pub use policy::{decide, Decision, Membership};
pub use record_state::RecordStatus;
pub use tracker::StateTracker;
