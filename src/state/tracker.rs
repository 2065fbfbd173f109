//! Crawl state tracker
//!
//! Owns the four identifier sets for the current run and keeps their
//! invariants:
//!
//! - `pending` is disjoint from `completed` and from `failed`
//! - `discovered` contains every identifier in the other three sets and only
//!   ever grows
//!
//! All mutators are idempotent.

use crate::config::RunMode;
use crate::record::RecordId;
use crate::state::policy::{decide, Membership};
use crate::state::{CrawlState, RecordStatus, StateError};
use crate::storage::{RecordStore, ScanReport};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Tracks per-record lifecycle state and persists it to the recovery file
#[derive(Debug, Clone)]
pub struct StateTracker {
    state: CrawlState,
    path: PathBuf,
    store: RecordStore,
}

impl StateTracker {
    /// Creates a tracker with empty state
    pub fn new(path: impl Into<PathBuf>, store: RecordStore) -> Self {
        Self::from_state(CrawlState::default(), path, store)
    }

    /// Creates a tracker from an existing snapshot
    pub fn from_state(state: CrawlState, path: impl Into<PathBuf>, store: RecordStore) -> Self {
        let mut tracker = Self {
            state,
            path: path.into(),
            store,
        };
        tracker.restore_invariants();
        tracker
    }

    /// Loads the recovery file, falling back to empty state
    ///
    /// A missing file is normal. An unreadable or corrupt file is logged as a
    /// warning and ignored.
    pub fn load(path: impl Into<PathBuf>, store: RecordStore) -> Self {
        let path = path.into();

        let state = match CrawlState::load(&path) {
            Ok(Some(state)) => {
                tracing::info!(
                    "Loaded state: {} pending, {} completed, {} failed",
                    state.pending.len(),
                    state.completed.len(),
                    state.failed.len()
                );
                state
            }
            Ok(None) => CrawlState::default(),
            Err(e) => {
                tracing::warn!("Failed to load state: {}", e);
                CrawlState::default()
            }
        };

        Self::from_state(state, path, store)
    }

    /// Merges a record store scan into the state
    ///
    /// Complete records on disk are completed; incomplete ones become pending
    /// so a `continue` run picks them up again.
    pub fn merge_scan(&mut self, report: &ScanReport) {
        for id in &report.complete {
            self.mark_completed(id);
        }
        for id in &report.incomplete {
            self.mark_pending(id);
        }
    }

    /// Decides whether a record should be fetched in the given mode
    ///
    /// Pure with respect to the tracked state; in `skip` mode it also checks
    /// for the record file.
    pub fn should_fetch(&self, id: &str, mode: RunMode) -> bool {
        let membership = Membership {
            completed: self.state.completed.contains(id),
            pending: self.state.pending.contains(id),
            failed: self.state.failed.contains(id),
        };

        decide(mode, membership, || self.store.exists(id)).is_fetch()
    }

    pub fn mark_discovered(&mut self, id: &str) {
        if !self.state.discovered.contains(id) {
            self.state.discovered.insert(id.to_string());
        }
    }

    pub fn mark_pending(&mut self, id: &str) {
        self.mark_discovered(id);
        self.state.completed.remove(id);
        self.state.failed.remove(id);
        self.state.pending.insert(id.to_string());
    }

    pub fn mark_completed(&mut self, id: &str) {
        self.mark_discovered(id);
        self.state.pending.remove(id);
        self.state.failed.remove(id);
        self.state.completed.insert(id.to_string());
    }

    pub fn mark_failed(&mut self, id: &str) {
        self.mark_discovered(id);
        self.state.pending.remove(id);
        self.state.failed.insert(id.to_string());
    }

    /// Returns the most advanced lifecycle stage known for an identifier
    pub fn status(&self, id: &str) -> Option<RecordStatus> {
        if self.state.pending.contains(id) {
            Some(RecordStatus::Pending)
        } else if self.state.failed.contains(id) {
            Some(RecordStatus::Failed)
        } else if self.state.completed.contains(id) {
            Some(RecordStatus::Completed)
        } else if self.state.discovered.contains(id) {
            Some(RecordStatus::Discovered)
        } else {
            None
        }
    }

    /// Pending identifiers in sorted order
    pub fn pending_ids(&self) -> Vec<String> {
        self.state.pending.iter().cloned().collect()
    }

    pub fn discovered_count(&self) -> usize {
        self.state.discovered.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    pub fn completed_count(&self) -> usize {
        self.state.completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.state.failed.len()
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamps the state and returns a copy for writing outside any lock
    pub fn snapshot(&mut self) -> CrawlState {
        self.state.last_updated = chrono::Utc::now();
        self.state.clone()
    }

    /// Writes the recovery file
    pub fn save(&mut self) -> Result<(), StateError> {
        let snapshot = self.snapshot();
        snapshot.save(&self.path)
    }

    /// Deletes the recovery file after a clean, complete run
    pub fn clear(&self) -> Result<(), StateError> {
        CrawlState::remove(&self.path)?;
        tracing::info!("State file removed (scan complete)");
        Ok(())
    }

    /// Repairs snapshots written by older versions that overlapped sets
    fn restore_invariants(&mut self) {
        let state = &mut self.state;

        for set in [
            &mut state.discovered,
            &mut state.pending,
            &mut state.completed,
            &mut state.failed,
        ] {
            *set = normalize_ids(std::mem::take(set));
        }

        for id in state.completed.iter().chain(state.failed.iter()) {
            state.pending.remove(id);
        }

        let all: Vec<String> = state
            .pending
            .iter()
            .chain(state.completed.iter())
            .chain(state.failed.iter())
            .cloned()
            .collect();
        state.discovered.extend(all);
    }
}

/// Normalizes identifiers read from disk, dropping ones that cannot be parsed
fn normalize_ids(ids: BTreeSet<String>) -> BTreeSet<String> {
    ids.into_iter()
        .filter_map(|raw| match RecordId::parse(&raw) {
            Ok(id) => Some(id.into_inner()),
            Err(e) => {
                tracing::warn!("Dropping identifier from state: {}", e);
                None
            }
        })
        .collect()
}
