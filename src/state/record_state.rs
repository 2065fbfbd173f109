/// Record lifecycle stages tracked across runs
///
/// This module defines the stages a record identifier can be in according to
/// the crawl state.
use std::fmt;

/// Represents where a record identifier currently sits in the crawl lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    // ===== Active States =====
    /// Identifier was seen by discovery but not queued for download
    Discovered,

    /// Identifier is queued (or was queued when the run stopped)
    Pending,

    // ===== Terminal States =====
    /// Record was fetched and written to disk
    Completed,

    /// Every download attempt failed
    Failed,
}

impl RecordStatus {
    /// Returns true if no further work is planned for this record
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if a `continue` run would pick this record up
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
