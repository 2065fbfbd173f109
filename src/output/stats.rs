//! Run statistics
//!
//! This module provides the counters a run accumulates and the ways they are
//! shown: a one-line `Display` for the log and a multi-line summary for the
//! terminal.

use std::fmt;

/// Counters for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Identifiers yielded by discovery (or given explicitly)
    pub discovered: u64,

    /// Records written that did not exist before
    pub downloaded: u64,

    /// Identifiers the run mode decided not to fetch
    pub skipped: u64,

    /// Records written over an existing file
    pub updated: u64,

    /// Identifiers whose every attempt failed
    pub failures: u64,

    /// Search prefixes queried during discovery
    pub prefixes_queried: u64,

    /// The run was cancelled before it finished
    pub interrupted: bool,
}

impl CrawlStats {
    /// Records written in this run, new or replaced
    pub fn saved(&self) -> u64 {
        self.downloaded + self.updated
    }

    /// Identifiers that reached a final outcome
    pub fn processed(&self) -> u64 {
        self.saved() + self.failures
    }

    /// True when nothing failed and the run was not cut short
    pub fn is_success(&self) -> bool {
        self.failures == 0 && !self.interrupted
    }
}

impl fmt::Display for CrawlStats {
    /// `discovered=N` followed by the non-zero outcome counters
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "discovered={}", self.discovered)?;

        let counters = [
            ("downloaded", self.downloaded),
            ("updated", self.updated),
            ("skipped", self.skipped),
            ("failures", self.failures),
        ];
        for (name, value) in counters.iter().filter(|(_, v)| *v > 0) {
            write!(f, ", {}={}", name, value)?;
        }

        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStats) {
    println!("=== Scrape Statistics ===\n");

    println!("Discovery:");
    println!("  Identifiers discovered: {}", stats.discovered);
    if stats.prefixes_queried > 0 {
        println!("  Search prefixes queried: {}", stats.prefixes_queried);
    }
    println!();

    println!("Records:");
    println!("  Downloaded: {}", stats.downloaded);
    println!("  Updated: {}", stats.updated);
    println!("  Skipped: {}", stats.skipped);
    println!("  Failed: {}", stats.failures);
    println!();

    let processed = stats.processed();
    if processed > 0 {
        let success_rate = stats.saved() as f64 / processed as f64 * 100.0;
        println!("Success rate: {:.1}%", success_rate);
    }

    if stats.interrupted {
        println!("Run was interrupted; resume with --mode continue");
    }
}
