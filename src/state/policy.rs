//! Run-mode fetch policy
//!
//! Pure decision logic mapping a run mode and what is known about a record to
//! fetch or skip. The record-file check is passed as a closure so it only runs
//! for the one mode that needs it.

use crate::config::RunMode;

/// Crawl-state membership of a single identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub completed: bool,
    pub pending: bool,
    pub failed: bool,
}

/// Outcome of the fetch policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch,
    Skip,
}

impl Decision {
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch)
    }
}

/// Decides whether a record should be fetched
///
/// | Mode | Rule |
/// |------|------|
/// | `redownload` | always fetch |
/// | `update` | always fetch |
/// | `continue` | fetch iff pending or failed |
/// | `skip` | skip if completed, else fetch iff the record file is absent |
pub fn decide<F>(mode: RunMode, membership: Membership, file_exists: F) -> Decision
where
    F: FnOnce() -> bool,
{
    let fetch = match mode {
        RunMode::Redownload | RunMode::Update => true,
        RunMode::Continue => membership.pending || membership.failed,
        RunMode::Skip => !membership.completed && !file_exists(),
    };

    if fetch {
        Decision::Fetch
    } else {
        Decision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [RunMode; 4] = [
        RunMode::Skip,
        RunMode::Update,
        RunMode::Redownload,
        RunMode::Continue,
    ];

    fn member(completed: bool, pending: bool, failed: bool) -> Membership {
        Membership {
            completed,
            pending,
            failed,
        }
    }

    #[test]
    fn test_force_modes_always_fetch() {
        for mode in [RunMode::Update, RunMode::Redownload] {
            assert_eq!(decide(mode, member(true, false, false), || true), Decision::Fetch);
            assert_eq!(decide(mode, Membership::default(), || false), Decision::Fetch);
        }
    }

    #[test]
    fn test_continue_only_pending_or_failed() {
        assert!(decide(RunMode::Continue, member(false, true, false), || false).is_fetch());
        assert!(decide(RunMode::Continue, member(false, false, true), || false).is_fetch());
        assert!(!decide(RunMode::Continue, member(true, false, false), || false).is_fetch());
        assert!(!decide(RunMode::Continue, Membership::default(), || false).is_fetch());
    }

    #[test]
    fn test_skip_mode() {
        // Completed wins even if the file vanished
        assert_eq!(
            decide(RunMode::Skip, member(true, false, false), || false),
            Decision::Skip
        );
        assert_eq!(
            decide(RunMode::Skip, Membership::default(), || true),
            Decision::Skip
        );
        assert_eq!(
            decide(RunMode::Skip, Membership::default(), || false),
            Decision::Fetch
        );
    }

    #[test]
    fn test_file_check_skipped_when_not_needed() {
        for mode in ALL_MODES {
            let _ = decide(mode, member(true, false, false), || {
                panic!("file check should not run for completed records")
            });
        }
    }

    #[test]
    fn test_decision_is_pure() {
        for mode in ALL_MODES {
            for bits in 0..8u8 {
                let m = member(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
                assert_eq!(decide(mode, m, || false), decide(mode, m, || false));
                assert_eq!(decide(mode, m, || true), decide(mode, m, || true));
            }
        }
    }
}
