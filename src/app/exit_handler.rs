//! Exit code logic for the enricher process.
//!
//! Single responsibility: map final row counts to the process exit outcome.

use enricher_core::{ProgressSnapshot, StatusBucket};

use crate::ProcessExit;

/// Determines the process exit outcome from processed and errored contact counts.
pub(crate) fn determine_exit_outcome(processed: usize, errored: usize) -> ProcessExit {
    if errored == 0 {
        ProcessExit::Success
    } else if processed > errored {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

pub(crate) fn exit_outcome_for(progress: &ProgressSnapshot) -> ProcessExit {
    determine_exit_outcome(
        progress.processed_contacts,
        progress.count(StatusBucket::Error),
    )
}

#[cfg(test)]
mod tests {
    use enricher_core::{ProgressTracker, StatusCode};

    use super::*;

    #[test]
    fn test_exit_outcome_success_when_no_errors() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_success_when_nothing_processed() {
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(3, 1), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_errored() {
        assert_eq!(determine_exit_outcome(2, 2), ProcessExit::Failure);
    }

    #[test]
    fn test_not_found_is_not_an_error() {
        let tracker = ProgressTracker::new(2, 0);
        tracker.record(Some(StatusCode::NotFoundValidEmails));
        let snapshot = tracker.record(Some(StatusCode::CatchallDefault));
        assert_eq!(exit_outcome_for(&snapshot), ProcessExit::Success);
    }
}
