//! Running status counts for an enrichment run.
//!
//! The tracker is updated once per terminal contact and publishes every new
//! snapshot on a `tokio::sync::watch` channel so a UI can poll or await it.
//! `processed_contacts` always equals the sum of `status_counts`; rows
//! skipped at ingestion are reported separately in `skipped_rows`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::contact::StatusCode;

/// Bucket a terminal status is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Valid,
    CatchallDefault,
    NotFoundValidEmails,
    Error,
    Other,
}

impl StatusBucket {
    /// All buckets, in reporting order.
    pub const ALL: [Self; 5] = [
        Self::Valid,
        Self::CatchallDefault,
        Self::NotFoundValidEmails,
        Self::Error,
        Self::Other,
    ];

    /// Maps a status to its bucket. Missing and ingestion-only statuses
    /// count as `Other`.
    #[must_use]
    pub fn normalize(status: Option<StatusCode>) -> Self {
        match status {
            Some(StatusCode::Valid) => Self::Valid,
            Some(StatusCode::CatchallDefault) => Self::CatchallDefault,
            Some(StatusCode::NotFoundValidEmails) => Self::NotFoundValidEmails,
            Some(StatusCode::Error) => Self::Error,
            Some(StatusCode::SkippedMissingFields) | None => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::CatchallDefault => "catchall_default",
            Self::NotFoundValidEmails => "not_found_valid_emails",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

/// Immutable view of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_contacts: usize,
    pub processed_contacts: usize,
    pub status_counts: BTreeMap<StatusBucket, usize>,
    pub skipped_rows: usize,
}

impl ProgressSnapshot {
    /// Fresh snapshot with every bucket at zero.
    #[must_use]
    pub fn new(total_contacts: usize, skipped_rows: usize) -> Self {
        Self {
            total_contacts,
            processed_contacts: 0,
            status_counts: StatusBucket::ALL.iter().map(|bucket| (*bucket, 0)).collect(),
            skipped_rows,
        }
    }

    /// Count for one bucket.
    #[must_use]
    pub fn count(&self, bucket: StatusBucket) -> usize {
        self.status_counts.get(&bucket).copied().unwrap_or(0)
    }

    /// True once every runnable contact has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.processed_contacts >= self.total_contacts
    }
}

/// Shared progress counter.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
    publisher: watch::Sender<ProgressSnapshot>,
}

impl ProgressTracker {
    /// Creates a tracker for `total_contacts` runnable contacts.
    #[must_use]
    pub fn new(total_contacts: usize, skipped_rows: usize) -> Self {
        let initial = ProgressSnapshot::new(total_contacts, skipped_rows);
        let (publisher, _) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(initial),
            publisher,
        }
    }

    /// Counts one terminal contact and publishes the new snapshot.
    pub fn record(&self, status: Option<StatusCode>) -> ProgressSnapshot {
        let bucket = StatusBucket::normalize(status);
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.processed_contacts += 1;
            *state.status_counts.entry(bucket).or_insert(0) += 1;
            state.clone()
        };

        debug!(
            processed = snapshot.processed_contacts,
            total = snapshot.total_contacts,
            bucket = bucket.as_str(),
            "progress updated"
        );
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.publisher.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_normalize_buckets() {
        assert_eq!(
            StatusBucket::normalize(Some(StatusCode::Valid)),
            StatusBucket::Valid
        );
        assert_eq!(
            StatusBucket::normalize(Some(StatusCode::Error)),
            StatusBucket::Error
        );
        assert_eq!(
            StatusBucket::normalize(Some(StatusCode::SkippedMissingFields)),
            StatusBucket::Other
        );
        assert_eq!(StatusBucket::normalize(None), StatusBucket::Other);
    }

    #[test]
    fn test_record_keeps_processed_equal_to_sum_of_counts() {
        let tracker = ProgressTracker::new(5, 2);
        tracker.record(Some(StatusCode::Valid));
        tracker.record(Some(StatusCode::NotFoundValidEmails));
        tracker.record(None);
        let snapshot = tracker.record(Some(StatusCode::Valid));

        assert_eq!(snapshot.processed_contacts, 4);
        assert_eq!(
            snapshot.status_counts.values().sum::<usize>(),
            snapshot.processed_contacts
        );
        assert_eq!(snapshot.count(StatusBucket::Valid), 2);
        assert_eq!(snapshot.count(StatusBucket::Other), 1);
        assert_eq!(snapshot.skipped_rows, 2);
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new(400, 0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record(Some(StatusCode::CatchallDefault));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.processed_contacts, 400);
        assert_eq!(snapshot.count(StatusBucket::CatchallDefault), 400);
        assert!(snapshot.is_complete());
    }

    #[tokio::test]
    async fn test_subscribe_observes_updates() {
        let tracker = ProgressTracker::new(1, 0);
        let mut receiver = tracker.subscribe();
        assert_eq!(receiver.borrow().processed_contacts, 0);

        tracker.record(Some(StatusCode::Valid));
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().processed_contacts, 1);
    }

    #[test]
    fn test_snapshot_serializes_camel_case_buckets() {
        let snapshot = ProgressSnapshot::new(3, 1);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["totalContacts"], 3);
        assert_eq!(value["statusCounts"]["not_found_valid_emails"], 0);
        assert_eq!(value["skippedRows"], 1);
    }
}
