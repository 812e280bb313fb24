//! Progress UI (spinner) for enrichment runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use enricher_core::{ProgressSnapshot, StatusBucket};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    progress: watch::Receiver<ProgressSnapshot>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(progress, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    progress: watch::Receiver<ProgressSnapshot>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let message = progress_message(&progress.borrow());
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

pub(crate) fn progress_message(snapshot: &ProgressSnapshot) -> String {
    format!(
        "[{}/{}] Verifying contacts... valid {}, catch-all {}, not found {}, errors {}",
        snapshot.processed_contacts.min(snapshot.total_contacts),
        snapshot.total_contacts,
        snapshot.count(StatusBucket::Valid),
        snapshot.count(StatusBucket::CatchallDefault),
        snapshot.count(StatusBucket::NotFoundValidEmails),
        snapshot.count(StatusBucket::Error),
    )
}
