//! End-to-end enrichment of a batch of input rows.
//!
//! [`EnrichmentJob`] sanitizes the rows up front so callers can read the
//! column order and subscribe to progress before any verification starts.
//! [`EnrichmentJob::run`] then drives the [`ComboScheduler`] and, on the
//! same task, drains its result channel: every terminal contact is written
//! through the [`OrderedWriter`], counted by the [`ProgressTracker`] and
//! handed to the caller's callback.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::contact::{
    CandidateOutcome, ContactResult, InputRow, ResultDetails, SanitizedRow, StatusCode,
    message_summary, sanitize_rows,
};
use crate::credential::CredentialError;
use crate::patterns::{CandidateGenerator, PatternGenerator};
use crate::progress::{ProgressSnapshot, ProgressTracker, StatusBucket};
use crate::scheduler::{
    ComboScheduler, DEFAULT_MAX_COMBOS, DEFAULT_WAVE_SIZE, MissingMxPredicate, SchedulerError,
    SubstringMxHeuristic,
};
use crate::snapshot::{AppendSink, OrderedWriter, OutputRow, RESULT_COLUMNS, SnapshotError};
use crate::verify::Verifier;

/// Reason used when a runnable row produced no scheduler result.
pub const REASON_PROCESSING_MISMATCH: &str = "Unexpected processing mismatch";

/// Default capacity of the scheduler result channel.
pub const DEFAULT_RESULT_CHANNEL_CAPACITY: usize = 64;

/// Errors that abort an enrichment run.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// No verification key could be obtained. Distinct from per-contact
    /// failures, which are reported as row statuses.
    #[error("enrichment stopped after {completed} contacts: {source}")]
    Credential {
        #[source]
        source: CredentialError,
        completed: usize,
    },

    /// The output sink failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl From<SchedulerError> for EnrichError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Credential { source, completed } => {
                Self::Credential { source, completed }
            }
        }
    }
}

/// Collaborators and limits for a run.
#[derive(Clone)]
pub struct EnrichOptions {
    pub verifier: Arc<dyn Verifier>,
    pub generator: Arc<dyn CandidateGenerator>,
    pub predicate: Arc<dyn MissingMxPredicate>,
    pub max_combos: usize,
    pub wave_size: usize,
    pub channel_capacity: usize,
}

impl std::fmt::Debug for EnrichOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichOptions")
            .field("max_combos", &self.max_combos)
            .field("wave_size", &self.wave_size)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

impl EnrichOptions {
    /// Options with the default generator, heuristic and limits.
    #[must_use]
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self {
            verifier,
            generator: Arc::new(PatternGenerator::new()),
            predicate: Arc::new(SubstringMxHeuristic),
            max_combos: DEFAULT_MAX_COMBOS,
            wave_size: DEFAULT_WAVE_SIZE,
            channel_capacity: DEFAULT_RESULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn CandidateGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn MissingMxPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    #[must_use]
    pub fn with_max_combos(mut self, max_combos: usize) -> Self {
        self.max_combos = max_combos;
        self
    }

    #[must_use]
    pub fn with_wave_size(mut self, wave_size: usize) -> Self {
        self.wave_size = wave_size;
        self
    }

    fn scheduler(&self) -> ComboScheduler {
        ComboScheduler::new(Arc::clone(&self.verifier), Arc::clone(&self.generator))
            .with_predicate(Arc::clone(&self.predicate))
            .with_max_combos(self.max_combos)
            .with_wave_size(self.wave_size)
    }
}

/// Final per-row result, one per sanitized input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_id: usize,
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub best_email: Option<String>,
    pub status: StatusCode,
    pub details: ResultDetails,
    pub message_summary: String,
    pub all_checked_candidates: Vec<CandidateOutcome>,
}

impl RowOutcome {
    fn skipped(row: &SanitizedRow, reason: &str) -> Self {
        Self::build(
            row,
            None,
            StatusCode::SkippedMissingFields,
            ResultDetails::reason(reason),
            Vec::new(),
        )
    }

    fn from_result(row: &SanitizedRow, result: ContactResult) -> Self {
        Self::build(
            row,
            result.best_email,
            result.status,
            result.details,
            result.results_per_combo,
        )
    }

    fn build(
        row: &SanitizedRow,
        best_email: Option<String>,
        status: StatusCode,
        details: ResultDetails,
        all_checked_candidates: Vec<CandidateOutcome>,
    ) -> Self {
        Self {
            row_id: row.row_id,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            domain: row.domain.clone(),
            best_email,
            status,
            message_summary: message_summary(&details).to_string(),
            details,
            all_checked_candidates,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct EnrichmentReport<S> {
    /// One outcome per sanitized row, in input order.
    pub results: Vec<RowOutcome>,
    /// Final progress counts.
    pub progress: ProgressSnapshot,
    /// The output sink, after the last append.
    pub sink: S,
    /// Rows that never reached the sink.
    pub missing_rows: Vec<usize>,
}

/// Output columns: union of input columns in first-seen order, followed by
/// the result columns.
#[must_use]
pub fn build_column_order(rows: &[SanitizedRow]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for (name, _) in row.columns() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    for extra in RESULT_COLUMNS {
        if !columns.iter().any(|column| column == extra) {
            columns.push(extra.to_string());
        }
    }
    columns
}

/// A sanitized batch ready to run.
#[derive(Debug)]
pub struct EnrichmentJob {
    rows: Vec<SanitizedRow>,
    columns: Vec<String>,
    tracker: Arc<ProgressTracker>,
}

impl EnrichmentJob {
    /// Sanitizes `rows` and prepares the progress tracker.
    #[must_use]
    pub fn new(rows: &[InputRow]) -> Self {
        let rows = sanitize_rows(rows);
        let runnable = rows.iter().filter(|row| row.contact.is_some()).count();
        let skipped = rows.len() - runnable;
        let columns = build_column_order(&rows);
        info!(
            total_rows = rows.len(),
            runnable, skipped, "prepared enrichment job"
        );

        Self {
            rows,
            columns,
            tracker: Arc::new(ProgressTracker::new(runnable, skipped)),
        }
    }

    /// Sanitized rows in input order.
    #[must_use]
    pub fn rows(&self) -> &[SanitizedRow] {
        &self.rows
    }

    /// Output column order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shared progress tracker; subscribe before calling [`run`](Self::run).
    #[must_use]
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Runs every runnable row to a terminal status.
    ///
    /// Skipped rows are written to `sink` first. `on_result` is called once
    /// per runnable contact as soon as its result is decided, together with
    /// the progress snapshot that includes it.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Credential`] when no verification key can be
    /// obtained, after every result decided so far has been written and
    /// reported. Returns [`EnrichError::Snapshot`] if the sink fails.
    #[instrument(skip_all, fields(rows = self.rows.len()))]
    pub async fn run<S, F>(
        self,
        options: &EnrichOptions,
        sink: S,
        mut on_result: F,
    ) -> Result<EnrichmentReport<S>, EnrichError>
    where
        S: AppendSink,
        F: FnMut(&ContactResult, &ProgressSnapshot),
    {
        let mut writer = OrderedWriter::new(sink, self.rows.len());

        for row in &self.rows {
            if let Some(reason) = row.skip_reason {
                writer.submit(OutputRow::new(
                    row.row_id,
                    row.columns(),
                    "",
                    StatusCode::SkippedMissingFields.as_str(),
                    reason,
                ))?;
            }
        }

        let contacts: Vec<_> = self
            .rows
            .iter()
            .filter_map(|row| row.contact.clone())
            .collect();
        let by_row: HashMap<usize, &SanitizedRow> =
            self.rows.iter().map(|row| (row.row_id, row)).collect();

        let scheduler = options.scheduler();
        let (sender, mut receiver) =
            mpsc::channel::<ContactResult>(options.channel_capacity.max(1));
        let tracker = Arc::clone(&self.tracker);

        let consume = async {
            let mut sink_error: Option<SnapshotError> = None;
            while let Some(result) = receiver.recv().await {
                let row = by_row
                    .get(&result.contact.row_id)
                    .filter(|_| sink_error.is_none());
                if let Some(row) = row {
                    let output = OutputRow::new(
                        row.row_id,
                        row.columns(),
                        result.best_email.clone().unwrap_or_default(),
                        result.status.as_str(),
                        message_summary(&result.details),
                    );
                    if let Err(error) = writer.submit(output) {
                        warn!(error = %error, "output sink failed, results kept in memory");
                        sink_error = Some(error);
                    }
                }
                let snapshot = tracker.record(Some(result.status));
                on_result(&result, &snapshot);
            }
            sink_error
        };

        let (scheduled, sink_error) = tokio::join!(scheduler.run(contacts, Some(sender)), consume);
        let scheduled = scheduled?;
        if let Some(error) = sink_error {
            return Err(error.into());
        }

        let finished = writer.finish()?;
        let mut by_contact: HashMap<usize, ContactResult> = scheduled
            .into_iter()
            .map(|result| (result.contact.row_id, result))
            .collect();

        let results: Vec<RowOutcome> = self
            .rows
            .iter()
            .map(|row| match (&row.contact, row.skip_reason) {
                (_, Some(reason)) => RowOutcome::skipped(row, reason),
                (Some(contact), None) => {
                    let result = by_contact.remove(&contact.row_id).unwrap_or_else(|| {
                        warn!(row_id = contact.row_id, "no scheduler result for row");
                        ContactResult::error(contact.clone(), REASON_PROCESSING_MISMATCH)
                    });
                    RowOutcome::from_result(row, result)
                }
                (None, None) => RowOutcome::build(
                    row,
                    None,
                    StatusCode::Error,
                    ResultDetails::reason(REASON_PROCESSING_MISMATCH),
                    Vec::new(),
                ),
            })
            .collect();

        let progress = self.tracker.snapshot();
        info!(
            processed = progress.processed_contacts,
            valid = progress.count(StatusBucket::Valid),
            catchall_default = progress.count(StatusBucket::CatchallDefault),
            not_found = progress.count(StatusBucket::NotFoundValidEmails),
            errors = progress.count(StatusBucket::Error),
            skipped = progress.skipped_rows,
            "enrichment finished"
        );

        Ok(EnrichmentReport {
            results,
            progress,
            sink: finished.sink,
            missing_rows: finished.missing,
        })
    }
}

/// Sanitizes `rows` and enriches them in one call.
///
/// # Errors
///
/// See [`EnrichmentJob::run`].
pub async fn process_contacts_in_batches<S, F>(
    rows: &[InputRow],
    options: &EnrichOptions,
    sink: S,
    on_result: F,
) -> Result<EnrichmentReport<S>, EnrichError>
where
    S: AppendSink,
    F: FnMut(&ContactResult, &ProgressSnapshot),
{
    EnrichmentJob::new(rows).run(options, sink, on_result).await
}
