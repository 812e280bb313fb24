//! Combo scheduler: per-contact candidate state machines advanced in waves.
//!
//! Every contact owns a list of candidate addresses and a cursor into it.
//! The scheduler repeatedly picks the first `wave_size` contacts that still
//! have an untried candidate within the `max_combos` budget, verifies their
//! current candidates concurrently, and applies the step policy to each
//! response. A contact becomes terminal exactly once, either from a step
//! (confirmed address or missing MX records) or from exhaustion, and its
//! result is sent on the notification channel at that moment.
//!
//! Waves run cooperatively on the calling task through `join_all`; no tasks
//! are spawned and per-contact state is never shared.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use enricher_core::{ComboScheduler, Contact, PatternGenerator, Verifier};
//!
//! # async fn example(verifier: Arc<dyn Verifier>) -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = ComboScheduler::new(verifier, Arc::new(PatternGenerator::new()))
//!     .with_wave_size(10)
//!     .with_max_combos(6);
//!
//! let contacts = vec![Contact::new("Jane", "Doe", "acme.com", 0)];
//! let results = scheduler.run(contacts, None).await?;
//! println!("{:?}", results[0].best_email);
//! # Ok(())
//! # }
//! ```

mod policy;

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::contact::{CandidateOutcome, Contact, ContactResult};
use crate::credential::CredentialError;
use crate::patterns::CandidateGenerator;
use crate::verify::{VerificationResponse, Verifier};

pub use policy::{
    CATCH_ALL_DEFAULT_INDEX, MissingMxPredicate, REASON_ALL_CATCH_ALL, REASON_ALL_REJECTED,
    REASON_MISSING_MX, SubstringMxHeuristic, TerminalOutcome, exhaustion_outcome, step_outcome,
};

/// Default per-contact candidate budget.
pub const DEFAULT_MAX_COMBOS: usize = 8;

/// Default number of contacts verified concurrently per wave.
pub const DEFAULT_WAVE_SIZE: usize = 25;

/// Errors that abort a scheduler run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A verification key could not be obtained. The wave in flight was
    /// applied before the run stopped.
    #[error("verification aborted: {source}")]
    Credential {
        /// Underlying credential failure.
        #[source]
        source: CredentialError,
        /// Contacts that reached a terminal state before the abort.
        completed: usize,
    },
}

#[derive(Debug)]
enum Progress {
    Pending { index: usize },
    Terminal(TerminalOutcome),
}

#[derive(Debug)]
struct ContactState {
    contact: Contact,
    candidates: Vec<String>,
    tried: Vec<CandidateOutcome>,
    progress: Progress,
}

impl ContactState {
    fn new(contact: Contact, candidates: Vec<String>) -> Self {
        Self {
            contact,
            candidates,
            tried: Vec::new(),
            progress: Progress::Pending { index: 0 },
        }
    }

    /// Index of the next candidate to verify, if any remains within budget.
    fn next_index(&self, max_combos: usize) -> Option<usize> {
        match self.progress {
            Progress::Pending { index } if index < max_combos && index < self.candidates.len() => {
                Some(index)
            }
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.progress, Progress::Terminal(_))
    }

    /// Records a response for the candidate at `index` and advances.
    ///
    /// Returns true when the contact became terminal.
    fn apply(
        &mut self,
        index: usize,
        response: &VerificationResponse,
        predicate: &dyn MissingMxPredicate,
        max_combos: usize,
    ) -> bool {
        let candidate = &self.candidates[index];
        self.tried.push(response.to_outcome());

        if let Some(outcome) = step_outcome(index, candidate, response, predicate) {
            debug!(
                row_id = self.contact.row_id,
                index,
                status = %outcome.status,
                "contact resolved by step"
            );
            self.progress = Progress::Terminal(outcome);
            return true;
        }

        let next = index + 1;
        self.progress = Progress::Pending { index: next };
        if next >= max_combos || next >= self.candidates.len() {
            self.finalize();
            return true;
        }
        false
    }

    /// Applies the exhaustion policy if the contact is still pending.
    fn finalize(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        let outcome = exhaustion_outcome(&self.candidates, &self.tried);
        debug!(
            row_id = self.contact.row_id,
            tried = self.tried.len(),
            status = %outcome.status,
            "contact exhausted"
        );
        self.progress = Progress::Terminal(outcome);
        true
    }

    fn result(&self) -> ContactResult {
        let outcome = match &self.progress {
            Progress::Terminal(outcome) => outcome.clone(),
            Progress::Pending { .. } => exhaustion_outcome(&self.candidates, &self.tried),
        };
        ContactResult {
            contact: self.contact.clone(),
            best_email: outcome.best_email,
            status: outcome.status,
            details: outcome.details,
            results_per_combo: self.tried.clone(),
        }
    }
}

/// Drives candidate verification for a batch of contacts.
pub struct ComboScheduler {
    verifier: Arc<dyn Verifier>,
    generator: Arc<dyn CandidateGenerator>,
    predicate: Arc<dyn MissingMxPredicate>,
    max_combos: usize,
    wave_size: usize,
}

impl std::fmt::Debug for ComboScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComboScheduler")
            .field("max_combos", &self.max_combos)
            .field("wave_size", &self.wave_size)
            .finish_non_exhaustive()
    }
}

impl ComboScheduler {
    /// Creates a scheduler with default budget, wave size and no-MX heuristic.
    #[must_use]
    pub fn new(verifier: Arc<dyn Verifier>, generator: Arc<dyn CandidateGenerator>) -> Self {
        Self {
            verifier,
            generator,
            predicate: Arc::new(SubstringMxHeuristic),
            max_combos: DEFAULT_MAX_COMBOS,
            wave_size: DEFAULT_WAVE_SIZE,
        }
    }

    /// Sets the per-contact candidate budget.
    #[must_use]
    pub fn with_max_combos(mut self, max_combos: usize) -> Self {
        self.max_combos = max_combos;
        self
    }

    /// Sets the wave size. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_wave_size(mut self, wave_size: usize) -> Self {
        self.wave_size = wave_size.max(1);
        self
    }

    /// Replaces the no-MX predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn MissingMxPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    #[must_use]
    pub fn max_combos(&self) -> usize {
        self.max_combos
    }

    #[must_use]
    pub fn wave_size(&self) -> usize {
        self.wave_size
    }

    /// Runs every contact to a terminal state.
    ///
    /// Each terminal result is sent once on `notify` as soon as it is
    /// decided. The returned vector is in the same order as `contacts`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Credential`] when the verifier cannot obtain
    /// a key. Results already decided have been sent on `notify`; no further
    /// wave is started.
    #[instrument(skip_all, fields(contacts = contacts.len(), wave_size = self.wave_size, max_combos = self.max_combos))]
    pub async fn run(
        &self,
        contacts: Vec<Contact>,
        notify: Option<mpsc::Sender<ContactResult>>,
    ) -> Result<Vec<ContactResult>, SchedulerError> {
        let mut states: Vec<ContactState> = contacts
            .into_iter()
            .map(|contact| {
                let candidates = self.generator.generate(&contact);
                debug!(
                    row_id = contact.row_id,
                    candidates = candidates.len(),
                    "initialized contact"
                );
                ContactState::new(contact, candidates)
            })
            .collect();

        info!("starting combo scheduler");

        // Contacts with nothing to try are decided up front.
        for state in &mut states {
            if state.next_index(self.max_combos).is_none() && state.finalize() {
                send_result(notify.as_ref(), state.result()).await;
            }
        }

        let mut wave_number = 0_usize;
        loop {
            let wave: Vec<(usize, &mut ContactState)> = states
                .iter_mut()
                .filter_map(|state| state.next_index(self.max_combos).map(|index| (index, state)))
                .take(self.wave_size)
                .collect();

            if wave.is_empty() {
                break;
            }
            wave_number += 1;
            debug!(wave = wave_number, size = wave.len(), "dispatching wave");

            let verifier = self.verifier.as_ref();
            let responses = join_all(wave.iter().map(|(index, state)| {
                let email = state.candidates[*index].clone();
                async move { verifier.verify(&email).await }
            }))
            .await;

            let mut fatal = None;
            for ((index, state), response) in wave.into_iter().zip(responses) {
                match response {
                    Ok(response) => {
                        if state.apply(index, &response, self.predicate.as_ref(), self.max_combos)
                        {
                            send_result(notify.as_ref(), state.result()).await;
                        }
                    }
                    Err(error) => {
                        if fatal.is_none() {
                            fatal = Some(error);
                        }
                    }
                }
            }

            if let Some(source) = fatal {
                let completed = states.iter().filter(|state| state.is_terminal()).count();
                warn!(
                    completed,
                    error = %source,
                    "credential failure, stopping scheduler"
                );
                return Err(SchedulerError::Credential { source, completed });
            }
        }

        // Only reachable for contacts that are pending but out of budget.
        for state in &mut states {
            if state.finalize() {
                send_result(notify.as_ref(), state.result()).await;
            }
        }

        info!(waves = wave_number, "combo scheduler finished");
        Ok(states.iter().map(ContactState::result).collect())
    }
}

async fn send_result(notify: Option<&mpsc::Sender<ContactResult>>, result: ContactResult) {
    let Some(sender) = notify else {
        return;
    };
    if sender.send(result).await.is_err() {
        warn!("result receiver dropped, continuing without notifications");
    }
}
