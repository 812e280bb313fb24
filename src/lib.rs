//! Enricher Core Library
//!
//! This library provides the core functionality for the enricher tool, which
//! turns lists of contacts (first name, last name, company domain) into
//! verified email addresses by generating candidate patterns and checking
//! each one against an external mailbox-verification service.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`contact`] - Contact inputs, sanitization, status codes and result payloads
//! - [`patterns`] - Ordered candidate address generation
//! - [`credential`] - Rotating verification key lease and request pacing gate
//! - [`verify`] - Verification client for the MailTester endpoint
//! - [`scheduler`] - Per-contact state machines advanced in bounded waves
//! - [`snapshot`] - Input-ordered output over append-only sinks
//! - [`progress`] - Running status counts for progress reporting
//! - [`enrich`] - End-to-end pipeline wiring the pieces together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod contact;
pub mod credential;
pub mod enrich;
mod http;
pub mod patterns;
pub mod progress;
pub mod scheduler;
pub mod snapshot;
pub mod verify;

// Re-export commonly used types
pub use contact::{
    CandidateOutcome, Contact, ContactResult, InputRow, ResultDetails, SanitizedRow, StatusCode,
    message_summary, sanitize_row, sanitize_rows,
};
pub use credential::{
    CredentialError, CredentialGate, CredentialLease, HttpKeyProvider, KeyProvider, KeyResponse,
};
pub use enrich::{
    EnrichError, EnrichOptions, EnrichmentJob, EnrichmentReport, RowOutcome, build_column_order,
    process_contacts_in_batches,
};
pub use patterns::{CandidateGenerator, PatternGenerator};
pub use progress::{ProgressSnapshot, ProgressTracker, StatusBucket};
pub use scheduler::{
    ComboScheduler, DEFAULT_MAX_COMBOS, DEFAULT_WAVE_SIZE, MissingMxPredicate, SchedulerError,
    SubstringMxHeuristic,
};
pub use snapshot::{
    AppendSink, CsvFileSink, MemorySink, OrderedWriter, OutputRow, SnapshotError, Submitted,
};
pub use verify::{MailTesterClient, VerificationResponse, Verifier};
