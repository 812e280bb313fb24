//! Mailbox verification.
//!
//! A [`Verifier`] checks one candidate address per call. Transport and HTTP
//! failures are folded into the returned [`VerificationResponse`] so that a
//! single bad candidate never stops a contact; only a failure to obtain a
//! key is surfaced as an `Err`.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contact::CandidateOutcome;
use crate::credential::CredentialError;

pub use client::{DEFAULT_MAILTESTER_BASE_URL, MailTesterClient};

/// Verifier code meaning the mailbox was confirmed.
pub const CODE_OK: &str = "ok";

/// Verifier message meaning the domain accepts every address.
pub const MESSAGE_CATCH_ALL: &str = "Catch-All";

/// True when a verifier message marks the domain as Catch-All.
#[must_use]
pub fn is_catch_all_message(message: Option<&str>) -> bool {
    message == Some(MESSAGE_CATCH_ALL)
}

/// Outcome of one verification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub email: String,
    /// Verifier code; empty strings are normalized to `None`.
    pub code: Option<String>,
    /// Verifier message; empty strings are normalized to `None`.
    pub message: Option<String>,
    /// Full verifier body, or `Value::Null` when none was received.
    pub raw: Value,
    /// Transport or HTTP failure text.
    pub error: Option<String>,
}

impl VerificationResponse {
    /// Builds a response from a decoded verifier body.
    #[must_use]
    pub fn from_body(email: impl Into<String>, raw: Value) -> Self {
        Self {
            email: email.into(),
            code: non_empty_str(raw.get("code")),
            message: non_empty_str(raw.get("message")),
            raw,
            error: None,
        }
    }

    /// Builds a response for a call that failed before a usable body arrived.
    #[must_use]
    pub fn failed(email: impl Into<String>, error: impl Into<String>, raw: Value) -> Self {
        Self {
            email: email.into(),
            code: None,
            message: None,
            raw,
            error: Some(error.into()),
        }
    }

    /// True when the verifier confirmed the mailbox.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code.as_deref() == Some(CODE_OK)
    }

    /// True when the verifier reported the domain as Catch-All.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        is_catch_all_message(self.message.as_deref())
    }

    /// The append-only record kept per tried candidate.
    #[must_use]
    pub fn to_outcome(&self) -> CandidateOutcome {
        CandidateOutcome {
            email: self.email.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
            error: self.error.clone(),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Checks one address against a verification service.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verifies `email`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] only when no key could be obtained.
    /// Every other failure is reported inside the response.
    async fn verify(&self, email: &str) -> Result<VerificationResponse, CredentialError>;
}
