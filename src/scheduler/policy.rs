//! Per-step and exhaustion decisions for a single contact.

use serde_json::Value;

use crate::contact::{CandidateOutcome, ResultDetails, StatusCode};
use crate::verify::{VerificationResponse, is_catch_all_message};

/// Reason recorded when the first candidate reveals an undeliverable domain.
pub const REASON_MISSING_MX: &str = "Domain missing MX records";

/// Reason recorded when every tried candidate was Catch-All.
pub const REASON_ALL_CATCH_ALL: &str = "All candidates returned Catch-All";

/// Reason recorded when nothing could be confirmed.
pub const REASON_ALL_REJECTED: &str = "All candidates rejected or unverifiable";

/// Candidate index used as the Catch-All default (first-name-only pattern).
pub const CATCH_ALL_DEFAULT_INDEX: usize = 2;

/// Decides whether a verifier response means the domain has no mail exchanger.
pub trait MissingMxPredicate: Send + Sync {
    /// Returns true when `response` indicates a domain without MX records.
    fn is_missing_mx(&self, response: &VerificationResponse) -> bool;
}

/// Default no-MX detection by substring match over the response fields.
///
/// A field matches when, lower-cased, it contains `mx` together with one of
/// `no `, `not `, `missing` or `without`. Checked fields: `code`, `message`,
/// `raw.code`, `raw.message`, `raw.reason` and `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMxHeuristic;

impl MissingMxPredicate for SubstringMxHeuristic {
    fn is_missing_mx(&self, response: &VerificationResponse) -> bool {
        let raw_field = |name: &str| response.raw.get(name).and_then(Value::as_str);

        [
            response.code.as_deref(),
            response.message.as_deref(),
            raw_field("code"),
            raw_field("message"),
            raw_field("reason"),
            response.error.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(contains_no_mx_signal)
    }
}

fn contains_no_mx_signal(value: &str) -> bool {
    let normalized = value.to_lowercase();
    normalized.contains("mx")
        && ["no ", "not ", "missing", "without"]
            .iter()
            .any(|marker| normalized.contains(marker))
}

/// Terminal decision for a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalOutcome {
    pub status: StatusCode,
    pub best_email: Option<String>,
    pub details: ResultDetails,
}

/// Applies the step rules to the response for the candidate at `index`.
///
/// Returns `None` when the contact should advance to its next candidate.
/// The no-MX check only applies to the first candidate and takes precedence
/// over a confirmed address.
#[must_use]
pub fn step_outcome(
    index: usize,
    candidate: &str,
    response: &VerificationResponse,
    predicate: &dyn MissingMxPredicate,
) -> Option<TerminalOutcome> {
    if index == 0 && predicate.is_missing_mx(response) {
        return Some(TerminalOutcome {
            status: StatusCode::NotFoundValidEmails,
            best_email: None,
            details: ResultDetails::reason(REASON_MISSING_MX),
        });
    }

    if response.is_ok() {
        return Some(TerminalOutcome {
            status: StatusCode::Valid,
            best_email: Some(candidate.to_string()),
            details: ResultDetails {
                code: response.code.clone(),
                message: response.message.clone(),
                ..ResultDetails::default()
            },
        });
    }

    None
}

/// Decides the outcome for a contact that ran out of candidates or budget.
#[must_use]
pub fn exhaustion_outcome(candidates: &[String], tried: &[CandidateOutcome]) -> TerminalOutcome {
    let all_catch_all = !tried.is_empty()
        && tried
            .iter()
            .all(|outcome| is_catch_all_message(outcome.message.as_deref()));

    if all_catch_all {
        let best_email = candidates
            .get(CATCH_ALL_DEFAULT_INDEX)
            .or_else(|| candidates.first())
            .cloned();
        return TerminalOutcome {
            status: StatusCode::CatchallDefault,
            best_email,
            details: ResultDetails::reason(REASON_ALL_CATCH_ALL),
        };
    }

    let first_error = tried.iter().find_map(|outcome| outcome.error.clone());
    TerminalOutcome {
        status: StatusCode::NotFoundValidEmails,
        best_email: None,
        details: ResultDetails {
            reason: Some(REASON_ALL_REJECTED.to_string()),
            last_error: first_error,
            ..ResultDetails::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(code: Option<&str>, message: Option<&str>) -> VerificationResponse {
        VerificationResponse {
            email: "x@y.io".to_string(),
            code: code.map(str::to_string),
            message: message.map(str::to_string),
            raw: Value::Null,
            error: None,
        }
    }

    fn outcome(message: Option<&str>, error: Option<&str>) -> CandidateOutcome {
        CandidateOutcome {
            email: "x@y.io".to_string(),
            code: None,
            message: message.map(str::to_string),
            error: error.map(str::to_string),
        }
    }

    fn candidates(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}@y.io")).collect()
    }

    #[test]
    fn test_substring_heuristic_matches_signals() {
        let heuristic = SubstringMxHeuristic;
        assert!(heuristic.is_missing_mx(&response(Some("ko"), Some("No MX records"))));
        assert!(heuristic.is_missing_mx(&response(None, Some("domain without mx"))));
        assert!(heuristic.is_missing_mx(&response(Some("MX missing"), None)));
        assert!(heuristic.is_missing_mx(&response(None, Some("MX not found"))));
    }

    #[test]
    fn test_substring_heuristic_rejects_partial_signals() {
        let heuristic = SubstringMxHeuristic;
        assert!(!heuristic.is_missing_mx(&response(Some("ko"), Some("Catch-All"))));
        assert!(!heuristic.is_missing_mx(&response(None, Some("MX ok"))));
        assert!(!heuristic.is_missing_mx(&response(None, Some("no mailbox"))));
        // "not" without a trailing space is not a marker.
        assert!(!heuristic.is_missing_mx(&response(None, Some("mx-notfound"))));
    }

    #[test]
    fn test_substring_heuristic_checks_raw_and_error() {
        let heuristic = SubstringMxHeuristic;
        let mut from_raw = response(None, None);
        from_raw.raw = json!({"reason": "No MX for domain"});
        assert!(heuristic.is_missing_mx(&from_raw));

        let mut from_error = response(None, None);
        from_error.error = Some("lookup failed: no mx".to_string());
        assert!(heuristic.is_missing_mx(&from_error));
    }

    #[test]
    fn test_step_outcome_valid() {
        let outcome = step_outcome(
            1,
            "c1@y.io",
            &response(Some("ok"), Some("Accepted")),
            &SubstringMxHeuristic,
        )
        .unwrap();
        assert_eq!(outcome.status, StatusCode::Valid);
        assert_eq!(outcome.best_email.as_deref(), Some("c1@y.io"));
        assert_eq!(outcome.details.code.as_deref(), Some("ok"));
        assert_eq!(outcome.details.message.as_deref(), Some("Accepted"));
    }

    #[test]
    fn test_step_outcome_no_mx_only_at_first_index() {
        let no_mx = response(Some("ko"), Some("No MX records"));
        let first = step_outcome(0, "c0@y.io", &no_mx, &SubstringMxHeuristic).unwrap();
        assert_eq!(first.status, StatusCode::NotFoundValidEmails);
        assert_eq!(first.details.reason.as_deref(), Some(REASON_MISSING_MX));

        assert!(step_outcome(1, "c1@y.io", &no_mx, &SubstringMxHeuristic).is_none());
    }

    #[test]
    fn test_step_outcome_no_mx_wins_over_ok() {
        let ok_but_no_mx = response(Some("ok"), Some("no mx record"));
        let outcome = step_outcome(0, "c0@y.io", &ok_but_no_mx, &SubstringMxHeuristic).unwrap();
        assert_eq!(outcome.status, StatusCode::NotFoundValidEmails);
        assert_eq!(outcome.best_email, None);
    }

    #[test]
    fn test_step_outcome_advances_otherwise() {
        assert!(
            step_outcome(
                0,
                "c0@y.io",
                &response(Some("ko"), Some("Rejected")),
                &SubstringMxHeuristic
            )
            .is_none()
        );
    }

    #[test]
    fn test_exhaustion_all_catch_all_picks_index_two() {
        let tried: Vec<_> = (0..4).map(|_| outcome(Some("Catch-All"), None)).collect();
        let result = exhaustion_outcome(&candidates(4), &tried);
        assert_eq!(result.status, StatusCode::CatchallDefault);
        assert_eq!(result.best_email.as_deref(), Some("c2@y.io"));
        assert_eq!(result.details.reason.as_deref(), Some(REASON_ALL_CATCH_ALL));
    }

    #[test]
    fn test_exhaustion_catch_all_falls_back_to_first() {
        let tried = vec![outcome(Some("Catch-All"), None), outcome(Some("Catch-All"), None)];
        let result = exhaustion_outcome(&candidates(2), &tried);
        assert_eq!(result.best_email.as_deref(), Some("c0@y.io"));
    }

    #[test]
    fn test_exhaustion_mixed_records_first_error() {
        let tried = vec![
            outcome(Some("Catch-All"), None),
            outcome(None, Some("timeout")),
            outcome(None, Some("HTTP 500")),
        ];
        let result = exhaustion_outcome(&candidates(3), &tried);
        assert_eq!(result.status, StatusCode::NotFoundValidEmails);
        assert_eq!(result.best_email, None);
        assert_eq!(result.details.reason.as_deref(), Some(REASON_ALL_REJECTED));
        assert_eq!(result.details.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_exhaustion_with_nothing_tried() {
        let result = exhaustion_outcome(&[], &[]);
        assert_eq!(result.status, StatusCode::NotFoundValidEmails);
        assert_eq!(result.details.last_error, None);
    }

    #[test]
    fn test_exhaustion_catch_all_matches_response_check() {
        for message in ["Catch-All", "catch-all", "Catch-All domain"] {
            let recorded = response(Some("mb"), Some(message));
            let tried = vec![recorded.to_outcome()];
            let result = exhaustion_outcome(&candidates(1), &tried);
            assert_eq!(
                result.status == StatusCode::CatchallDefault,
                recorded.is_catch_all(),
                "{message}"
            );
        }
    }
}
