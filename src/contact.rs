//! Contact inputs, status codes and per-contact result payloads.
//!
//! Rows arrive as loosely-typed records (`firstName`, `lastName`, `domain`
//! plus any number of extra columns). [`sanitize_rows`] cleans the name and
//! domain fields, drops rows that are entirely blank, and assigns each
//! surviving row its stable zero-based `row_id`. Rows without a domain or
//! without any name are kept for output but marked as skipped; the rest
//! carry a runnable [`Contact`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Skip reason for rows without a usable domain.
pub const SKIP_MISSING_DOMAIN: &str = "Missing website/domain";

/// Skip reason for rows without first and last name.
pub const SKIP_MISSING_NAMES: &str = "Missing first and last name";

/// A contact eligible for enrichment.
///
/// `row_id` is assigned once at ingestion and is the only ordering key used
/// downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub row_id: usize,
}

impl Contact {
    /// Creates a contact from already-cleaned fields.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        domain: impl Into<String>,
        row_id: usize,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            domain: domain.into(),
            row_id,
        }
    }
}

/// A raw input record as read from a contacts file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRow {
    #[serde(default, alias = "first_name", alias = "firstname", alias = "first")]
    pub first_name: Option<String>,
    #[serde(default, alias = "last_name", alias = "lastname", alias = "last")]
    pub last_name: Option<String>,
    #[serde(
        default,
        alias = "website",
        alias = "company_domain",
        alias = "companyDomain"
    )]
    pub domain: Option<String>,
    /// Any other columns, carried through to the output untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A cleaned input row with its assigned `row_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedRow {
    pub row_id: usize,
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Present when the row can be enriched.
    pub contact: Option<Contact>,
    /// Present when the row was skipped at ingestion.
    pub skip_reason: Option<&'static str>,
}

impl SanitizedRow {
    /// Returns the row's columns in output form: the three core fields
    /// followed by the extra columns in key order.
    #[must_use]
    pub fn columns(&self) -> Vec<(String, String)> {
        let mut columns = vec![
            ("firstName".to_string(), self.first_name.clone()),
            ("lastName".to_string(), self.last_name.clone()),
            ("domain".to_string(), self.domain.clone()),
        ];
        columns.extend(
            self.extra
                .iter()
                .map(|(key, value)| (key.clone(), json_cell(value))),
        );
        columns
    }
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cleans a single input row.
///
/// Returns `None` when first name, last name and domain are all blank; such
/// rows are dropped before `row_id` assignment.
#[must_use]
pub fn sanitize_row(row_id: usize, row: &InputRow) -> Option<SanitizedRow> {
    let first_name = clean_name(row.first_name.as_deref());
    let last_name = clean_name(row.last_name.as_deref());
    let domain = clean_domain(row.domain.as_deref());

    if first_name.is_empty() && last_name.is_empty() && domain.is_empty() {
        return None;
    }

    let skip_reason = if domain.is_empty() {
        Some(SKIP_MISSING_DOMAIN)
    } else if first_name.is_empty() && last_name.is_empty() {
        Some(SKIP_MISSING_NAMES)
    } else {
        None
    };

    let contact = skip_reason
        .is_none()
        .then(|| Contact::new(&first_name, &last_name, &domain, row_id));

    Some(SanitizedRow {
        row_id,
        first_name,
        last_name,
        domain,
        extra: row.extra.clone(),
        contact,
        skip_reason,
    })
}

/// Cleans all rows, dropping blank ones and assigning sequential `row_id`s.
#[must_use]
pub fn sanitize_rows(rows: &[InputRow]) -> Vec<SanitizedRow> {
    let mut sanitized = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(clean) = sanitize_row(sanitized.len(), row) {
            sanitized.push(clean);
        } else {
            debug!("dropping blank input row");
        }
    }
    sanitized
}

/// Trims a name and collapses inner whitespace runs.
fn clean_name(raw: Option<&str>) -> String {
    raw.unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduces a website, URL or address to a bare lowercase host.
///
/// `https://www.Acme.com/about` and `jane@acme.com` both become `acme.com`.
/// Returns an empty string when no host can be extracted.
fn clean_domain(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let candidate = trimmed.rsplit('@').next().unwrap_or(trimmed);
    let with_scheme = if candidate.contains("://") {
        candidate.to_string()
    } else {
        format!("http://{candidate}")
    };

    let host = url::Url::parse(&with_scheme)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .unwrap_or_default();

    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Terminal status of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The verifier confirmed one candidate.
    Valid,
    /// Every tried candidate came back Catch-All; a default pattern was picked.
    CatchallDefault,
    /// No candidate could be confirmed, or the domain cannot receive mail.
    NotFoundValidEmails,
    /// The contact could not be processed.
    Error,
    /// Assigned at ingestion to rows that never enter the scheduler.
    SkippedMissingFields,
}

impl StatusCode {
    /// Returns the stable wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::CatchallDefault => "catchall_default",
            Self::NotFoundValidEmails => "not_found_valid_emails",
            Self::Error => "error",
            Self::SkippedMissingFields => "skipped_missing_fields",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verification attempt, appended in attempt order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub email: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Diagnostic detail attached to a terminal result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ResultDetails {
    /// Details carrying only a reason.
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Terminal payload for one contact, delivered exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub contact: Contact,
    pub best_email: Option<String>,
    pub status: StatusCode,
    pub details: ResultDetails,
    pub results_per_combo: Vec<CandidateOutcome>,
}

impl ContactResult {
    /// Builds an `error` result for a contact that produced no terminal outcome.
    #[must_use]
    pub fn error(contact: Contact, reason: impl Into<String>) -> Self {
        Self {
            contact,
            best_email: None,
            status: StatusCode::Error,
            details: ResultDetails::reason(reason),
            results_per_combo: Vec::new(),
        }
    }
}

/// Derives the one-line summary used in output rows: the verifier message
/// when present, else the reason, else empty.
#[must_use]
pub fn message_summary(details: &ResultDetails) -> &str {
    details
        .message
        .as_deref()
        .or(details.reason.as_deref())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(first: &str, last: &str, domain: &str) -> InputRow {
        InputRow {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            domain: Some(domain.to_string()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_clean_domain_strips_scheme_www_and_path() {
        assert_eq!(
            clean_domain(Some("https://www.Acme.com/about")),
            "acme.com"
        );
        assert_eq!(clean_domain(Some("acme.io")), "acme.io");
        assert_eq!(clean_domain(Some("  WWW.acme.io:8080 ")), "acme.io");
        assert_eq!(clean_domain(Some("jane@acme.com")), "acme.com");
        assert_eq!(clean_domain(Some("   ")), "");
        assert_eq!(clean_domain(None), "");
    }

    #[test]
    fn test_clean_name_collapses_whitespace() {
        assert_eq!(clean_name(Some("  Mary   Ann ")), "Mary Ann");
        assert_eq!(clean_name(None), "");
    }

    #[test]
    fn test_sanitize_row_runnable() {
        let sanitized = sanitize_row(4, &row(" Jane ", "Doe", "https://acme.com")).unwrap();
        assert_eq!(sanitized.row_id, 4);
        assert_eq!(sanitized.skip_reason, None);
        assert_eq!(
            sanitized.contact,
            Some(Contact::new("Jane", "Doe", "acme.com", 4))
        );
    }

    #[test]
    fn test_sanitize_row_missing_domain_is_skipped() {
        let sanitized = sanitize_row(0, &row("Jane", "Doe", "")).unwrap();
        assert_eq!(sanitized.skip_reason, Some(SKIP_MISSING_DOMAIN));
        assert!(sanitized.contact.is_none());
    }

    #[test]
    fn test_sanitize_row_missing_names_is_skipped() {
        let sanitized = sanitize_row(0, &row("", " ", "acme.com")).unwrap();
        assert_eq!(sanitized.skip_reason, Some(SKIP_MISSING_NAMES));
    }

    #[test]
    fn test_sanitize_row_single_name_is_runnable() {
        let sanitized = sanitize_row(0, &row("", "Doe", "acme.com")).unwrap();
        assert!(sanitized.contact.is_some());
    }

    #[test]
    fn test_sanitize_rows_drops_blank_rows_before_assigning_ids() {
        let rows = vec![
            row("Jane", "Doe", "acme.com"),
            row("", "", ""),
            row("John", "Roe", "beta.io"),
        ];
        let sanitized = sanitize_rows(&rows);
        assert_eq!(sanitized.len(), 2);
        assert_eq!(sanitized[1].row_id, 1);
        assert_eq!(sanitized[1].first_name, "John");
    }

    #[test]
    fn test_input_row_deserializes_aliases_and_extra_columns() {
        let json = r#"{"first_name":"Jane","lastName":"Doe","website":"acme.com","title":"CTO","age":41}"#;
        let parsed: InputRow = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_name.as_deref(), Some("Jane"));
        assert_eq!(parsed.domain.as_deref(), Some("acme.com"));
        assert_eq!(parsed.extra.len(), 2);

        let sanitized = sanitize_row(0, &parsed).unwrap();
        let columns = sanitized.columns();
        assert_eq!(columns[3], ("age".to_string(), "41".to_string()));
        assert_eq!(columns[4], ("title".to_string(), "CTO".to_string()));
    }

    #[test]
    fn test_status_code_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StatusCode::NotFoundValidEmails).unwrap(),
            "\"not_found_valid_emails\""
        );
        assert_eq!(StatusCode::CatchallDefault.to_string(), "catchall_default");
    }

    #[test]
    fn test_message_summary_prefers_message_then_reason() {
        let details = ResultDetails {
            reason: Some("r".to_string()),
            message: Some("m".to_string()),
            ..ResultDetails::default()
        };
        assert_eq!(message_summary(&details), "m");
        assert_eq!(message_summary(&ResultDetails::reason("r")), "r");
        assert_eq!(message_summary(&ResultDetails::default()), "");
    }

    #[test]
    fn test_contact_result_serializes_camel_case() {
        let result = ContactResult::error(Contact::new("A", "B", "c.io", 0), "boom");
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("bestEmail").is_some());
        assert!(value.get("resultsPerCombo").is_some());
        assert_eq!(value["details"]["reason"], "boom");
        assert!(value["details"].get("lastError").is_none());
    }
}
