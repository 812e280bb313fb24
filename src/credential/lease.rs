//! Key lease and interpretation of key provider answers.
//!
//! The provider answers with a loosely-shaped JSON object. A key may appear
//! under `key`, `subscriptionId` or `id`, as a string or a number, sometimes
//! wrapped in braces. When no key is free the provider asks the caller to
//! come back later, either with `status: "wait"` or with one of several
//! millisecond hint fields.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Fields that may carry the key, in lookup order.
const KEY_FIELDS: [&str; 3] = ["key", "subscriptionId", "id"];

/// Fields that may carry a wait hint in milliseconds, in lookup order.
const WAIT_FIELDS: [&str; 5] = [
    "waitForMs",
    "waitMs",
    "retryAfterMs",
    "retryInMs",
    "nextRequestAllowedInMs",
];

/// Wait applied when the provider signals "wait" without a usable duration.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(1000);

/// Maximum Retry-After value honored from a 429 answer.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// A verification key plus the pacing hints the provider attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialLease {
    /// Normalized key (braces and surrounding whitespace removed).
    pub key: String,
    /// Suggested minimum spacing between verifier calls.
    pub avg_request_interval_ms: Option<u64>,
    /// Provider-reported time at which the next request is allowed.
    pub next_request_allowed_at: Option<String>,
    /// Full provider answer.
    pub raw: Value,
}

impl CredentialLease {
    /// Creates a lease with no pacing hints.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            avg_request_interval_ms: None,
            next_request_allowed_at: None,
            raw: Value::Null,
        }
    }

    /// Minimum spacing the verifier should respect for this lease.
    #[must_use]
    pub fn request_interval(&self, floor: Duration) -> Duration {
        self.avg_request_interval_ms
            .map_or(floor, |ms| floor.max(Duration::from_millis(ms)))
    }
}

/// What to do with one provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyDecision {
    /// A key was issued.
    Lease(CredentialLease),
    /// No key yet; try again after the given duration.
    Wait(Duration),
    /// No key and no wait signal.
    Missing,
}

/// Interprets a successful provider body.
#[must_use]
#[instrument(level = "debug", skip(body))]
pub fn interpret_body(body: &Value) -> KeyDecision {
    if let Some(key) = extract_key(body) {
        let avg_request_interval_ms = body.get("avgRequestIntervalMs").and_then(positive_millis);
        let next_request_allowed_at = body
            .get("nextRequestAllowedAt")
            .filter(|value| !value.is_null())
            .map(value_text);

        if avg_request_interval_ms.is_some() || next_request_allowed_at.is_some() {
            debug!(
                avg_request_interval_ms,
                next_request_allowed_at = next_request_allowed_at.as_deref(),
                "key provider pacing hints"
            );
        }

        return KeyDecision::Lease(CredentialLease {
            key,
            avg_request_interval_ms,
            next_request_allowed_at,
            raw: body.clone(),
        });
    }

    if is_wait_signal(body) {
        return KeyDecision::Wait(wait_duration(body));
    }

    KeyDecision::Missing
}

/// Pulls the key from the first present key field.
///
/// Only the first non-null field is considered; an empty value there means
/// no key even if a later field is populated.
#[must_use]
pub fn extract_key(body: &Value) -> Option<String> {
    let raw = KEY_FIELDS
        .iter()
        .find_map(|field| body.get(*field).filter(|value| !value.is_null()))?;

    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let key: String = text.replace(['{', '}'], "").trim().to_string();
    (!key.is_empty()).then_some(key)
}

/// True when the provider asked the caller to wait.
#[must_use]
pub fn is_wait_signal(body: &Value) -> bool {
    let status_wait = body
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| status.eq_ignore_ascii_case("wait"));

    status_wait
        || WAIT_FIELDS
            .iter()
            .any(|field| body.get(*field).is_some_and(|value| !value.is_null()))
}

/// Wait duration from the first present hint field, or [`DEFAULT_WAIT`].
#[must_use]
pub fn wait_duration(body: &Value) -> Duration {
    WAIT_FIELDS
        .iter()
        .find_map(|field| body.get(*field).filter(|value| !value.is_null()))
        .and_then(positive_millis)
        .map_or(DEFAULT_WAIT, Duration::from_millis)
}

/// Coerces a number or numeric string into positive whole milliseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn positive_millis(value: &Value) -> Option<u64> {
    let millis = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    (millis.is_finite() && millis > 0.0).then(|| millis.ceil() as u64)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Accepts integer seconds or an HTTP-date. Negative or unparseable values
/// yield `None`; dates in the past yield zero; values above one hour are
/// capped.
#[must_use]
#[instrument(level = "debug")]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extract_key_field_precedence() {
        assert_eq!(
            extract_key(&json!({"key": "abc", "id": "zzz"})).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_key(&json!({"subscriptionId": "{sub-1}", "id": "zzz"})).as_deref(),
            Some("sub-1")
        );
        assert_eq!(extract_key(&json!({"id": 42})).as_deref(), Some("42"));
    }

    #[test]
    fn test_extract_key_strips_braces_and_whitespace() {
        assert_eq!(
            extract_key(&json!({"key": "  {ABC-123}  "})).as_deref(),
            Some("ABC-123")
        );
    }

    #[test]
    fn test_extract_key_first_present_field_wins_even_if_empty() {
        assert_eq!(extract_key(&json!({"key": "", "id": "zzz"})), None);
        assert_eq!(
            extract_key(&json!({"key": null, "id": "zzz"})).as_deref(),
            Some("zzz")
        );
        assert_eq!(extract_key(&json!({"key": "{}"})), None);
        assert_eq!(extract_key(&json!({})), None);
    }

    #[test]
    fn test_interpret_body_lease_with_pacing_hints() {
        let body = json!({
            "key": "abc",
            "avgRequestIntervalMs": "250",
            "nextRequestAllowedAt": "2026-01-01T00:00:00Z"
        });
        let KeyDecision::Lease(lease) = interpret_body(&body) else {
            panic!("expected lease");
        };
        assert_eq!(lease.key, "abc");
        assert_eq!(lease.avg_request_interval_ms, Some(250));
        assert_eq!(
            lease.next_request_allowed_at.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_interpret_body_key_wins_over_wait_signal() {
        let body = json!({"key": "abc", "status": "wait", "waitMs": 100});
        assert!(matches!(interpret_body(&body), KeyDecision::Lease(_)));
    }

    #[test]
    fn test_interpret_body_wait_status() {
        assert_eq!(
            interpret_body(&json!({"status": "wait", "waitForMs": 500})),
            KeyDecision::Wait(Duration::from_millis(500))
        );
        assert_eq!(
            interpret_body(&json!({"status": "WAIT"})),
            KeyDecision::Wait(DEFAULT_WAIT)
        );
    }

    #[test]
    fn test_interpret_body_wait_field_without_status() {
        assert_eq!(
            interpret_body(&json!({"retryInMs": "750"})),
            KeyDecision::Wait(Duration::from_millis(750))
        );
    }

    #[test]
    fn test_interpret_body_missing() {
        assert_eq!(
            interpret_body(&json!({"status": "ok"})),
            KeyDecision::Missing
        );
    }

    #[test]
    fn test_wait_duration_uses_first_present_field() {
        let body = json!({"waitMs": 300, "waitForMs": 200, "retryAfterMs": 900});
        assert_eq!(wait_duration(&body), Duration::from_millis(200));
    }

    #[test]
    fn test_wait_duration_defaults_on_invalid_hint() {
        assert_eq!(wait_duration(&json!({"waitMs": -5})), DEFAULT_WAIT);
        assert_eq!(wait_duration(&json!({"waitMs": "soon"})), DEFAULT_WAIT);
        assert_eq!(wait_duration(&json!({"waitMs": 0})), DEFAULT_WAIT);
        assert_eq!(wait_duration(&json!({})), DEFAULT_WAIT);
    }

    #[test]
    fn test_wait_duration_rounds_fractional_up() {
        assert_eq!(
            wait_duration(&json!({"waitMs": 0.4})),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_request_interval_takes_larger_of_floor_and_hint() {
        let mut lease = CredentialLease::new("k");
        assert_eq!(
            lease.request_interval(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );
        lease.avg_request_interval_ms = Some(1500);
        assert_eq!(
            lease.request_interval(Duration::from_millis(1000)),
            Duration::from_millis(1500)
        );
        lease.avg_request_interval_ms = Some(200);
        assert_eq!(
            lease.request_interval(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_parse_retry_after_seconds_and_cap() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("7200"), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );

        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let parsed = parse_retry_after(&httpdate::fmt_http_date(future)).unwrap();
        assert!(parsed >= Duration::from_secs(55) && parsed <= Duration::from_secs(61));
    }
}
