//! Error types for credential acquisition.

use thiserror::Error;

/// Fatal failures while obtaining a verification key.
///
/// Any of these aborts the scheduler run; per-candidate verification
/// failures are never reported through this type.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The provider could not be reached (DNS, connect, timeout, TLS).
    #[error("Failed to retrieve MailTester key: network error contacting {url}: {source}")]
    Network {
        /// Provider URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status other than 429.
    #[error("Failed to retrieve MailTester key: HTTP {status} from {url}")]
    HttpStatus {
        /// Provider URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The provider body was not valid JSON.
    #[error("Failed to retrieve MailTester key: invalid response body from {url}: {source}")]
    InvalidBody {
        /// Provider URL.
        url: String,
        /// Decode error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered without a key and without a wait signal.
    #[error("Failed to retrieve MailTester key: key provider response missing subscription key")]
    MissingKey,

    /// An earlier fetch in this run failed; the provider was not asked again.
    #[error("{reason}")]
    Unavailable {
        /// Message of the original failure.
        reason: String,
    },

    /// An HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_fetch_prefix() {
        let missing = CredentialError::MissingKey.to_string();
        assert!(missing.starts_with("Failed to retrieve MailTester key:"));

        let status = CredentialError::HttpStatus {
            url: "http://provider/key".to_string(),
            status: 500,
        };
        assert_eq!(
            status.to_string(),
            "Failed to retrieve MailTester key: HTTP 500 from http://provider/key"
        );
    }

    #[test]
    fn test_unavailable_repeats_original_message() {
        let original = CredentialError::MissingKey;
        let repeated = CredentialError::Unavailable {
            reason: original.to_string(),
        };
        assert_eq!(repeated.to_string(), original.to_string());
    }
}
