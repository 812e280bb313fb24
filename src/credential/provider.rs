//! Key provider seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use tracing::{debug, instrument};

use super::error::CredentialError;
use crate::http::build_http_client;

/// Default key provider endpoint.
pub const DEFAULT_KEY_PROVIDER_URL: &str = "https://api.daddy-leads.com/mailtester/key/available";

/// One raw answer from a key provider.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyResponse {
    /// HTTP status code of the answer.
    pub status: u16,
    /// Parsed JSON body; `Value::Null` when the body was empty.
    pub body: Value,
    /// Raw `Retry-After` header, if any.
    pub retry_after: Option<String>,
}

impl KeyResponse {
    /// A 200 answer with the given body.
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            retry_after: None,
        }
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 429 Too Many Requests.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Source of verification keys.
///
/// Implementations perform exactly one request per call. Interpretation of
/// the answer (key, wait, missing) is left to the [`CredentialGate`].
///
/// [`CredentialGate`]: super::CredentialGate
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Fetches one answer from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] only when the provider could not be
    /// reached or its body could not be decoded.
    async fn fetch(&self) -> Result<KeyResponse, CredentialError>;

    /// Human-readable endpoint for logs and errors.
    fn endpoint(&self) -> &str;
}

/// Key provider reached over HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpKeyProvider {
    client: Client,
    url: String,
}

impl HttpKeyProvider {
    /// Creates a provider for the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Client`] when the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, CredentialError> {
        let client = build_http_client(request_timeout).map_err(CredentialError::Client)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeyProvider for HttpKeyProvider {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<KeyResponse, CredentialError> {
        let response =
            self.client
                .get(&self.url)
                .send()
                .await
                .map_err(|source| CredentialError::Network {
                    url: self.url.clone(),
                    source,
                })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|source| CredentialError::InvalidBody {
                url: self.url.clone(),
                source,
            })?;

        // Error statuses often carry HTML or plain text; only 2xx and 429
        // bodies are interpreted, so a non-JSON body degrades to Null.
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        debug!(status, has_retry_after = retry_after.is_some(), "key provider answered");
        Ok(KeyResponse {
            status,
            body,
            retry_after,
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
