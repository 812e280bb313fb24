//! HTTP verifier for the MailTester Ninja endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{VerificationResponse, Verifier};
use crate::credential::{CredentialError, CredentialGate, CredentialLease};
use crate::http::build_http_client;

/// Default verification endpoint.
pub const DEFAULT_MAILTESTER_BASE_URL: &str = "https://happy.mailtester.ninja/ninja";

/// Verifier that calls `GET {base}?email=..&key=..`.
///
/// Every call passes through the shared [`CredentialGate`]: a key is leased,
/// then the global throttle spaces the request by the larger of the
/// configured minimum delay and the lease's advertised interval. When the
/// endpoint rejects the key (401/403) the lease is invalidated and the call
/// is retried once with a fresh key.
#[derive(Debug, Clone)]
pub struct MailTesterClient {
    client: Client,
    base_url: String,
    gate: Arc<CredentialGate>,
    min_delay: Duration,
}

impl MailTesterClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Client`] when the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        gate: Arc<CredentialGate>,
        min_delay: Duration,
        request_timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let client = build_http_client(request_timeout).map_err(CredentialError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            gate,
            min_delay,
        })
    }

    /// Configured minimum delay between calls.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn request_url(&self, email: &str, key: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}email={}&key={}",
            self.base_url,
            urlencoding::encode(email),
            urlencoding::encode(key)
        )
    }

    /// Performs one paced request. `Err(status)` means the key was rejected.
    async fn attempt(
        &self,
        email: &str,
        lease: &CredentialLease,
    ) -> Result<VerificationResponse, StatusCode> {
        self.gate
            .throttle(lease.request_interval(self.min_delay))
            .await;

        let url = self.request_url(email, &lease.key);
        debug!(email, "requesting verification");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                let text = if error.is_timeout() {
                    "request timed out".to_string()
                } else {
                    // reqwest errors embed the URL, which carries the key.
                    error.without_url().to_string()
                };
                warn!(email, error = %text, "verification request failed");
                return Ok(VerificationResponse::failed(email, text, Value::Null));
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(status);
        }

        let body = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => {
                let text = error.without_url().to_string();
                warn!(email, error = %text, "failed reading verification body");
                return Ok(VerificationResponse::failed(email, text, Value::Null));
            }
        };
        let raw: Option<Value> = serde_json::from_slice(&body).ok();

        if !status.is_success() {
            warn!(email, status = status.as_u16(), "verifier returned error status");
            return Ok(VerificationResponse::failed(
                email,
                format!("HTTP {}", status.as_u16()),
                raw.unwrap_or(Value::Null),
            ));
        }

        let Some(raw) = raw else {
            warn!(email, "verifier returned a non-JSON body");
            return Ok(VerificationResponse::failed(
                email,
                "invalid JSON in verifier response",
                Value::Null,
            ));
        };

        let verification = VerificationResponse::from_body(email, raw);
        debug!(
            email,
            code = verification.code.as_deref(),
            message = verification.message.as_deref(),
            "verification response received"
        );
        Ok(verification)
    }
}

#[async_trait]
impl Verifier for MailTesterClient {
    #[instrument(skip(self))]
    async fn verify(&self, email: &str) -> Result<VerificationResponse, CredentialError> {
        let lease = self.gate.acquire().await?;
        match self.attempt(email, &lease).await {
            Ok(response) => Ok(response),
            Err(first_status) => {
                warn!(
                    status = first_status.as_u16(),
                    "verifier rejected key, rotating"
                );
                self.gate.invalidate(&lease.key).await;

                let fresh = self.gate.acquire().await?;
                match self.attempt(email, &fresh).await {
                    Ok(response) => Ok(response),
                    Err(status) => {
                        self.gate.invalidate(&fresh.key).await;
                        Ok(VerificationResponse::failed(
                            email,
                            format!("HTTP {}", status.as_u16()),
                            Value::Null,
                        ))
                    }
                }
            }
        }
    }
}
