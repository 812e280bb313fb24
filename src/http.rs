//! Shared HTTP client construction for the key provider and verifier.

use std::time::Duration;

use reqwest::Client;

/// Connect timeout applied to every outbound client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/enricher";

/// User-Agent sent on provider and verifier requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("enricher/{version} (+{PROJECT_UA_URL})")
}

/// Builds a client with gzip, the shared User-Agent and the given request
/// timeout.
///
/// # Errors
///
/// Returns the underlying `reqwest::Error` when the TLS backend or system
/// configuration cannot be initialized.
pub(crate) fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(default_user_agent())
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(request_timeout)
        .gzip(true)
        .build()
}
