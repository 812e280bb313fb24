//! Rotating verification key lease and process-wide request pacing.
//!
//! The [`CredentialGate`] owns two pieces of shared state:
//!
//! - the current [`CredentialLease`], fetched lazily from a [`KeyProvider`]
//!   and replaced wholesale when the verifier rejects it;
//! - the time of the last throttled release, used to space out verifier
//!   calls across every concurrently processed contact.
//!
//! Both live behind `tokio::sync::Mutex`. The lease lock is held for the
//! whole fetch, so concurrent callers never trigger duplicate provider
//! requests; they wait and then see the freshly cached lease.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use enricher_core::credential::{CredentialGate, HttpKeyProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = HttpKeyProvider::new(
//!     "https://provider.example/key",
//!     Duration::from_secs(30),
//! )?;
//! let gate = Arc::new(CredentialGate::new(Arc::new(provider)));
//!
//! gate.throttle(Duration::from_millis(1000)).await;
//! let lease = gate.acquire().await?;
//! println!("using key {}", lease.key);
//! # Ok(())
//! # }
//! ```

mod error;
mod lease;
mod provider;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub use error::CredentialError;
pub use lease::{
    CredentialLease, DEFAULT_WAIT, KeyDecision, MAX_RETRY_AFTER, extract_key, interpret_body,
    is_wait_signal, parse_retry_after, wait_duration,
};
pub use provider::{DEFAULT_KEY_PROVIDER_URL, HttpKeyProvider, KeyProvider, KeyResponse};

/// What the gate currently holds.
#[derive(Debug)]
enum LeaseSlot {
    Empty,
    Active(Arc<CredentialLease>),
    /// A fatal fetch failure; later callers fail without asking the provider.
    Failed(String),
}

/// Shared key lease plus the global minimum-delay throttle.
///
/// Designed to be wrapped in `Arc` and shared by every verifier call in a
/// run.
pub struct CredentialGate {
    provider: Arc<dyn KeyProvider>,

    /// Current lease. Held across the provider fetch.
    lease: Mutex<LeaseSlot>,

    /// Time of the previous throttle release. `None` means the next call
    /// proceeds immediately.
    last_release: Mutex<Option<Instant>>,

    fetches: AtomicU64,
    waits: AtomicU64,
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate")
            .field("provider", &self.provider.endpoint())
            .field("fetches", &self.fetches.load(Ordering::SeqCst))
            .field("waits", &self.waits.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CredentialGate {
    /// Creates a gate with no cached lease.
    #[must_use]
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            lease: Mutex::new(LeaseSlot::Empty),
            last_release: Mutex::new(None),
            fetches: AtomicU64::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// Returns the cached lease, fetching one if none is cached.
    ///
    /// While the provider signals "wait" this sleeps for the advertised
    /// duration and asks again, with no upper bound on attempts.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when the provider is unreachable, answers
    /// with a non-success status other than 429, or answers without a key and
    /// without a wait signal. Once a fetch has failed, every later call
    /// returns [`CredentialError::Unavailable`] until [`reset`](Self::reset).
    #[instrument(skip(self), fields(provider = self.provider.endpoint()))]
    pub async fn acquire(&self) -> Result<Arc<CredentialLease>, CredentialError> {
        let mut guard = self.lease.lock().await;
        match &*guard {
            LeaseSlot::Active(lease) => return Ok(Arc::clone(lease)),
            LeaseSlot::Failed(reason) => {
                return Err(CredentialError::Unavailable {
                    reason: reason.clone(),
                });
            }
            LeaseSlot::Empty => {}
        }

        match self.fetch_lease().await {
            Ok(lease) => {
                let lease = Arc::new(lease);
                info!(
                    avg_request_interval_ms = lease.avg_request_interval_ms,
                    "verification key acquired"
                );
                *guard = LeaseSlot::Active(Arc::clone(&lease));
                Ok(lease)
            }
            Err(error) => {
                warn!(error = %error, "key fetch failed, gate closed until reset");
                *guard = LeaseSlot::Failed(error.to_string());
                Err(error)
            }
        }
    }

    async fn fetch_lease(&self) -> Result<CredentialLease, CredentialError> {
        loop {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let response = self.provider.fetch().await?;

            let decision = if response.is_rate_limited() {
                let wait = response
                    .retry_after
                    .as_deref()
                    .and_then(parse_retry_after)
                    .filter(|wait| !wait.is_zero())
                    .unwrap_or_else(|| wait_duration(&response.body));
                KeyDecision::Wait(wait)
            } else if response.is_success() {
                interpret_body(&response.body)
            } else {
                warn!(status = response.status, "key provider returned error status");
                return Err(CredentialError::HttpStatus {
                    url: self.provider.endpoint().to_string(),
                    status: response.status,
                });
            };

            match decision {
                KeyDecision::Lease(lease) => return Ok(lease),
                KeyDecision::Wait(wait) => {
                    let waits = self.waits.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(
                        wait_ms = wait.as_millis(),
                        waits, "key provider asked to wait"
                    );
                    tokio::time::sleep(wait).await;
                }
                KeyDecision::Missing => {
                    warn!("key provider response missing subscription key");
                    return Err(CredentialError::MissingKey);
                }
            }
        }
    }

    /// Drops the cached lease if it still holds `key`, so the next
    /// [`acquire`](Self::acquire) rotates to a fresh key.
    ///
    /// A lease that was already replaced by another caller is left alone.
    #[instrument(skip(self, key))]
    pub async fn invalidate(&self, key: &str) {
        let mut guard = self.lease.lock().await;
        if matches!(&*guard, LeaseSlot::Active(lease) if lease.key == key) {
            debug!("invalidating rejected verification key");
            *guard = LeaseSlot::Empty;
        }
    }

    /// Clears the cached lease, any recorded fetch failure and the throttle
    /// clock.
    pub async fn reset(&self) {
        *self.lease.lock().await = LeaseSlot::Empty;
        *self.last_release.lock().await = None;
        debug!("credential gate reset");
    }

    /// Waits until at least `min_delay` has passed since the previous
    /// release, then records a new release.
    ///
    /// Callers are released one at a time. The first call proceeds
    /// immediately.
    #[instrument(level = "debug", skip(self), fields(delay_ms = min_delay.as_millis()))]
    pub async fn throttle(&self, min_delay: Duration) {
        let mut last_release = self.last_release.lock().await;

        if let Some(previous) = *last_release {
            let elapsed = previous.elapsed();
            if elapsed < min_delay {
                let delay = min_delay.saturating_sub(elapsed);
                debug!(delay_ms = delay.as_millis(), "throttling verifier call");
                tokio::time::sleep(delay).await;
            }
        }

        *last_release = Some(Instant::now());
    }

    /// Number of provider requests made so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of provider "wait" answers honored so far.
    #[must_use]
    pub fn wait_count(&self) -> u64 {
        self.waits.load(Ordering::SeqCst)
    }
}
