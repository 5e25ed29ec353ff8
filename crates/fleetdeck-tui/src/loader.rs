//! Retrying loader with classified degradation.
//!
//! [`RetryingLoader::load`] never fails. A failed remote call yields the
//! caller's fallback value together with the classified connection state,
//! so screens can render partial data and an inline status instead of
//! crashing.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetdeck_api::{FleetApi, ScriptedFleetApi};
//! use fleetdeck_tui::loader::{RetryPolicy, RetryingLoader};
//!
//! # async fn example() {
//! let api: Arc<dyn FleetApi> = Arc::new(ScriptedFleetApi::demo());
//! let loader = RetryingLoader::new(RetryPolicy::default());
//! let outcome = loader
//!     .load("devices", Vec::new(), || {
//!         let api = api.clone();
//!         async move { api.list_devices("acme").await }
//!     })
//!     .await;
//! println!("{} devices ({})", outcome.data.len(), outcome.state);
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use fleetdeck_api::ApiError;
use fleetdeck_core::config::RetrySettings;

use crate::connectivity::{ClassifiedError, ConnectionState, classify};

/// Retry budget for one load.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Backoff unit; the delay after attempt `n` is `n * backoff`.
    pub backoff: Duration,
    /// Random spread applied to each delay, as a fraction of it (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
            jitter: 0.0,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: Duration::from_millis(settings.backoff_ms),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries. Used for operations that must not repeat.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Linear backoff: `attempt * backoff`, spread by the jitter fraction.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_secs_f64() * f64::from(attempt.max(1));
        let spread = base * self.jitter;
        if spread <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let mut rng = rand::rng();
        let jitter = rng.random_range(-spread..spread);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}

/// Retry bookkeeping reported with every outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryState {
    pub attempts: u32,
    pub retried: bool,
}

impl RetryState {
    /// Combine two loads: maximum attempts, retried if either was.
    pub fn merge(self, other: RetryState) -> RetryState {
        RetryState {
            attempts: self.attempts.max(other.attempts),
            retried: self.retried || other.retried,
        }
    }
}

/// Result of a load. `data` is the real payload or the fallback.
#[derive(Debug, Clone)]
pub struct LoadOutcome<T> {
    pub data: T,
    pub state: ConnectionState,
    pub error: Option<ClassifiedError>,
    pub retry: RetryState,
}

impl<T> LoadOutcome<T> {
    /// An outcome that has not been loaded yet.
    pub fn pending(data: T) -> Self {
        Self {
            data,
            state: ConnectionState::NotChecked,
            error: None,
            retry: RetryState::default(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Status without the payload.
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            state: self.state,
            error: self.error.clone(),
            retry: self.retry,
        }
    }
}

/// Connection status of one or more loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSummary {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    pub retry: RetryState,
}

impl OutcomeSummary {
    /// Fold several loads into one status: the worst state, the error that
    /// produced it, the highest attempt count, and retried if any retried.
    pub fn aggregate<'a>(summaries: impl IntoIterator<Item = &'a OutcomeSummary>) -> OutcomeSummary {
        let mut combined: Option<OutcomeSummary> = None;
        for summary in summaries {
            combined = Some(match combined {
                None => summary.clone(),
                Some(acc) => {
                    let retry = acc.retry.merge(summary.retry);
                    let worse = if summary.state > acc.state { summary } else { &acc };
                    OutcomeSummary {
                        state: worse.state,
                        error: worse.error.clone().or_else(|| acc.error.clone()),
                        retry,
                    }
                }
            });
        }
        combined.unwrap_or_default()
    }

    /// Inline status text, e.g. "Timed out (3 attempts)".
    pub fn status_text(&self) -> String {
        let mut text = self.state.label().to_string();
        if self.retry.retried {
            text.push_str(&format!(" ({} attempts)", self.retry.attempts));
        }
        text
    }
}

/// Published before each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub label: String,
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: ClassifiedError,
}

impl fmt::Display for RetryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Retrying {} ({}/{}) in {}ms: {}",
            self.label,
            self.attempt + 1,
            self.max_attempts,
            self.delay.as_millis(),
            self.error.state.label()
        )
    }
}

/// Callback receiving [`RetryNotice`]s.
pub type RetryObserver = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

/// Loader that retries transient failures and degrades on the rest.
#[derive(Clone, Default)]
pub struct RetryingLoader {
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryingLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingLoader")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryingLoader {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: None,
        }
    }

    /// Publish retry notices to `observer`.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Load with the loader's default policy.
    pub async fn load<T, F, Fut>(&self, label: &str, fallback: T, operation: F) -> LoadOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let policy = self.policy.clone();
        self.load_with(&policy, label, fallback, operation).await
    }

    /// Load with an explicit policy.
    ///
    /// Retriable failures are retried with linear backoff until the attempt
    /// budget runs out. Anything else stops immediately. Either way the
    /// fallback is returned with the classified state.
    pub async fn load_with<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        fallback: T,
        mut operation: F,
    ) -> LoadOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = policy.attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(data) => {
                    if attempts > 1 {
                        info!(label, attempts, "Load succeeded after retry");
                    }
                    return LoadOutcome {
                        data,
                        state: ConnectionState::Connected,
                        error: None,
                        retry: RetryState {
                            attempts,
                            retried: attempts > 1,
                        },
                    };
                }
                Err(err) => {
                    let classified = classify(&err);

                    if classified.retriable && attempts < max_attempts {
                        let delay = policy.delay_for_attempt(attempts);
                        debug!(
                            label,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            state = classified.state.as_str(),
                            "Load failed, retrying with backoff"
                        );
                        if let Some(observer) = &self.observer {
                            observer(&RetryNotice {
                                label: label.to_string(),
                                attempt: attempts,
                                max_attempts,
                                delay,
                                error: classified.clone(),
                            });
                        }
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    warn!(
                        label,
                        attempts,
                        state = classified.state.as_str(),
                        error = %classified.message,
                        "Load failed, using fallback"
                    );
                    return LoadOutcome {
                        data: fallback,
                        state: classified.state,
                        error: Some(classified),
                        retry: RetryState {
                            attempts,
                            retried: attempts > 1,
                        },
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default().with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(750));
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let loader = RetryingLoader::new(fast_policy(3));
        let outcome = loader
            .load("devices", 0, || async { Ok::<_, ApiError>(7) })
            .await;
        assert_eq!(outcome.data, 7);
        assert_eq!(outcome.state, ConnectionState::Connected);
        assert_eq!(outcome.retry, RetryState { attempts: 1, retried: false });
    }

    #[tokio::test]
    async fn test_retries_network_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = notices.clone();
        let loader = RetryingLoader::new(fast_policy(3)).with_observer(Arc::new(move |n| {
            sink.lock().unwrap().push(n.attempt);
        }));

        let counter = calls.clone();
        let outcome = loader
            .load("tickets", Vec::<u32>::new(), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(ApiError::Network("reset".into()))
                    } else {
                        Ok(vec![1, 2])
                    }
                }
            })
            .await;

        assert_eq!(outcome.data, vec![1, 2]);
        assert_eq!(outcome.retry, RetryState { attempts: 3, retried: true });
        assert_eq!(*notices.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_fallback() {
        let loader = RetryingLoader::new(fast_policy(2));
        let outcome = loader
            .load("incidents", vec!["cached"], || async {
                Err::<Vec<&str>, _>(ApiError::Timeout(20))
            })
            .await;

        assert_eq!(outcome.data, vec!["cached"]);
        assert_eq!(outcome.state, ConnectionState::Timeout);
        assert_eq!(outcome.retry.attempts, 2);
        assert!(outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let loader = RetryingLoader::new(fast_policy(5));
        let outcome = loader
            .load("devices", 0u32, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Auth("expired".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.state, ConnectionState::AuthRequired);
        assert!(!outcome.retry.retried);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let loader = RetryingLoader::new(fast_policy(0));
        let outcome = loader.load("x", 0, || async { Ok::<_, ApiError>(1) }).await;
        assert_eq!(outcome.data, 1);
    }

    #[test]
    fn test_aggregate_takes_worst() {
        let ok = OutcomeSummary {
            state: ConnectionState::Connected,
            error: None,
            retry: RetryState { attempts: 1, retried: false },
        };
        let slow = OutcomeSummary {
            state: ConnectionState::Timeout,
            error: Some(classify(&ApiError::Timeout(20))),
            retry: RetryState { attempts: 3, retried: true },
        };
        let limited = OutcomeSummary {
            state: ConnectionState::RateLimited,
            error: Some(classify(&ApiError::from_status(429, ""))),
            retry: RetryState { attempts: 2, retried: true },
        };

        let combined = OutcomeSummary::aggregate([&ok, &slow, &limited]);
        assert_eq!(combined.state, ConnectionState::Timeout);
        assert_eq!(combined.error.as_ref().map(|e| e.state), Some(ConnectionState::Timeout));
        assert_eq!(combined.retry, RetryState { attempts: 3, retried: true });
        assert_eq!(combined.status_text(), "Timed out (3 attempts)");
    }

    #[test]
    fn test_aggregate_network_error_beats_rate_limited() {
        let ok = OutcomeSummary {
            state: ConnectionState::Connected,
            error: None,
            retry: RetryState { attempts: 1, retried: false },
        };
        let down = OutcomeSummary {
            state: ConnectionState::NetworkError,
            error: Some(classify(&ApiError::Network("connection refused".into()))),
            retry: RetryState { attempts: 3, retried: true },
        };
        let limited = OutcomeSummary {
            state: ConnectionState::RateLimited,
            error: Some(classify(&ApiError::from_status(429, ""))),
            retry: RetryState { attempts: 2, retried: true },
        };

        let combined = OutcomeSummary::aggregate([&ok, &down, &limited]);
        assert_eq!(combined.state, ConnectionState::NetworkError);
        assert_eq!(combined.error.as_ref().map(|e| e.state), Some(ConnectionState::NetworkError));
    }

    #[test]
    fn test_aggregate_empty_is_not_checked() {
        let combined = OutcomeSummary::aggregate(std::iter::empty());
        assert_eq!(combined.state, ConnectionState::NotChecked);
    }
}
