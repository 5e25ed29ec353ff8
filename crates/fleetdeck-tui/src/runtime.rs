//! Per-screen refresh lifecycle.
//!
//! [`ScreenRuntime`] guarantees that a screen runs at most one refresh at a
//! time, that any number of refresh requests arriving during a load
//! collapse into a single follow-up run, and that results arriving after
//! the screen was unmounted are discarded without touching its state.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

/// Lifecycle state shown in headers and snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    #[default]
    Idle,
    Loading,
    Retrying,
    Error,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Loading => "loading",
            RefreshState::Retrying => "retrying",
            RefreshState::Error => "error",
        }
    }
}

/// Observable refresh status of one screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub refresh_in_flight: bool,
    pub refresh_queued: bool,
    pub stale_discarded_count: u64,
    pub last_error: Option<String>,
    pub reason: Option<String>,
}

/// What a [`ScreenRuntime::run_refresh`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Loaded and applied
    Completed,
    /// Applied, but the payload reported a failure
    Failed(String),
    /// Another refresh was running; this request was folded into it
    Coalesced,
    /// The screen was unmounted while loading; nothing was applied
    Discarded,
}

/// Loaded data that may carry its own failure.
///
/// Loaders degrade instead of failing, so a refresh applies its payload
/// either way and only the runtime state reflects the error.
pub trait RefreshPayload {
    fn refresh_error(&self) -> Option<String>;
}

impl<T, E: fmt::Display> RefreshPayload for Result<T, E> {
    fn refresh_error(&self) -> Option<String> {
        self.as_ref().err().map(|e| e.to_string())
    }
}

/// Callback receiving every status change.
pub type StatusObserver = Arc<dyn Fn(&str, &RefreshStatus) + Send + Sync>;

#[derive(Debug, Default)]
struct RuntimeInner {
    status: RefreshStatus,
    mount_token: u64,
    refresh_token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tokens {
    mount: u64,
    refresh: u64,
}

/// Refresh coordinator for one screen.
#[derive(Clone)]
pub struct ScreenRuntime {
    name: Arc<str>,
    inner: Arc<Mutex<RuntimeInner>>,
    observer: Option<StatusObserver>,
}

impl fmt::Debug for ScreenRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenRuntime")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl ScreenRuntime {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(RuntimeInner::default())),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: StatusObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, status: &RefreshStatus) {
        if let Some(observer) = &self.observer {
            observer(&self.name, status);
        }
    }

    pub fn status(&self) -> RefreshStatus {
        self.lock().status.clone()
    }

    /// Load and apply fresh data.
    ///
    /// If a refresh is already running, the request is recorded and this
    /// call returns [`RefreshOutcome::Coalesced`] immediately; the running
    /// call loads once more when its current load finishes. The result of a
    /// load is only applied if the screen has not been unmounted meanwhile.
    pub async fn run_refresh<T, L, Fut, A>(
        &self,
        reason: &str,
        mut load: L,
        mut apply: A,
    ) -> RefreshOutcome
    where
        T: RefreshPayload,
        L: FnMut() -> Fut,
        Fut: Future<Output = T>,
        A: FnMut(T),
    {
        if !self.begin(reason) {
            return RefreshOutcome::Coalesced;
        }

        loop {
            let tokens = self.next_tokens();
            let payload = load().await;

            let error = payload.refresh_error();
            if !self.accept(tokens, error.as_deref()) {
                return RefreshOutcome::Discarded;
            }

            apply(payload);

            let outcome = match error {
                Some(message) => RefreshOutcome::Failed(message),
                None => RefreshOutcome::Completed,
            };

            if !self.finish_or_rerun(tokens) {
                return outcome;
            }
        }
    }

    /// Claim the refresh slot, or record a coalesced request.
    fn begin(&self, reason: &str) -> bool {
        let (status, started) = {
            let mut inner = self.lock();
            inner.status.reason = Some(reason.to_string());
            if inner.status.refresh_in_flight {
                inner.status.refresh_queued = true;
                inner.status.state = RefreshState::Retrying;
                (inner.status.clone(), false)
            } else {
                inner.status.refresh_in_flight = true;
                inner.status.state = RefreshState::Loading;
                (inner.status.clone(), true)
            }
        };
        debug!(screen = %self.name, reason, started, "Refresh requested");
        self.publish(&status);
        started
    }

    fn next_tokens(&self) -> Tokens {
        let mut inner = self.lock();
        inner.refresh_token += 1;
        Tokens {
            mount: inner.mount_token,
            refresh: inner.refresh_token,
        }
    }

    fn is_current(inner: &RuntimeInner, tokens: Tokens) -> bool {
        inner.mount_token == tokens.mount && inner.refresh_token == tokens.refresh
    }

    /// Record a finished load. Returns false when it went stale.
    fn accept(&self, tokens: Tokens, error: Option<&str>) -> bool {
        let (status, current) = {
            let mut inner = self.lock();
            if Self::is_current(&inner, tokens) {
                match error {
                    Some(message) => {
                        inner.status.state = RefreshState::Error;
                        inner.status.last_error = Some(message.to_string());
                    }
                    None => {
                        inner.status.state = RefreshState::Idle;
                        inner.status.last_error = None;
                    }
                }
                (inner.status.clone(), true)
            } else {
                inner.status.stale_discarded_count += 1;
                (inner.status.clone(), false)
            }
        };
        if !current {
            debug!(
                screen = %self.name,
                stale_discarded = status.stale_discarded_count,
                "Discarded stale refresh result"
            );
        }
        self.publish(&status);
        current
    }

    /// Release the slot, or consume a queued request. Returns true to rerun.
    fn finish_or_rerun(&self, tokens: Tokens) -> bool {
        let (status, rerun) = {
            let mut inner = self.lock();
            if !Self::is_current(&inner, tokens) {
                // Unmounted during apply; the slot was already reset.
                return false;
            }
            if inner.status.refresh_queued {
                inner.status.refresh_queued = false;
                inner.status.state = RefreshState::Retrying;
                (inner.status.clone(), true)
            } else {
                inner.status.refresh_in_flight = false;
                (inner.status.clone(), false)
            }
        };
        self.publish(&status);
        rerun
    }

    /// Invalidate everything in flight. Called when the screen unmounts.
    pub fn cancel_pending_for_unmount(&self) {
        let status = {
            let mut inner = self.lock();
            inner.mount_token += 1;
            inner.refresh_token += 1;
            inner.status.refresh_in_flight = false;
            inner.status.refresh_queued = false;
            inner.status.state = RefreshState::Idle;
            inner.status.clone()
        };
        debug!(screen = %self.name, "Cancelled pending refresh for unmount");
        self.publish(&status);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Notify;

    use super::*;

    type Payload = Result<u32, String>;

    async fn wait_in_flight(runtime: &ScreenRuntime) {
        while !runtime.status().refresh_in_flight {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_refresh_applies_result() {
        let runtime = ScreenRuntime::new("devices");
        let mut applied = Vec::new();
        let outcome = runtime
            .run_refresh("initial", || async { Ok::<u32, String>(3) }, |p: Payload| {
                applied.push(p)
            })
            .await;
        assert_eq!(outcome, RefreshOutcome::Completed);
        assert_eq!(applied, vec![Ok(3)]);

        let status = runtime.status();
        assert_eq!(status.state, RefreshState::Idle);
        assert!(!status.refresh_in_flight);
        assert_eq!(status.reason.as_deref(), Some("initial"));
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_rerun() {
        let runtime = ScreenRuntime::new("devices");
        let calls = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(Notify::new());

        let first = {
            let runtime = runtime.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                runtime
                    .run_refresh(
                        "initial",
                        move || {
                            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                            let gate = gate.clone();
                            async move {
                                if n == 1 {
                                    gate.notified().await;
                                }
                                Ok::<u32, String>(n)
                            }
                        },
                        |_: Payload| {},
                    )
                    .await
            })
        };

        wait_in_flight(&runtime).await;
        for _ in 0..5 {
            let outcome = runtime
                .run_refresh("manual", || async { Ok::<u32, String>(0) }, |_: Payload| {})
                .await;
            assert_eq!(outcome, RefreshOutcome::Coalesced);
        }
        let status = runtime.status();
        assert!(status.refresh_queued);
        assert_eq!(status.state, RefreshState::Retrying);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), RefreshOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let status = runtime.status();
        assert!(!status.refresh_in_flight);
        assert!(!status.refresh_queued);
        assert_eq!(status.state, RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_unmount_discards_stale_result() {
        let runtime = ScreenRuntime::new("spaces");
        let gate = Arc::new(Notify::new());
        let applied = Arc::new(AtomicU32::new(0));

        let pending = {
            let runtime = runtime.clone();
            let gate = gate.clone();
            let applied = applied.clone();
            tokio::spawn(async move {
                runtime
                    .run_refresh(
                        "initial",
                        move || {
                            let gate = gate.clone();
                            async move {
                                gate.notified().await;
                                Ok::<u32, String>(1)
                            }
                        },
                        move |_: Payload| {
                            applied.fetch_add(1, Ordering::SeqCst);
                        },
                    )
                    .await
            })
        };

        wait_in_flight(&runtime).await;
        let before = runtime.lock().mount_token;
        runtime.cancel_pending_for_unmount();
        assert_eq!(runtime.lock().mount_token, before + 1);
        assert!(!runtime.status().refresh_in_flight);

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), RefreshOutcome::Discarded);
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.status().stale_discarded_count, 1);
        assert_eq!(runtime.status().state, RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_failed_payload_sets_error_state() {
        let runtime = ScreenRuntime::new("tickets");
        let outcome = runtime
            .run_refresh(
                "initial",
                || async { Err::<u32, String>("Timed out".into()) },
                |_: Payload| {},
            )
            .await;
        assert_eq!(outcome, RefreshOutcome::Failed("Timed out".into()));
        let status = runtime.status();
        assert_eq!(status.state, RefreshState::Error);
        assert_eq!(status.last_error.as_deref(), Some("Timed out"));

        runtime
            .run_refresh("manual", || async { Ok::<u32, String>(1) }, |_: Payload| {})
            .await;
        assert_eq!(runtime.status().last_error, None);
    }

    #[tokio::test]
    async fn test_observer_sees_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runtime = ScreenRuntime::new("dashboard").with_observer(Arc::new(move |name, status| {
            assert_eq!(name, "dashboard");
            sink.lock().unwrap().push(status.state);
        }));
        runtime
            .run_refresh("initial", || async { Ok::<u32, String>(1) }, |_: Payload| {})
            .await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&RefreshState::Loading));
        assert_eq!(seen.last(), Some(&RefreshState::Idle));
    }
}
