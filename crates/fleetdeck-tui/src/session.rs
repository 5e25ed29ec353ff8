//! Shared session context.
//!
//! One [`SessionContext`] is built at startup and passed explicitly to every
//! screen and task. It carries the tenant scope, the API client, the retry
//! loader, the readiness cache and the session-wide error storm guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use fleetdeck_api::FleetApi;
use fleetdeck_core::TuiConfig;

use crate::connectivity::ConnectionState;
use crate::guard::{ErrorStormGuard, StormVerdict};
use crate::loader::{RetryObserver, RetryPolicy, RetryingLoader};

/// Tenant key used when no tenant is configured.
pub const DEFAULT_TENANT: &str = "default";

/// Animation preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Motion {
    pub animations: bool,
    pub reduced_motion: bool,
}

impl Motion {
    pub fn new(reduced_motion: bool) -> Self {
        Self {
            animations: !reduced_motion,
            reduced_motion,
        }
    }
}

impl Default for Motion {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Last observed connection state per tenant.
#[derive(Debug, Clone, Default)]
pub struct ReadinessCache {
    states: Arc<Mutex<HashMap<String, ConnectionState>>>,
}

impl ReadinessCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, tenant: &str, state: ConnectionState) {
        self.lock().insert(tenant.to_string(), state);
    }

    pub fn get(&self, tenant: &str) -> ConnectionState {
        self.lock().get(tenant).copied().unwrap_or_default()
    }
}

/// Context shared by all screens in a session.
#[derive(Clone)]
pub struct SessionContext {
    pub tenant_id: Option<String>,
    pub api: Arc<dyn FleetApi>,
    pub loader: RetryingLoader,
    pub readiness: ReadinessCache,
    pub motion: Motion,
    pub config: Arc<TuiConfig>,
    storm: Arc<Mutex<ErrorStormGuard>>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("tenant_id", &self.tenant_id)
            .field("api", &self.api.name())
            .field("motion", &self.motion)
            .finish()
    }
}

impl SessionContext {
    pub fn new(api: Arc<dyn FleetApi>, tenant_id: Option<String>, config: TuiConfig) -> Self {
        let motion = Motion::new(config.reduced_motion_effective());
        Self {
            tenant_id,
            api,
            loader: RetryingLoader::new(RetryPolicy::from(&config.retry)),
            readiness: ReadinessCache::default(),
            motion,
            storm: Arc::new(Mutex::new(ErrorStormGuard::new(config.error_storm))),
            config: Arc::new(config),
        }
    }

    /// Override reduced motion (`--no-motion`).
    pub fn with_reduced_motion(mut self, reduced: bool) -> Self {
        if reduced {
            self.motion = Motion::new(true);
        }
        self
    }

    /// Route retry notices to `observer`.
    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.loader = self.loader.clone().with_observer(observer);
        self
    }

    pub fn with_loader(mut self, loader: RetryingLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Tenant scope for API calls.
    pub fn tenant_key(&self) -> String {
        self.tenant_id.clone().unwrap_or_else(|| DEFAULT_TENANT.to_string())
    }

    /// Record the outcome of a load for the active tenant.
    pub fn record_readiness(&self, state: ConnectionState) {
        self.readiness.record(&self.tenant_key(), state);
    }

    pub fn readiness(&self) -> ConnectionState {
        self.readiness.get(&self.tenant_key())
    }

    /// Report an unhandled error to the session-wide storm guard.
    pub fn report_error(&self, message: &str) -> StormVerdict {
        self.storm
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .report(message)
    }
}

#[cfg(test)]
mod tests {
    use fleetdeck_api::ScriptedFleetApi;

    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new(
            Arc::new(ScriptedFleetApi::demo()),
            Some("acme".into()),
            TuiConfig::default(),
        )
    }

    #[test]
    fn test_readiness_per_tenant() {
        let ctx = ctx();
        assert_eq!(ctx.readiness(), ConnectionState::NotChecked);
        ctx.record_readiness(ConnectionState::Timeout);
        assert_eq!(ctx.readiness(), ConnectionState::Timeout);
        assert_eq!(ctx.readiness.get("other"), ConnectionState::NotChecked);
    }

    #[test]
    fn test_readiness_survives_poisoned_lock() {
        let cache = ReadinessCache::default();
        cache.record("acme", ConnectionState::RateLimited);

        let states = cache.states.clone();
        let crashed = std::thread::spawn(move || {
            let _held = states.lock().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(crashed.is_err());
        assert!(cache.states.is_poisoned());

        assert_eq!(cache.get("acme"), ConnectionState::RateLimited);
        cache.record("acme", ConnectionState::Connected);
        assert_eq!(cache.get("acme"), ConnectionState::Connected);
    }

    #[test]
    fn test_storm_guard_shared_between_clones() {
        let ctx = ctx();
        let clone = ctx.clone();
        for _ in 0..4 {
            assert!(matches!(ctx.report_error("boom"), StormVerdict::Continue { .. }));
        }
        assert!(matches!(clone.report_error("boom"), StormVerdict::Shutdown { .. }));
    }

    #[test]
    fn test_tenant_key_default() {
        let ctx = SessionContext::new(Arc::new(ScriptedFleetApi::new()), None, TuiConfig::default());
        assert_eq!(ctx.tenant_key(), DEFAULT_TENANT);
    }

    #[test]
    #[serial_test::serial]
    fn test_reduced_motion_from_env() {
        // SAFETY: serialized test
        unsafe { std::env::set_var(fleetdeck_core::config::REDUCED_MOTION_ENV_VAR, "true") };
        let reduced = ctx();
        unsafe { std::env::remove_var(fleetdeck_core::config::REDUCED_MOTION_ENV_VAR) };
        assert!(reduced.motion.reduced_motion);
        assert_eq!(crate::brand::startup_frames(reduced.motion).len(), 1);
    }

    #[test]
    fn test_reduced_motion_override() {
        let ctx = ctx().with_reduced_motion(true);
        assert!(ctx.motion.reduced_motion);
        assert!(!ctx.motion.animations);
    }
}
