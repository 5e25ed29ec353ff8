//! Configuration for fleetdeck.
//!
//! Loaded from `~/.fleetdeck/config.yaml` (or `--config`). A missing file
//! yields defaults; a malformed one is an error rather than a silent reset.
//!
//! ```yaml
//! default_tenant: acme
//! tenants:
//!   acme:
//!     base_url: https://fleet.acme.example/api
//!     api_key_env: ACME_FLEET_KEY
//! tui:
//!   queue_capacity: 48
//!   retry:
//!     max_attempts: 3
//!     backoff_ms: 250
//!   error_storm:
//!     threshold: 5
//!     window_ms: 2000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::logging::{env_flag, fleetdeck_home};

/// Environment variable forcing reduced motion regardless of flags.
pub const REDUCED_MOTION_ENV_VAR: &str = "FLEETDECK_REDUCED_MOTION";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tenant used when `--tenant` is not given
    pub default_tenant: Option<String>,

    /// Known tenants by id
    pub tenants: BTreeMap<String, TenantConfig>,

    /// Terminal session tuning
    pub tui: TuiConfig,
}

/// Connection settings for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// API base URL
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "FLEETDECK_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

/// Terminal session tuning.
///
/// Every threshold here is an operational default, not a protocol constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuiConfig {
    /// Input queue capacity before the oldest event is dropped
    pub queue_capacity: usize,

    /// Remote call retry policy
    pub retry: RetrySettings,

    /// Per-screen rendering circuit breaker
    pub render_fallback: RepeatSettings,

    /// Session-wide error circuit breaker
    pub error_storm: RepeatSettings,

    /// Snapshot interval for headless follow mode
    pub follow_interval_ms: u64,

    /// Repaint/tick interval for the interactive session
    pub tick_ms: u64,

    /// Disable startup animation
    pub reduced_motion: bool,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 48,
            retry: RetrySettings::default(),
            render_fallback: RepeatSettings {
                threshold: 3,
                window_ms: 2000,
            },
            error_storm: RepeatSettings {
                threshold: 5,
                window_ms: 2000,
            },
            follow_interval_ms: 5000,
            tick_ms: 250,
            reduced_motion: false,
        }
    }
}

impl TuiConfig {
    /// Reduced motion from config or the `FLEETDECK_REDUCED_MOTION` override.
    pub fn reduced_motion_effective(&self) -> bool {
        self.reduced_motion || env_flag(REDUCED_MOTION_ENV_VAR)
    }

    /// Tick interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }
}

/// Retry budget for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Backoff unit; the delay before attempt `n + 1` is `n * backoff_ms`
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

/// Windowed repeat detection settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RepeatSettings {
    /// Repeat count that trips the breaker
    pub threshold: u32,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RepeatSettings {
    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Config {
    /// Default config file path (`~/.fleetdeck/config.yaml`).
    pub fn default_path() -> Result<PathBuf> {
        Ok(fleetdeck_home()?.join("config.yaml"))
    }

    /// Load from `path` (or the default path). A missing file yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| FleetError::io("reading config", &path, e))?;
        Self::from_yaml(&contents, &path)
    }

    /// Parse and validate YAML contents.
    pub fn from_yaml(contents: &str, path: &Path) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|e| FleetError::config_invalid(path, &e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.tui.queue_capacity == 0 {
            return Err(FleetError::validation("tui.queue_capacity must be at least 1"));
        }
        if self.tui.retry.max_attempts == 0 {
            return Err(FleetError::validation("tui.retry.max_attempts must be at least 1"));
        }
        for (name, settings) in [
            ("render_fallback", self.tui.render_fallback),
            ("error_storm", self.tui.error_storm),
        ] {
            if settings.threshold < 2 {
                return Err(FleetError::validation(format!(
                    "tui.{name}.threshold must be at least 2"
                )));
            }
        }
        if let Some(tenant) = &self.default_tenant
            && !self.tenants.contains_key(tenant)
        {
            return Err(FleetError::UnknownTenant {
                tenant: tenant.clone(),
            });
        }
        Ok(())
    }

    /// Resolve the tenant to use: explicit choice, then `default_tenant`,
    /// then the only configured tenant.
    pub fn resolve_tenant(&self, requested: Option<&str>) -> Result<Option<(String, TenantConfig)>> {
        if let Some(id) = requested {
            return match self.tenants.get(id) {
                Some(tenant) => Ok(Some((id.to_string(), tenant.clone()))),
                None => Err(FleetError::UnknownTenant {
                    tenant: id.to_string(),
                }),
            };
        }
        if let Some(id) = &self.default_tenant
            && let Some(tenant) = self.tenants.get(id)
        {
            return Ok(Some((id.clone(), tenant.clone())));
        }
        if self.tenants.len() == 1 {
            return Ok(self
                .tenants
                .iter()
                .next()
                .map(|(id, tenant)| (id.clone(), tenant.clone())));
        }
        Ok(None)
    }
}
