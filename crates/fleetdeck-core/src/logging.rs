//! Logging infrastructure for fleetdeck.
//!
//! Structured logging using the `tracing` ecosystem. The terminal session
//! paints the screen and headless mode owns stdout, so file output is the
//! primary sink and the stderr layer is opt-in.
//!
//! ## Features
//!
//! - JSON lines written to `~/.fleetdeck/logs/fleetdeck.log` (daily rolling)
//! - Optional human-readable console output on stderr
//! - Debug event log: `--debug` or `FLEETDECK_TUI_DEBUG=1` records every
//!   input, dispatch, refresh and render transition under the
//!   `fleetdeck::tui` target
//!
//! ## Example
//!
//! ```no_run
//! use fleetdeck_core::logging::{self, LogOptions};
//!
//! let _guard = logging::init_logging(LogOptions::default()).expect("logging init");
//! tracing::info!("fleetdeck started");
//! fleetdeck_core::log_tui_event!("dispatch", outcome = "global");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{FleetError, Result};

/// Environment variable that enables the session debug event log.
pub const DEBUG_ENV_VAR: &str = "FLEETDECK_TUI_DEBUG";

/// Tracing target used by [`log_tui_event!`].
pub const TUI_EVENT_TARGET: &str = "fleetdeck::tui";

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Options for [`init_logging`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Custom log directory. Defaults to `~/.fleetdeck/logs/`.
    pub log_dir: Option<PathBuf>,
    /// Raise the default level to DEBUG.
    pub verbose: bool,
    /// Record session state-machine events (see [`log_tui_event!`]).
    pub debug_events: bool,
    /// Also log to stderr. Must stay off while a terminal session is painting.
    pub console: bool,
}

impl LogOptions {
    /// Whether the debug event log is enabled by flag or environment.
    pub fn debug_events_enabled(&self) -> bool {
        self.debug_events || env_flag(DEBUG_ENV_VAR)
    }
}

/// Initialize the fleetdeck logging system.
///
/// Returns a [`LogGuard`] that must be held for the application lifetime to
/// ensure logs are flushed on shutdown.
pub fn init_logging(options: LogOptions) -> Result<LogGuard> {
    let log_dir = match options.log_dir.clone() {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| FleetError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "fleetdeck.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let debug_events = options.debug_events_enabled();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(options.verbose, debug_events)));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = options.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_file(options.verbose)
            .with_line_number(options.verbose)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(
        log_dir = %log_dir.display(),
        verbose = options.verbose,
        debug_events,
        "logging initialized"
    );

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Build the default filter directive.
fn default_filter(verbose: bool, debug_events: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    let mut directive = format!("fleetdeck={level},fleetdeck_core={level},fleetdeck_api={level},fleetdeck_tui={level}");
    if debug_events {
        directive.push_str(&format!(",{TUI_EVENT_TARGET}=debug"));
    } else {
        directive.push_str(&format!(",{TUI_EVENT_TARGET}=off"));
    }
    directive
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Returns true if the named environment variable holds a truthy value.
///
/// `1`, `true`, `yes` and `on` (case-insensitive) are truthy.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Get the fleetdeck home directory (`~/.fleetdeck/`).
pub fn fleetdeck_home() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(FleetError::NoHomeDirectory)?;
    Ok(home.join(".fleetdeck"))
}

/// Get the default log directory path (`~/.fleetdeck/logs/`).
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(fleetdeck_home()?.join("logs"))
}

/// Record one session state-machine transition in the debug event log.
///
/// Events go to the `fleetdeck::tui` target at DEBUG level, which the default
/// filter only enables when the debug event log is switched on.
///
/// # Example
///
/// ```ignore
/// log_tui_event!("input", key = "Left", queue_depth = 2);
/// log_tui_event!("refresh", screen = "devices", state = "loading");
/// ```
#[macro_export]
macro_rules! log_tui_event {
    ($event:expr) => {
        tracing::debug!(
            target: "fleetdeck::tui",
            event = $event,
            "tui event"
        )
    };
    ($event:expr, $($field:tt)*) => {
        tracing::debug!(
            target: "fleetdeck::tui",
            event = $event,
            $($field)*,
            "tui event"
        )
    };
}
