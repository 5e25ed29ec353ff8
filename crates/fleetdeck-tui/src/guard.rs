//! Circuit breakers for repeated failures.
//!
//! Both breakers count consecutive identical messages inside a window that
//! starts at the first occurrence:
//!
//! - [`RenderFallbackGuard`] (per screen) swaps rich rendering for plain
//!   text lines after repeated render failures.
//! - [`ErrorStormGuard`] (per session) ends the session when the same error
//!   keeps coming back.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use fleetdeck_core::config::RepeatSettings;

use crate::panics;
use crate::scene::{RenderError, ScenePanel};
use crate::screen::Screen;

/// Tracks how often the same message repeats within a window.
#[derive(Debug, Clone)]
pub struct RepeatWindow {
    window: Duration,
    last_message: Option<String>,
    repeat_count: u32,
    window_start: Option<Instant>,
}

impl RepeatWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_message: None,
            repeat_count: 0,
            window_start: None,
        }
    }

    /// Record `message` at `now` and return its repeat count.
    ///
    /// A different message, or one arriving after the window has elapsed,
    /// restarts the count at 1.
    pub fn record_at(&mut self, message: &str, now: Instant) -> u32 {
        let same = self.last_message.as_deref() == Some(message);
        let in_window = self
            .window_start
            .is_some_and(|start| now.saturating_duration_since(start) <= self.window);

        if same && in_window {
            self.repeat_count += 1;
        } else {
            self.last_message = Some(message.to_string());
            self.repeat_count = 1;
            self.window_start = Some(now);
        }
        self.repeat_count
    }

    pub fn record(&mut self, message: &str) -> u32 {
        self.record_at(message, Instant::now())
    }

    pub fn reset(&mut self) {
        self.last_message = None;
        self.repeat_count = 0;
        self.window_start = None;
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }
}

// ============================================================================
// Render fallback
// ============================================================================

/// Per-screen rendering circuit breaker.
///
/// Once tripped, the screen renders through its plain fallback lines until
/// a successful refresh resets the breaker.
#[derive(Debug, Clone)]
pub struct RenderFallbackGuard {
    window: RepeatWindow,
    threshold: u32,
    fallback: bool,
}

impl Default for RenderFallbackGuard {
    fn default() -> Self {
        Self::new(RepeatSettings {
            threshold: 3,
            window_ms: 2000,
        })
    }
}

impl RenderFallbackGuard {
    pub fn new(settings: RepeatSettings) -> Self {
        Self {
            window: RepeatWindow::new(settings.window()),
            threshold: settings.threshold.max(1),
            fallback: false,
        }
    }

    /// Record a render failure at `now`. Returns true while in fallback mode.
    pub fn record_failure_at(&mut self, message: &str, now: Instant) -> bool {
        let count = self.window.record_at(message, now);
        if !self.fallback && count >= self.threshold {
            warn!(count, error = message, "Repeated render failures, switching to fallback");
            self.fallback = true;
        }
        self.fallback
    }

    pub fn record_failure(&mut self, message: &str) -> bool {
        self.record_failure_at(message, Instant::now())
    }

    /// Called when a refresh completes without error.
    pub fn reset(&mut self) {
        if self.fallback {
            info!("Render fallback cleared after successful refresh");
        }
        self.fallback = false;
        self.window.reset();
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn repeat_count(&self) -> u32 {
        self.window.repeat_count()
    }
}

/// What to paint for a screen after the breaker had its say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedScene {
    Panels(Vec<ScenePanel>),
    Fallback(Vec<String>),
}

impl GuardedScene {
    pub fn is_fallback(&self) -> bool {
        matches!(self, GuardedScene::Fallback(_))
    }

    /// Panels to paint or serialize. Fallback lines become one text panel.
    pub fn into_panels(self) -> Vec<ScenePanel> {
        match self {
            GuardedScene::Panels(panels) => panels,
            GuardedScene::Fallback(lines) => {
                vec![ScenePanel::text("fallback", "Plain view", lines).with_status("render fallback")]
            }
        }
    }
}

impl RenderFallbackGuard {
    /// Build the screen's scene, counting failures and switching to the
    /// plain fallback once the breaker trips.
    pub fn render(&mut self, screen: &dyn Screen) -> GuardedScene {
        if self.fallback {
            return GuardedScene::Fallback(screen.fallback_lines());
        }
        let scene = panics::contain(|| screen.scene())
            .unwrap_or_else(|message| Err(RenderError::new(format!("Render panicked: {message}"))));
        match scene {
            Ok(panels) => GuardedScene::Panels(panels),
            Err(err) => {
                if self.record_failure(&err.message) {
                    GuardedScene::Fallback(screen.fallback_lines())
                } else {
                    GuardedScene::Panels(vec![
                        ScenePanel::text("render-error", screen.title(), vec![err.message])
                            .with_status("render error"),
                    ])
                }
            }
        }
    }
}

// ============================================================================
// Error storm
// ============================================================================

/// What to do after reporting an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StormVerdict {
    /// Show the error and keep going.
    Continue { repeat_count: u32 },
    /// Stop the session.
    Shutdown { message: String, repeat_count: u32 },
}

/// Session-wide breaker for unhandled errors.
#[derive(Debug, Clone)]
pub struct ErrorStormGuard {
    window: RepeatWindow,
    threshold: u32,
    tripped: bool,
}

impl Default for ErrorStormGuard {
    fn default() -> Self {
        Self::new(RepeatSettings {
            threshold: 5,
            window_ms: 2000,
        })
    }
}

impl ErrorStormGuard {
    pub fn new(settings: RepeatSettings) -> Self {
        Self {
            window: RepeatWindow::new(settings.window()),
            threshold: settings.threshold.max(1),
            tripped: false,
        }
    }

    /// Report an error at `now`. Once tripped, every later report also
    /// returns [`StormVerdict::Shutdown`].
    pub fn report_at(&mut self, message: &str, now: Instant) -> StormVerdict {
        let repeat_count = self.window.record_at(message, now);
        if repeat_count >= self.threshold {
            self.tripped = true;
        }
        if self.tripped {
            error!(repeat_count, error = message, "Error storm detected, stopping session");
            return StormVerdict::Shutdown {
                message: message.to_string(),
                repeat_count,
            };
        }
        StormVerdict::Continue { repeat_count }
    }

    pub fn report(&mut self, message: &str) -> StormVerdict {
        self.report_at(message, Instant::now())
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
