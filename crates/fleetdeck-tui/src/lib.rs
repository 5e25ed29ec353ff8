//! Terminal session control plane for fleetdeck.
//!
//! This crate provides the interactive dashboard and the headless snapshot
//! protocol that share one set of screens.
//!
//! ## Features
//!
//! - Bounded, serialized input queue with critical-key bypass
//! - Key dispatch priority: modal, screen, pane, global
//! - Per-screen refresh runtime with coalescing and unmount cancellation
//! - Retry with backoff and connectivity classification of API failures
//! - Render fallback and error storm guards
//! - Newline-delimited JSON frames for non-interactive consumers
//!
//! ## Hotkeys
//!
//! - `1`-`5` - Dashboard, Devices, Spaces, Incidents, Tickets
//! - `Tab` / `←` `→` - Cycle screens
//! - `Shift+←` `→` - Move between panes
//! - `r` - Refresh
//! - `?` - Help
//! - `q` - Quit
//! - `Ctrl+C` - Interrupt (never queued)

pub mod app;
pub mod brand;
pub mod connectivity;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod headless;
pub mod input;
pub mod loader;
pub mod modal;
pub mod panics;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod screen;
pub mod screens;
pub mod selection;
pub mod session;
pub mod terminal;

pub use app::{SessionExit, SessionHandle};
pub use connectivity::{ConnectionState, classify};
pub use error::{Result, TuiError};
pub use headless::{HeadlessOptions, HeadlessSummary, run_headless};
pub use input::{InputController, InputEvent};
pub use loader::{RetryPolicy, RetryingLoader};
pub use screen::ScreenId;
pub use session::SessionContext;
pub use terminal::{restore_terminal, run_interactive};
