//! Input routing.
//!
//! Precedence, highest first:
//!
//! 1. An open modal gets every key.
//! 2. Arrow keys go to the active pane when the screen has a pane handler.
//!    Plain Left/Right are the exception: they switch tabs unless held with
//!    a modifier or the screen claims horizontal arrows (text editing).
//! 3. Other keys go to the screen's own handler.
//! 4. The global keymap.
//!
//! A pane handler that reports a boundary, or a screen handler that does not
//! consume the key, falls through to the global keymap.

use crossterm::event::{KeyCode, KeyModifiers};
use serde::Serialize;

use crate::input::InputEvent;

/// Where an event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOutcome {
    Modal,
    PaneArrow,
    ScreenLocal,
    Global,
    Blocked,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Modal => "modal",
            DispatchOutcome::PaneArrow => "pane-arrow",
            DispatchOutcome::ScreenLocal => "screen-local",
            DispatchOutcome::Global => "global",
            DispatchOutcome::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowDirection {
    pub fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Up => Some(ArrowDirection::Up),
            KeyCode::Down => Some(ArrowDirection::Down),
            KeyCode::Left => Some(ArrowDirection::Left),
            KeyCode::Right => Some(ArrowDirection::Right),
            _ => None,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, ArrowDirection::Left | ArrowDirection::Right)
    }
}

/// Result of offering an arrow key to a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowResult {
    /// The pane moved focus or selection
    Handled,
    /// Already at the edge in that direction
    Boundary,
    /// The pane has no use for this arrow
    Unhandled,
}

/// Which handlers are currently registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableHandlers {
    pub modal: bool,
    pub pane_arrow: bool,
    pub screen_key: bool,
    pub global: bool,
    /// The screen wants plain Left/Right (e.g. while editing text)
    pub claims_horizontal: bool,
}

/// Modifiers that turn Left/Right into pane navigation.
const PANE_MODIFIERS: KeyModifiers = KeyModifiers::SHIFT
    .union(KeyModifiers::ALT)
    .union(KeyModifiers::CONTROL);

/// Pick the first handler for `event`. Pure; does not consider fallthrough.
pub fn resolve(
    event: &InputEvent,
    modal_active: bool,
    handlers: &AvailableHandlers,
) -> DispatchOutcome {
    if modal_active {
        return if handlers.modal {
            DispatchOutcome::Modal
        } else {
            DispatchOutcome::Blocked
        };
    }

    if let Some(direction) = ArrowDirection::from_code(event.code()) {
        let pane_routed = !direction.is_horizontal()
            || event.modifiers().intersects(PANE_MODIFIERS)
            || handlers.claims_horizontal;
        if pane_routed && handlers.pane_arrow {
            return DispatchOutcome::PaneArrow;
        }
        return global_or_blocked(handlers);
    }

    if handlers.screen_key {
        return DispatchOutcome::ScreenLocal;
    }

    global_or_blocked(handlers)
}

fn global_or_blocked(handlers: &AvailableHandlers) -> DispatchOutcome {
    if handlers.global {
        DispatchOutcome::Global
    } else {
        DispatchOutcome::Blocked
    }
}

/// Receiver of routed events.
pub trait DispatchTarget {
    fn handle_modal(&mut self, event: &InputEvent);

    fn handle_pane_arrow(&mut self, direction: ArrowDirection, event: &InputEvent) -> ArrowResult;

    /// Returns true when the screen consumed the key.
    fn handle_screen_key(&mut self, event: &InputEvent) -> bool;

    fn handle_global(&mut self, event: &InputEvent);
}

/// Resolve and deliver `event`, falling through to the global keymap when
/// a pane hits its boundary or the screen ignores the key.
pub fn route<T: DispatchTarget>(
    event: &InputEvent,
    modal_active: bool,
    handlers: &AvailableHandlers,
    target: &mut T,
) -> DispatchOutcome {
    match resolve(event, modal_active, handlers) {
        DispatchOutcome::Modal => {
            target.handle_modal(event);
            DispatchOutcome::Modal
        }
        DispatchOutcome::PaneArrow => {
            let handled = ArrowDirection::from_code(event.code())
                .map(|direction| target.handle_pane_arrow(direction, event));
            match handled {
                Some(ArrowResult::Handled) => DispatchOutcome::PaneArrow,
                _ => fall_through(event, handlers, target),
            }
        }
        DispatchOutcome::ScreenLocal => {
            if target.handle_screen_key(event) {
                DispatchOutcome::ScreenLocal
            } else {
                fall_through(event, handlers, target)
            }
        }
        DispatchOutcome::Global => {
            target.handle_global(event);
            DispatchOutcome::Global
        }
        DispatchOutcome::Blocked => DispatchOutcome::Blocked,
    }
}

fn fall_through<T: DispatchTarget>(
    event: &InputEvent,
    handlers: &AvailableHandlers,
    target: &mut T,
) -> DispatchOutcome {
    if handlers.global {
        target.handle_global(event);
        DispatchOutcome::Global
    } else {
        DispatchOutcome::Blocked
    }
}
