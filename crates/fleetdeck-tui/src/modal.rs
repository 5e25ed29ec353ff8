//! Modal overlays: help, errors, and typed confirmation for destructive
//! operations.
//!
//! While a modal is open the dispatcher hands it every key.

use crossterm::event::KeyCode;

use crate::error::{Result, TuiError};
use crate::input::InputEvent;
use crate::screen::{DeviceAction, ScreenId};

/// Typed confirmation for a destructive action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub title: String,
    pub prompt: String,
    /// Text the operator must type
    pub token: String,
    pub input: String,
    pub action: DeviceAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Help,
    Error { message: String, repeat_count: u32 },
    Confirm(ConfirmPrompt),
}

/// What the session should do after a modal key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalResponse {
    /// Stay open
    None,
    Close,
    /// Confirmation matched; run the action and close
    Confirmed(DeviceAction),
    /// Confirmation did not match; close and report
    Rejected(String),
}

/// Whether the typed text confirms `token`. Surrounding whitespace is
/// ignored; case is not.
pub fn confirm_token_matches(input: &str, token: &str) -> bool {
    !token.is_empty() && input.trim() == token
}

pub fn verify_confirmation(input: &str, token: &str) -> Result<()> {
    if confirm_token_matches(input, token) {
        Ok(())
    } else {
        Err(TuiError::ConfirmationMismatch {
            expected: token.to_string(),
        })
    }
}

impl Modal {
    pub fn confirm(title: String, prompt: String, token: String, action: DeviceAction) -> Self {
        Modal::Confirm(ConfirmPrompt {
            title,
            prompt,
            token,
            input: String::new(),
            action,
        })
    }

    pub fn title(&self) -> &str {
        match self {
            Modal::Help => "Help",
            Modal::Error { .. } => "Error",
            Modal::Confirm(prompt) => &prompt.title,
        }
    }

    pub fn handle_key(&mut self, event: &InputEvent) -> ModalResponse {
        match self {
            Modal::Help | Modal::Error { .. } => match event.code() {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('?') => {
                    ModalResponse::Close
                }
                _ => ModalResponse::None,
            },
            Modal::Confirm(prompt) => match event.code() {
                KeyCode::Esc => ModalResponse::Close,
                KeyCode::Enter => match verify_confirmation(&prompt.input, &prompt.token) {
                    Ok(()) => ModalResponse::Confirmed(prompt.action.clone()),
                    Err(err) => ModalResponse::Rejected(err.to_string()),
                },
                KeyCode::Backspace => {
                    prompt.input.pop();
                    ModalResponse::None
                }
                _ => {
                    if let Some(c) = event.character() {
                        prompt.input.push(c);
                    }
                    ModalResponse::None
                }
            },
        }
    }

    /// Body lines for the overlay.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Modal::Help => help_lines(),
            Modal::Error {
                message,
                repeat_count,
            } => {
                let mut lines = vec![message.clone()];
                if *repeat_count > 1 {
                    lines.push(format!("(repeated {repeat_count} times)"));
                }
                lines.push(String::new());
                lines.push("Esc to dismiss".to_string());
                lines
            }
            Modal::Confirm(prompt) => vec![
                prompt.prompt.clone(),
                String::new(),
                format!("Type '{}' and press Enter:", prompt.token),
                format!("> {}_", prompt.input),
                String::new(),
                "Esc to cancel".to_string(),
            ],
        }
    }
}

fn help_lines() -> Vec<String> {
    let mut lines = vec!["Screens:".to_string()];
    lines.extend(ScreenId::ALL.iter().map(|id| format!("  {}", id.hotkey_hint())));
    lines.extend(
        [
            "",
            "Navigation:",
            "  Tab / ←   →  Switch screens",
            "  ↑ ↓          Move selection",
            "  Shift+← →    Move between panes",
            "",
            "General:",
            "  r            Refresh",
            "  ?            This help",
            "  Esc          Close / cancel",
            "  q            Quit",
            "  Ctrl+C       Interrupt",
        ]
        .map(String::from),
    );
    lines
}
