//! Terminal ownership and the interactive event loop.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use fleetdeck_core::log_tui_event;

use crate::app::{SessionExit, SessionHandle};
use crate::error::Result;
use crate::input::{self, InputController, InputEvent};
use crate::render;
use crate::screen::ScreenId;
use crate::session::SessionContext;

const READER_POLL: Duration = Duration::from_millis(100);

/// Raw mode plus alternate screen, restored on drop.
pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(err) = crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen) {
            let _ = crossterm::terminal::disable_raw_mode();
            return Err(err.into());
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }

    pub fn draw(&mut self, view: &render::SessionView) -> Result<()> {
        self.terminal.draw(|frame| render::draw(frame, view))?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Best-effort terminal restore for panic hooks.
pub fn restore_terminal() {
    let _ = crossterm::terminal::disable_raw_mode();
    let _ = crossterm::execute!(
        io::stdout(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    );
}

enum TerminalEvent {
    Key(InputEvent),
    Resize,
}

/// Blocking crossterm reader on its own thread.
struct InputReader {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InputReader {
    fn spawn(tx: mpsc::UnboundedSender<TerminalEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                match event::poll(READER_POLL) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(err) => {
                        error!(error = %err, "Terminal input poll failed");
                        break;
                    }
                }
                let sent = match event::read() {
                    Ok(Event::Key(key)) => tx.send(TerminalEvent::Key(InputEvent::new(key))),
                    Ok(Event::Resize(..)) => tx.send(TerminalEvent::Resize),
                    Ok(_) => Ok(()),
                    Err(err) => {
                        error!(error = %err, "Terminal input read failed");
                        break;
                    }
                };
                if sent.is_err() {
                    break;
                }
            }
            debug!("Input reader stopped");
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Everything that must be torn down on every exit path.
struct SessionResources {
    handle: SessionHandle,
    controller: InputController<InputEvent>,
    _reader: InputReader,
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.controller.shutdown();
        self.handle.abort_tasks();
    }
}

/// Run the interactive session until quit, interrupt or error storm.
pub async fn run_interactive(ctx: SessionContext, initial: ScreenId) -> Result<SessionExit> {
    let capacity = ctx.config.queue_capacity;
    let tick = ctx.config.tick_interval();
    let handle = SessionHandle::new(ctx, initial);

    let controller = {
        let on_input = handle.clone();
        let on_error = handle.clone();
        InputController::new(
            capacity,
            move |event: InputEvent| {
                let handle = on_input.clone();
                async move { handle.handle_input(event).await }
            },
            input::is_critical,
            move |err: anyhow::Error| on_error.report_error(&format!("{err:#}")),
        )
    };

    let mut terminal = TerminalGuard::enter()?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let resources = SessionResources {
        handle: handle.clone(),
        controller: controller.clone(),
        _reader: InputReader::spawn(tx),
    };

    info!(screen = %initial, "Interactive session started");
    handle.spawn_refresh("mount");
    let mut ticker = tokio::time::interval(tick);

    let exit = loop {
        if let Some(exit) = handle.exit() {
            break exit;
        }
        if handle.take_dirty() {
            let view = handle.view(controller.state().dropped_events);
            terminal.draw(&view)?;
            log_tui_event!("render", screen = view.active.as_str(), fallback = view.fallback);
        }

        tokio::select! {
            event = events.recv() => match event {
                Some(TerminalEvent::Key(key)) => {
                    let shown = key.to_string();
                    let receipt = controller.dispatch(key);
                    log_tui_event!("input", key = %shown, receipt = ?receipt);
                }
                Some(TerminalEvent::Resize) => handle.mark_dirty(),
                None => break SessionExit::Interrupted,
            },
            _ = ticker.tick() => {
                if handle.is_refreshing() {
                    handle.mark_dirty();
                }
            }
            exit = handle.wait_for_exit() => break exit,
        }
    };

    drop(resources);
    drop(terminal);
    info!(?exit, "Interactive session stopped");
    Ok(exit)
}
