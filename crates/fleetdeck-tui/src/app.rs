//! Interactive session state.
//!
//! [`SessionHandle`] owns the mounted screen, the modal stack and the exit
//! flag behind one mutex. Input handling, refresh tasks and drill-down loads
//! all go through it; none of them holds the lock across an await.
//!
//! Terminal I/O lives in [`crate::terminal`], so everything here runs under
//! plain `#[tokio::test]`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::event::KeyCode;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use fleetdeck_core::log_tui_event;

use crate::brand;
use crate::dispatch::{self, ArrowDirection, ArrowResult, AvailableHandlers, DispatchTarget};
use crate::error::{Result, TuiError};
use crate::guard::{RenderFallbackGuard, StormVerdict};
use crate::input::{self, InputEvent};
use crate::loader::RetryPolicy;
use crate::modal::{Modal, ModalResponse};
use crate::panics;
use crate::render::SessionView;
use crate::runtime::{RefreshOutcome, ScreenRuntime, StatusObserver};
use crate::screen::{self, DeviceAction, Screen, ScreenCommand, ScreenData, ScreenId};
use crate::screens::load_space_devices;
use crate::selection::StaleSafeLoader;
use crate::session::SessionContext;

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Quit,
    Interrupted,
    ErrorStorm { message: String, count: u32 },
}

impl SessionExit {
    pub fn into_result(self) -> Result<()> {
        match self {
            SessionExit::ErrorStorm { message, count } => Err(TuiError::ErrorStorm { message, count }),
            SessionExit::Quit | SessionExit::Interrupted => Ok(()),
        }
    }
}

struct MountedScreen {
    screen: Box<dyn Screen>,
    runtime: ScreenRuntime,
    guard: RenderFallbackGuard,
}

impl MountedScreen {
    fn new(id: ScreenId, ctx: &SessionContext, observer: StatusObserver) -> Self {
        let mut screen = screen::create(id);
        screen.mount();
        screen.focus();
        log_tui_event!("mount", screen = id.as_str());
        Self {
            screen,
            runtime: ScreenRuntime::new(id.as_str()).with_observer(observer),
            guard: RenderFallbackGuard::new(ctx.config.render_fallback),
        }
    }

    fn unmount(&mut self) {
        self.runtime.cancel_pending_for_unmount();
        self.screen.unmount();
        log_tui_event!("unmount", screen = self.screen.id().as_str());
    }

    fn handlers(&self, modal_active: bool) -> AvailableHandlers {
        AvailableHandlers {
            modal: modal_active,
            pane_arrow: self.screen.has_arrow_handler(),
            screen_key: self.screen.has_key_handler(),
            global: true,
            claims_horizontal: self.screen.claims_horizontal_arrows(),
        }
    }
}

struct SessionState {
    mounted: MountedScreen,
    modal: Option<Modal>,
    exit: Option<SessionExit>,
    message: Option<String>,
}

/// Follow-up work collected under the lock and run after releasing it.
#[derive(Debug)]
enum Effect {
    Refresh(&'static str),
    Command(ScreenCommand),
    Invoke { action: DeviceAction, confirmed: bool },
    Shutdown,
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable handle to one interactive session.
#[derive(Clone)]
pub struct SessionHandle {
    ctx: SessionContext,
    state: Arc<Mutex<SessionState>>,
    shutdown: Arc<Notify>,
    dirty: Arc<AtomicBool>,
    observer: StatusObserver,
    spaces: StaleSafeLoader<String, ScreenData>,
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl SessionHandle {
    pub fn new(ctx: SessionContext, initial: ScreenId) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let observer: StatusObserver = {
            let dirty = dirty.clone();
            Arc::new(move |screen, status| {
                log_tui_event!(
                    "refresh_status",
                    screen,
                    state = status.state.as_str(),
                    in_flight = status.refresh_in_flight,
                    queued = status.refresh_queued,
                    stale_discarded = status.stale_discarded_count
                );
                dirty.store(true, Ordering::Release);
            })
        };

        let state = Arc::new(Mutex::new(SessionState {
            mounted: MountedScreen::new(initial, &ctx, observer.clone()),
            modal: None,
            exit: None,
            message: None,
        }));

        let spaces = {
            let load_ctx = ctx.clone();
            let state = state.clone();
            let dirty = dirty.clone();
            StaleSafeLoader::new(
                "space-devices",
                move |space_id: String| load_space_devices(&load_ctx, space_id),
                move |data: ScreenData| {
                    let mut state = lock_state(&state);
                    if state.mounted.screen.id() == ScreenId::Spaces {
                        state.mounted.screen.apply(data);
                    }
                    dirty.store(true, Ordering::Release);
                },
            )
        };

        Self {
            ctx,
            state,
            shutdown: Arc::new(Notify::new()),
            dirty,
            observer,
            spaces,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn active_screen(&self) -> ScreenId {
        self.lock().mounted.screen.id()
    }

    pub fn modal(&self) -> Option<Modal> {
        self.lock().modal.clone()
    }

    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub fn exit(&self) -> Option<SessionExit> {
        self.lock().exit.clone()
    }

    /// Resolves once an exit reason has been recorded.
    pub async fn wait_for_exit(&self) -> SessionExit {
        loop {
            let notified = self.shutdown.notified();
            if let Some(exit) = self.exit() {
                return exit;
            }
            notified.await;
        }
    }

    /// Whether a refresh is running on the mounted screen.
    pub fn is_refreshing(&self) -> bool {
        self.lock().mounted.runtime.status().refresh_in_flight
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether a redraw is due. Clears the flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Record the exit reason (first one wins) and wake the session loop.
    pub fn finish(&self, exit: SessionExit) {
        {
            let mut state = self.lock();
            if state.exit.is_none() {
                info!(?exit, "Session ending");
                state.exit = Some(exit);
            }
        }
        self.shutdown.notify_one();
    }

    /// Report an unhandled error. Repeats of the same error end the session.
    pub fn report_error(&self, message: &str) {
        warn!(error = message, "Unhandled session error");
        match self.ctx.report_error(message) {
            StormVerdict::Continue { repeat_count } => {
                self.lock().modal = Some(Modal::Error {
                    message: message.to_string(),
                    repeat_count,
                });
                self.mark_dirty();
            }
            StormVerdict::Shutdown {
                message,
                repeat_count,
            } => self.finish(SessionExit::ErrorStorm {
                message,
                count: repeat_count,
            }),
        }
    }

    /// Handle one key event. Used as the input controller's handler.
    pub async fn handle_input(&self, event: InputEvent) -> anyhow::Result<()> {
        if !event.is_press() {
            return Ok(());
        }
        if input::is_critical(&event) {
            log_tui_event!("interrupt", key = %event);
            self.finish(SessionExit::Interrupted);
            return Ok(());
        }

        let effects = {
            let mut state = self.lock();
            let modal_active = state.modal.is_some();
            let handlers = state.mounted.handlers(modal_active);
            let mut router = Router {
                handle: self,
                state: &mut *state,
                effects: Vec::new(),
            };
            let outcome = dispatch::route(&event, modal_active, &handlers, &mut router);
            let mut effects = router.effects;
            log_tui_event!(
                "dispatch",
                key = %event,
                outcome = outcome.as_str(),
                screen = state.mounted.screen.id().as_str()
            );
            effects.extend(state.mounted.screen.take_commands().into_iter().map(Effect::Command));
            effects
        };

        self.mark_dirty();
        self.run_effects(effects);
        Ok(())
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Refresh(reason) => self.spawn_refresh(reason),
                Effect::Command(command) => self.run_command(command),
                Effect::Invoke { action, confirmed } => self.spawn_invoke(action, confirmed),
                Effect::Shutdown => self.shutdown.notify_one(),
            }
        }
    }

    fn run_command(&self, command: ScreenCommand) {
        match command {
            ScreenCommand::Refresh => self.spawn_refresh("screen"),
            ScreenCommand::LoadSpaceDevices(space_id) => {
                log_tui_event!("drill_down", space = %space_id);
                let loader = self.spaces.clone();
                self.spawn(async move {
                    loader.run(space_id).await;
                });
            }
            ScreenCommand::Confirm {
                title,
                prompt,
                token,
                action,
            } => {
                log_tui_event!("confirm_prompt", device = %action.device_id, operation = action.operation.as_str());
                self.lock().modal = Some(Modal::confirm(title, prompt, token, action));
                self.mark_dirty();
            }
            ScreenCommand::Invoke(action) => self.spawn_invoke(action, false),
        }
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(message) = panics::contain_future(future).await {
                this.report_error(&format!("Background task panicked: {message}"));
            }
        })
        .abort_handle();
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Abort every background task the session started.
    pub fn abort_tasks(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        for task in tasks {
            task.abort();
        }
        self.spaces.invalidate();
    }

    pub fn spawn_refresh(&self, reason: &'static str) {
        let this = self.clone();
        self.spawn(async move {
            this.refresh(reason).await;
        });
    }

    /// Refresh the mounted screen and apply the result if it is still
    /// mounted when the load finishes.
    pub async fn refresh(&self, reason: &str) -> RefreshOutcome {
        let (runtime, id) = {
            let state = self.lock();
            (state.mounted.runtime.clone(), state.mounted.screen.id())
        };
        log_tui_event!("refresh_start", screen = id.as_str(), reason);

        let outcome = runtime
            .run_refresh(
                reason,
                || self.lock().mounted.screen.refresh_job(&self.ctx),
                |data: ScreenData| {
                    let mut state = self.lock();
                    if state.mounted.screen.id() == id {
                        state.mounted.screen.apply(data);
                    }
                },
            )
            .await;

        let commands = {
            let mut state = self.lock();
            if state.mounted.screen.id() == id && outcome != RefreshOutcome::Discarded {
                self.ctx.record_readiness(state.mounted.screen.connection().state);
                if outcome == RefreshOutcome::Completed {
                    state.mounted.guard.reset();
                }
                state.mounted.screen.take_commands()
            } else {
                Vec::new()
            }
        };
        log_tui_event!("refresh_done", screen = id.as_str(), outcome = ?outcome);
        self.mark_dirty();
        for command in commands {
            self.run_command(command);
        }
        outcome
    }

    fn spawn_invoke(&self, action: DeviceAction, confirmed: bool) {
        if action.operation.is_destructive() && !confirmed {
            warn!(device = %action.device_id, operation = action.operation.as_str(), "Refusing unconfirmed destructive operation");
            self.lock().message = Some(format!("{} requires typed confirmation", action.operation.as_str()));
            self.mark_dirty();
            return;
        }
        let this = self.clone();
        self.spawn(async move {
            this.invoke(action).await;
        });
    }

    /// Run a remote operation once (no retries) and report the result in
    /// the footer.
    pub async fn invoke(&self, action: DeviceAction) {
        log_tui_event!("invoke", device = %action.device_id, operation = action.operation.as_str());
        let api = self.ctx.api.clone();
        let tenant = self.ctx.tenant_key();
        let outcome = self
            .ctx
            .loader
            .load_with(&RetryPolicy::no_retry(), action.operation.as_str(), None, || {
                let api = api.clone();
                let tenant = tenant.clone();
                let device_id = action.device_id.clone();
                let operation = action.operation;
                async move { api.invoke_operation(&tenant, &device_id, operation).await.map(Some) }
            })
            .await;

        let message = match &outcome.data {
            Some(receipt) if receipt.accepted => format!(
                "{} sent to {} ({})",
                action.operation.as_str(),
                action.device_name,
                receipt.operation_id
            ),
            Some(_) => format!("{} rejected by {}", action.operation.as_str(), action.device_name),
            None => format!(
                "{} failed for {}: {}",
                action.operation.as_str(),
                action.device_name,
                outcome.summary().status_text()
            ),
        };
        info!(device = %action.device_id, result = %message, "Operation finished");
        self.lock().message = Some(message);
        self.mark_dirty();
        if outcome.data.is_some() {
            self.refresh("operation").await;
        }
    }

    /// Snapshot for painting. Runs the render fallback guard.
    pub fn view(&self, dropped_events: u64) -> SessionView {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mounted = &mut state.mounted;
        let scene = mounted.guard.render(mounted.screen.as_ref());
        let fallback = scene.is_fallback();
        SessionView {
            active: mounted.screen.id(),
            title: mounted.screen.title(),
            status_line: mounted.screen.status_line(),
            refresh: mounted.runtime.status(),
            readiness: self.ctx.readiness(),
            tenant: self.ctx.tenant_key(),
            logo: brand::LOGO.to_string(),
            panels: scene.into_panels(),
            fallback,
            key_hints: mounted.screen.key_hints(),
            modal: state.modal.clone(),
            message: state.message.clone(),
            dropped_events,
        }
    }
}

/// Dispatch target for one event, working on the locked session state.
struct Router<'a> {
    handle: &'a SessionHandle,
    state: &'a mut SessionState,
    effects: Vec<Effect>,
}

impl Router<'_> {
    fn switch_to(&mut self, id: ScreenId) {
        let current = self.state.mounted.screen.id();
        if id == current {
            return;
        }
        log_tui_event!("switch", from = current.as_str(), to = id.as_str());
        self.state.mounted.unmount();
        if current == ScreenId::Spaces {
            self.handle.spaces.invalidate();
        }
        self.state.mounted = MountedScreen::new(id, &self.handle.ctx, self.handle.observer.clone());
        self.state.message = None;
        self.effects.push(Effect::Refresh("mount"));
    }

    fn exit(&mut self, exit: SessionExit) {
        if self.state.exit.is_none() {
            self.state.exit = Some(exit);
        }
        self.effects.push(Effect::Shutdown);
    }
}

impl DispatchTarget for Router<'_> {
    fn handle_modal(&mut self, event: &InputEvent) {
        let Some(modal) = self.state.modal.as_mut() else {
            return;
        };
        match modal.handle_key(event) {
            ModalResponse::None => {}
            ModalResponse::Close => self.state.modal = None,
            ModalResponse::Confirmed(action) => {
                self.state.modal = None;
                self.effects.push(Effect::Invoke {
                    action,
                    confirmed: true,
                });
            }
            ModalResponse::Rejected(message) => {
                log_tui_event!("confirm_rejected", reason = %message);
                self.state.modal = None;
                self.state.message = Some(message);
            }
        }
    }

    fn handle_pane_arrow(&mut self, direction: ArrowDirection, _event: &InputEvent) -> ArrowResult {
        self.state.mounted.screen.handle_arrow(direction)
    }

    fn handle_screen_key(&mut self, event: &InputEvent) -> bool {
        self.state.mounted.screen.handle_key(event)
    }

    fn handle_global(&mut self, event: &InputEvent) {
        let current = self.state.mounted.screen.id();
        match event.code() {
            KeyCode::Tab | KeyCode::Right => self.switch_to(current.next()),
            KeyCode::BackTab | KeyCode::Left => self.switch_to(current.prev()),
            KeyCode::Esc => self.state.message = None,
            _ => match event.character() {
                Some('q') => self.exit(SessionExit::Quit),
                Some('r') => self.effects.push(Effect::Refresh("manual")),
                Some('?') => self.state.modal = Some(Modal::Help),
                Some(c) => {
                    if let Some(id) = ScreenId::from_hotkey(c) {
                        self.switch_to(id);
                    }
                }
                None => {}
            },
        }
    }
}
