//! Keyboard input events and the bounded input queue.
//!
//! [`InputController`] serializes event handling: one event is in flight at
//! a time, in arrival order. The queue is bounded; when full, the oldest
//! pending event is dropped and counted. Critical events (Ctrl+C, Ctrl+D)
//! skip the queue so the operator can always get out.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::panics;

/// One key press, stamped on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub key: KeyEvent,
    pub received_at: Instant,
}

impl InputEvent {
    pub fn new(key: KeyEvent) -> Self {
        Self {
            key,
            received_at: Instant::now(),
        }
    }

    /// Plain key without modifiers.
    pub fn key(code: KeyCode) -> Self {
        Self::new(KeyEvent::new(code, KeyModifiers::NONE))
    }

    pub fn with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self::new(KeyEvent::new(code, modifiers))
    }

    pub fn char(c: char) -> Self {
        Self::key(KeyCode::Char(c))
    }

    pub fn ctrl(c: char) -> Self {
        Self::with_modifiers(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    pub fn code(&self) -> KeyCode {
        self.key.code
    }

    pub fn modifiers(&self) -> KeyModifiers {
        self.key.modifiers
    }

    /// Printable character, if the key is one and no Ctrl/Alt is held.
    pub fn character(&self) -> Option<char> {
        match self.key.code {
            KeyCode::Char(c)
                if !self
                    .key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                Some(c)
            }
            _ => None,
        }
    }

    pub fn is_ctrl(&self, c: char) -> bool {
        self.key.modifiers.contains(KeyModifiers::CONTROL) && self.key.code == KeyCode::Char(c)
    }

    /// Key releases and repeats reported by some terminals are not input.
    pub fn is_press(&self) -> bool {
        self.key.kind != KeyEventKind::Release
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.key.modifiers;
        if m.contains(KeyModifiers::CONTROL) {
            f.write_str("Ctrl+")?;
        }
        if m.contains(KeyModifiers::ALT) {
            f.write_str("Alt+")?;
        }
        if m.contains(KeyModifiers::SHIFT) && !matches!(self.key.code, KeyCode::Char(_)) {
            f.write_str("Shift+")?;
        }
        match self.key.code {
            KeyCode::Char(c) => write!(f, "{c}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Events that bypass the queue: Ctrl+C and Ctrl+D.
pub fn is_critical(event: &InputEvent) -> bool {
    event.is_ctrl('c') || event.is_ctrl('d')
}

/// Async handler invoked for each event.
pub type InputHandlerFn<E> = Arc<dyn Fn(E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Receives handler failures (returned errors and panics).
pub type InputErrorFn = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

/// Decides which events bypass the queue.
pub type CriticalFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub queue_depth: usize,
    pub dropped_events: u64,
    pub in_flight: bool,
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReceipt {
    /// Queued for in-order handling
    Queued,
    /// Queued, after evicting the oldest pending event
    QueuedWithDrop,
    /// Handled immediately, outside the queue
    Bypassed,
    /// Controller is shut down
    Rejected,
}

struct QueueState<E> {
    events: VecDeque<E>,
    dropped: u64,
    draining: bool,
    in_flight: bool,
    closed: bool,
}

struct Shared<E> {
    queue: Mutex<QueueState<E>>,
    idle: Notify,
    capacity: usize,
    handler: InputHandlerFn<E>,
    on_error: InputErrorFn,
    is_critical: CriticalFn<E>,
}

impl<E> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, QueueState<E>> {
        // Queue state stays consistent even if a holder panicked.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bounded FIFO input queue with a single drain task.
///
/// Must be used from within a tokio runtime.
pub struct InputController<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for InputController<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E: Send + 'static> InputController<E> {
    /// Create a controller. `capacity` of zero is treated as one.
    pub fn new<H, Fut, C, R>(capacity: usize, handler: H, is_critical: C, on_error: R) -> Self
    where
        H: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        C: Fn(&E) -> bool + Send + Sync + 'static,
        R: Fn(anyhow::Error) + Send + Sync + 'static,
    {
        let handler: InputHandlerFn<E> = Arc::new(move |event| handler(event).boxed());
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    events: VecDeque::with_capacity(capacity.max(1)),
                    dropped: 0,
                    draining: false,
                    in_flight: false,
                    closed: false,
                }),
                idle: Notify::new(),
                capacity: capacity.max(1),
                handler,
                on_error: Arc::new(on_error),
                is_critical: Arc::new(is_critical),
            }),
        }
    }

    /// Accept an event.
    ///
    /// Critical events run immediately on their own task. Everything else
    /// is appended to the queue, evicting the oldest pending event when
    /// full, and a drain task is started if none is running.
    pub fn dispatch(&self, event: E) -> DispatchReceipt {
        if (self.shared.is_critical)(&event) {
            if self.shared.lock().closed {
                return DispatchReceipt::Rejected;
            }
            let handler = self.shared.handler.clone();
            let on_error = self.shared.on_error.clone();
            tokio::spawn(async move {
                run_handler(&handler, &on_error, event).await;
            });
            return DispatchReceipt::Bypassed;
        }

        let (receipt, start_drain) = {
            let mut queue = self.shared.lock();
            if queue.closed {
                return DispatchReceipt::Rejected;
            }
            let mut receipt = DispatchReceipt::Queued;
            if queue.events.len() >= self.shared.capacity {
                queue.events.pop_front();
                queue.dropped += 1;
                receipt = DispatchReceipt::QueuedWithDrop;
                warn!(
                    dropped_events = queue.dropped,
                    capacity = self.shared.capacity,
                    "Input queue full, dropped oldest event"
                );
            }
            queue.events.push_back(event);
            let start_drain = !queue.draining;
            queue.draining = true;
            (receipt, start_drain)
        };

        if start_drain {
            tokio::spawn(drain(self.shared.clone()));
        }
        receipt
    }

    pub fn state(&self) -> InputState {
        let queue = self.shared.lock();
        InputState {
            queue_depth: queue.events.len(),
            dropped_events: queue.dropped,
            in_flight: queue.in_flight,
        }
    }

    /// Drop all pending events. The event in flight, if any, completes.
    pub fn clear(&self) {
        let mut queue = self.shared.lock();
        let cleared = queue.events.len();
        queue.events.clear();
        debug!(cleared, "Input queue cleared");
    }

    /// Stop accepting events and drop everything pending.
    pub fn shutdown(&self) {
        let mut queue = self.shared.lock();
        queue.closed = true;
        queue.events.clear();
    }

    /// Wait until the queue is empty and nothing is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            {
                let queue = self.shared.lock();
                if !queue.draining && queue.events.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

async fn run_handler<E>(handler: &InputHandlerFn<E>, on_error: &InputErrorFn, event: E) {
    match panics::contain_future(handler(event)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => on_error(err),
        Err(message) => on_error(anyhow::anyhow!("Input handler panicked: {message}")),
    }
}

async fn drain<E: Send + 'static>(shared: Arc<Shared<E>>) {
    loop {
        let next = {
            let mut queue = shared.lock();
            match queue.events.pop_front() {
                Some(event) if !queue.closed => {
                    queue.in_flight = true;
                    Some(event)
                }
                _ => {
                    queue.in_flight = false;
                    queue.draining = false;
                    None
                }
            }
        };

        let Some(event) = next else {
            shared.idle.notify_waiters();
            return;
        };

        run_handler(&shared.handler, &shared.on_error, event).await;
        shared.lock().in_flight = false;
    }
}
