//! Panic containment.
//!
//! Input handlers, background tasks and scene building run inside a
//! containment scope. A panic there becomes an error message for the storm
//! and render guards instead of ending the session. The process panic hook
//! checks [`is_contained`] so it does not tear down the terminal for a panic
//! that is about to be caught.

use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use futures_util::future::poll_fn;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct Scope;

impl Scope {
    fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Whether a panic on this thread will be caught by a containment scope.
pub fn is_contained() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `f`, turning a panic into its message.
pub fn contain<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    let _scope = Scope::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Poll `future` to completion, turning a panic into its message. The scope
/// is entered around every poll, since tasks may move between threads.
pub async fn contain_future<F: Future>(future: F) -> Result<F::Output, String> {
    let mut caught = Box::pin(AssertUnwindSafe(future).catch_unwind());
    poll_fn(move |cx| {
        let _scope = Scope::enter();
        caught.as_mut().poll(cx)
    })
    .await
    .map_err(|payload| panic_message(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explode(message: &str) {
        panic!("{message}")
    }

    #[test]
    fn test_contain_returns_value() {
        assert_eq!(contain(|| 7), Ok(7));
        assert!(!is_contained());
    }

    #[test]
    fn test_contain_catches_panic() {
        assert_eq!(contain(|| explode("scene exploded")), Err("scene exploded".to_string()));
        assert!(!is_contained());
    }

    #[test]
    fn test_scope_visible_inside() {
        assert_eq!(contain(is_contained), Ok(true));
    }

    #[test]
    fn test_static_str_payload() {
        let result = contain(|| -> u32 { panic!("static message") });
        assert_eq!(result, Err("static message".to_string()));
    }

    #[tokio::test]
    async fn test_contain_future_catches_panic() {
        let result = contain_future(async {
            tokio::task::yield_now().await;
            explode("task blew up")
        })
        .await;
        assert_eq!(result, Err("task blew up".to_string()));
        assert_eq!(contain_future(async { 3 }).await, Ok(3));
        assert!(!is_contained());
    }
}
