//! List selection and stale-safe detail loading.
//!
//! When the operator scrolls a list quickly, each selection starts a detail
//! load and the loads can resolve out of order. [`StaleSafeLoader`] tags
//! every invocation and applies only the most recent one's result.
//!
//! Selection changes carry their [`SelectionOrigin`] so that a list
//! repositioning itself after a refresh does not trigger loads meant for
//! operator navigation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

/// Who moved the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// Set by code, e.g. restoring the cursor after a refresh
    Programmatic,
    /// Moved by the operator
    User,
}

/// A selection change worth reacting to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange {
    pub index: usize,
    pub origin: SelectionOrigin,
}

impl SelectionChange {
    /// Only operator-initiated changes should start loads.
    pub fn should_load(&self) -> bool {
        self.origin == SelectionOrigin::User
    }
}

/// Cursor over a list of `len` rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListSelection {
    index: Option<usize>,
    len: usize,
}

impl ListSelection {
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Update the row count, clamping the cursor. Returns the change, if the
    /// cursor moved, as programmatic.
    pub fn set_len(&mut self, len: usize) -> Option<SelectionChange> {
        self.len = len;
        let clamped = match (self.index, len) {
            (_, 0) => None,
            (None, _) => Some(0),
            (Some(i), n) => Some(i.min(n - 1)),
        };
        if clamped == self.index {
            return None;
        }
        self.index = clamped;
        clamped.map(|index| SelectionChange {
            index,
            origin: SelectionOrigin::Programmatic,
        })
    }

    /// Move the cursor by `delta` rows. Returns `None` at the list edge.
    pub fn move_by(&mut self, delta: isize, origin: SelectionOrigin) -> Option<SelectionChange> {
        let current = self.index?;
        let target = current.checked_add_signed(delta)?;
        if target >= self.len || target == current {
            return None;
        }
        self.index = Some(target);
        Some(SelectionChange {
            index: target,
            origin,
        })
    }

    pub fn select(&mut self, index: usize, origin: SelectionOrigin) -> Option<SelectionChange> {
        if index >= self.len || self.index == Some(index) {
            return None;
        }
        self.index = Some(index);
        Some(SelectionChange { index, origin })
    }
}

type LoadFn<I, T> = Arc<dyn Fn(I) -> BoxFuture<'static, T> + Send + Sync>;
type ApplyFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Applies only the latest invocation's result.
pub struct StaleSafeLoader<I, T> {
    name: &'static str,
    token: Arc<AtomicU64>,
    load: LoadFn<I, T>,
    apply: ApplyFn<T>,
}

impl<I, T> Clone for StaleSafeLoader<I, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            token: self.token.clone(),
            load: self.load.clone(),
            apply: self.apply.clone(),
        }
    }
}

impl<I: Send + 'static, T: Send + 'static> StaleSafeLoader<I, T> {
    pub fn new<L, Fut, A>(name: &'static str, load: L, apply: A) -> Self
    where
        L: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        A: Fn(T) + Send + Sync + 'static,
    {
        Self {
            name,
            token: Arc::new(AtomicU64::new(0)),
            load: Arc::new(move |input| load(input).boxed()),
            apply: Arc::new(apply),
        }
    }

    /// Load for `input` and apply the result unless a newer call started
    /// meanwhile. Returns whether the result was applied.
    pub async fn run(&self, input: I) -> bool {
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        let result = (self.load)(input).await;
        if self.token.load(Ordering::SeqCst) != token {
            debug!(loader = self.name, token, "Dropped superseded selection load");
            return false;
        }
        (self.apply)(result);
        true
    }

    /// Make every in-flight load stale.
    pub fn invalidate(&self) {
        self.token.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_only_latest_result_applied() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let loader = StaleSafeLoader::new(
            "space-devices",
            |space: &'static str| async move {
                // Earlier selections resolve later.
                let delay = if space == "a" { 40 } else { 5 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                space
            },
            move |space| sink.lock().unwrap().push(space),
        );

        let slow = tokio::spawn({
            let loader = loader.clone();
            async move { loader.run("a").await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let fast = loader.run("b").await;

        assert!(fast);
        assert!(!slow.await.unwrap());
        assert_eq!(*applied.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_invalidate_drops_in_flight() {
        let applied = Arc::new(Mutex::new(0));
        let sink = applied.clone();
        let loader = StaleSafeLoader::new(
            "detail",
            |n: u32| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                n
            },
            move |n| *sink.lock().unwrap() += n,
        );
        let pending = tokio::spawn({
            let loader = loader.clone();
            async move { loader.run(5).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        loader.invalidate();
        assert!(!pending.await.unwrap());
        assert_eq!(*applied.lock().unwrap(), 0);
    }

    #[test]
    fn test_list_selection_moves_and_clamps() {
        let mut selection = ListSelection::default();
        assert_eq!(
            selection.set_len(3),
            Some(SelectionChange {
                index: 0,
                origin: SelectionOrigin::Programmatic
            })
        );
        assert_eq!(selection.move_by(-1, SelectionOrigin::User), None);
        let change = selection.move_by(2, SelectionOrigin::User).unwrap();
        assert_eq!(change.index, 2);
        assert!(change.should_load());
        assert_eq!(selection.move_by(1, SelectionOrigin::User), None);

        let change = selection.set_len(2).unwrap();
        assert_eq!(change.index, 1);
        assert!(!change.should_load());

        assert_eq!(selection.set_len(0), None);
        assert_eq!(selection.index(), None);
        assert!(selection.is_empty());
    }
}
