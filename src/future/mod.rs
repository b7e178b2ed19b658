// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Single-assignment futures and promises, awaitable from inside a coroutine
//! and observable from plain callbacks outside one.
//!
//! Resolution storage and the completion-callback stack are grounded on the
//! same two ideas `examples/amilajack-corona` would need for its own
//! `tokio_core`-backed futures, generalized past a single reactor thread:
//! the single-assignment cell from [`crate::coroutine`]'s `AwaitSlot`, and
//! [`crate::atomic::CallbackStack`] for exactly-once completion callbacks.
//! Because a resolved value may be read more than once -- by `await()`, and
//! by any number of `whenComplete`/`whenSuccess`/`whenFailure` registrants
//! -- the read side requires `T: Clone`, the same bound `futures::future::
//! Shared` imposes on its own output type for the same reason.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::atomic::{CallbackStack, PushOutcome};
use crate::coroutine;
use crate::error::CoFutureError;

type Completion = Box<dyn FnOnce() + Send>;
type ParentCancel = Box<dyn Fn() + Send + Sync>;

struct Inner<T> {
    result: Mutex<Option<Result<T, CoFutureError>>>,
    callbacks: CallbackStack<Completion>,
    parent_cancel: Option<ParentCancel>,
}

impl<T: Send + 'static> Inner<T> {
    fn resolve(&self, result: Result<T, CoFutureError>) -> bool {
        {
            let mut slot = self.result.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
        }
        for callback in self.callbacks.close() {
            callback();
        }
        true
    }
}

/// The write-capable handle returned alongside a [`CoFuture`].
pub struct CoPromise<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> CoPromise<T> {
    /// Resolves with `result`. A no-op if already resolved.
    pub fn complete(&self, result: Result<T, CoFutureError>) -> bool {
        self.inner.resolve(result)
    }

    pub fn success(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: CoFutureError) -> bool {
        self.complete(Err(error))
    }
}

impl<T: Send + 'static> Drop for CoPromise<T> {
    fn drop(&mut self) {
        // No-op if something already resolved this promise; otherwise this
        // is the "dropped without a result" case from the error taxonomy.
        self.inner.resolve(Err(CoFutureError::Broken));
    }
}

/// The read-capable handle returned alongside a [`CoPromise`]. Cheaply
/// cloneable; every clone observes the same resolution.
pub struct CoFuture<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for CoFuture<T> {
    fn clone(&self) -> Self {
        CoFuture {
            inner: self.inner.clone(),
        }
    }
}

/// Creates a pending future/promise pair.
pub fn pending<T: Send + 'static>() -> (CoPromise<T>, CoFuture<T>) {
    let inner = Arc::new(Inner {
        result: Mutex::new(None),
        callbacks: CallbackStack::new(),
        parent_cancel: None,
    });
    (
        CoPromise {
            inner: inner.clone(),
        },
        CoFuture { inner },
    )
}

impl<T: Send + 'static> CoFuture<T> {
    /// Attempts to resolve with `canceled`. A no-op if already resolved.
    /// Propagates to the parent future this was derived from via `map`/
    /// `flatMap`, if any.
    pub fn cancel(&self) -> bool {
        let changed = self.inner.resolve(Err(CoFutureError::Canceled));
        if let Some(propagate) = &self.inner.parent_cancel {
            propagate();
        }
        changed
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.result.lock().is_some()
    }

    pub fn is_canceled(&self) -> bool {
        matches!(
            self.inner.result.lock().as_ref(),
            Some(Err(CoFutureError::Canceled))
        )
    }
}

impl<T: Send + Clone + 'static> CoFuture<T> {
    /// Registers `callback` to fire exactly once, with the resolved result.
    /// Fires inline on the calling thread if already resolved.
    pub fn when_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, CoFutureError>) + Send + 'static,
    {
        let inner = self.inner.clone();
        let fire: Completion = Box::new(move || {
            let result = inner
                .result
                .lock()
                .clone()
                .expect("completion callback fired before resolution");
            callback(result);
        });
        match self.inner.callbacks.push(fire) {
            PushOutcome::Queued => {}
            PushOutcome::AlreadyClosed(fire) => fire(),
        }
    }

    pub fn when_success<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.when_complete(move |result| {
            if let Ok(value) = result {
                callback(value);
            }
        });
    }

    pub fn when_failure<F>(&self, callback: F)
    where
        F: FnOnce(CoFutureError) + Send + 'static,
    {
        self.when_complete(move |result| {
            if let Err(error) = result {
                callback(error);
            }
        });
    }

    /// Blocks the current coroutine until resolved. Returns immediately,
    /// without a context switch, if already resolved.
    ///
    /// # Panics
    /// Panics if called outside a running coroutine.
    pub fn await_value(&self) -> Result<T, CoFutureError> {
        self.await_timeout(None)
    }

    /// Like [`CoFuture::await_value`], but raises [`CoFutureError::Timeout`]
    /// if still unresolved after `timeout`. A zero duration short-circuits:
    /// resolved futures still return their value, unresolved ones time out
    /// immediately without suspending.
    pub fn await_timeout(&self, timeout: Option<Duration>) -> Result<T, CoFutureError> {
        if let Some(result) = self.inner.result.lock().clone() {
            return result;
        }
        if let Some(duration) = timeout {
            if duration.is_zero() {
                return Err(CoFutureError::Timeout);
            }
        }

        let inner = self.inner.clone();
        coroutine::suspend(move |resume| {
            let resume = Arc::new(Mutex::new(Some(resume)));

            let completion_resume = resume.clone();
            let callback_inner = inner.clone();
            let fire_on_complete: Completion = Box::new(move || {
                if let Some(resume) = completion_resume.lock().take() {
                    let result = callback_inner
                        .result
                        .lock()
                        .clone()
                        .expect("completion callback fired before resolution");
                    resume.fire(result);
                }
            });
            match inner.callbacks.push(fire_on_complete) {
                PushOutcome::Queued => {}
                PushOutcome::AlreadyClosed(fire) => fire(),
            }

            if let Some(duration) = timeout {
                let timeout_resume = resume.clone();
                crate::executor::Timer::global().schedule(
                    duration,
                    Box::new(move || {
                        if let Some(resume) = timeout_resume.lock().take() {
                            resume.fire(Err(CoFutureError::Timeout));
                        }
                    }),
                );
            }
        })
        .expect("CoFuture::await called outside of a coroutine")
    }

    /// Derives a future that resolves with `f` applied to this future's
    /// value. Cancellation on the child propagates back to this future.
    pub fn map<U, F>(&self, f: F) -> CoFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (child_promise, child_future) = self.derive_child();
        self.when_complete(move |result| {
            child_promise.complete(result.map(f));
        });
        child_future
    }

    /// Derives a future that resolves by first waiting on this future, then
    /// on the future `f` produces from its value.
    pub fn flat_map<U, F>(&self, f: F) -> CoFuture<U>
    where
        U: Send + Clone + 'static,
        F: FnOnce(T) -> CoFuture<U> + Send + 'static,
    {
        let (child_promise, child_future) = self.derive_child();
        self.when_complete(move |result| match result {
            Ok(value) => {
                let next = f(value);
                next.when_complete(move |inner_result| {
                    child_promise.complete(inner_result);
                });
            }
            Err(error) => {
                child_promise.complete(Err(error));
            }
        });
        child_future
    }

    fn derive_child<U: Send + 'static>(&self) -> (CoPromise<U>, CoFuture<U>) {
        let parent: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let parent_cancel: ParentCancel = Box::new(move || {
            if let Some(parent) = parent.upgrade() {
                parent.resolve(Err(CoFutureError::Canceled));
            }
        });
        let inner = Arc::new(Inner {
            result: Mutex::new(None),
            callbacks: CallbackStack::new(),
            parent_cancel: Some(parent_cancel),
        });
        (
            CoPromise {
                inner: inner.clone(),
            },
            CoFuture { inner },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SerialExecutor;
    use std::sync::mpsc;

    #[test]
    fn already_resolved_future_does_not_suspend() {
        let (promise, future) = pending::<i32>();
        promise.success(42);
        assert_eq!(future.await_value_outside_coroutine(), Ok(42));
    }

    impl<T: Send + Clone + 'static> CoFuture<T> {
        // Test-only helper: reads the already-resolved value without going
        // through `coroutine::suspend`, so plain unit tests can exercise the
        // fast path without a coroutine.
        fn await_value_outside_coroutine(&self) -> Result<T, CoFutureError> {
            self.inner.result.lock().clone().expect("not yet resolved")
        }
    }

    #[test]
    fn second_complete_is_a_no_op() {
        let (promise, future) = pending::<i32>();
        assert!(promise.success(1));
        assert!(!promise.success(2));
        assert_eq!(future.await_value_outside_coroutine(), Ok(1));
    }

    #[test]
    fn when_complete_fires_inline_after_resolution() {
        let (promise, future) = pending::<i32>();
        promise.success(7);
        let (tx, rx) = mpsc::channel();
        future.when_complete(move |result| {
            let _ = tx.send(result);
        });
        assert_eq!(rx.try_recv().unwrap(), Ok(7));
    }

    #[test]
    fn dropped_promise_resolves_broken() {
        let (promise, future) = pending::<i32>();
        drop(promise);
        assert_eq!(
            future.await_value_outside_coroutine(),
            Err(CoFutureError::Broken)
        );
    }

    #[test]
    fn coroutine_await_resumes_after_external_resolution() {
        let executor = SerialExecutor::new();
        let (promise, future) = pending::<i32>();
        let (result_tx, result_rx) = mpsc::channel();
        let future_for_body = future.clone();
        coroutine::launch(executor.clone(), move || {
            let value = future_for_body.await_value();
            result_tx.send(value).unwrap();
        });
        promise.success(9);
        assert_eq!(result_rx.recv().unwrap(), Ok(9));
        executor.shutdown();
    }

    #[test]
    fn map_propagates_cancel_to_parent() {
        let (_promise, future) = pending::<i32>();
        let child = future.map(|v| v * 2);
        child.cancel();
        assert!(future.is_canceled());
    }
}
