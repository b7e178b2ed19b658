// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A bag of cancellables with guaranteed, exactly-once cancellation on
//! disposal or explicit cancel.
//!
//! `add`/`cancel` are protected by a single lock rather than a CAS-swapped
//! epoch: a scope's membership set is small and short-lived compared to a
//! channel's hot send/receive path, so the simplicity of one critical
//! section wins over a lock-free membership structure here.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::atomic::{CallbackStack, PushOutcome};
use crate::channel::Channel;
use crate::future::CoFuture;

/// Anything that can be told to stop, idempotently, and that can report
/// when it has finished (by any means: cancellation, natural completion, or
/// destruction).
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

enum Members {
    Open(Vec<Arc<dyn Cancellable>>),
    Canceled,
}

/// A cancellation-propagating collection. Dropping a `CoScope` cancels it,
/// exactly like an explicit [`CoScope::cancel`] call.
pub struct CoScope {
    members: Mutex<Members>,
    completion: CallbackStack<Box<dyn FnOnce() + Send>>,
}

impl CoScope {
    pub fn new() -> Arc<CoScope> {
        Arc::new(CoScope {
            members: Mutex::new(Members::Open(Vec::new())),
            completion: CallbackStack::new(),
        })
    }

    /// Adds `item` to the scope. If the scope is already canceled, `item`
    /// is canceled immediately instead of being stored -- it is never both
    /// stored and left uncanceled, and never canceled twice.
    pub fn add(&self, item: Arc<dyn Cancellable>) {
        let rejected = {
            let mut members = self.members.lock();
            match &mut *members {
                Members::Open(items) => {
                    items.push(item.clone());
                    false
                }
                Members::Canceled => true,
            }
        };
        if rejected {
            item.cancel();
        }
    }

    /// Cancels the scope: every current member is canceled exactly once,
    /// in insertion order, then `whenComplete` callbacks fire. Idempotent.
    pub fn cancel(&self) {
        let items = {
            let mut members = self.members.lock();
            match std::mem::replace(&mut *members, Members::Canceled) {
                Members::Open(items) => items,
                Members::Canceled => Vec::new(),
            }
        };
        for item in &items {
            item.cancel();
        }
        for callback in self.completion.close() {
            callback();
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(&*self.members.lock(), Members::Canceled)
    }

    /// Registers a callback that fires once the scope is canceled. Fires
    /// inline if the scope is already canceled.
    pub fn when_complete<F: FnOnce() + Send + 'static>(&self, callback: F) {
        match self.completion.push(Box::new(callback)) {
            PushOutcome::Queued => {}
            PushOutcome::AlreadyClosed(callback) => callback(),
        }
    }
}

impl Drop for CoScope {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Cancellable for CoScope {
    fn cancel(&self) {
        CoScope::cancel(self);
    }
}

impl<T: Send + 'static> Cancellable for CoFuture<T> {
    fn cancel(&self) {
        CoFuture::cancel(self);
    }
}

impl<T: Send + 'static> Cancellable for Channel<T> {
    fn cancel(&self) {
        Channel::cancel(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    struct CountingCancellable {
        count: Arc<AtomicUsize>,
    }

    impl Cancellable for CountingCancellable {
        fn cancel(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn add_then_cancel_cancels_every_member() {
        let scope = CoScope::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            scope.add(Arc::new(CountingCancellable {
                count: count.clone(),
            }));
        }
        scope.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn add_after_cancel_cancels_immediately_and_is_not_stored() {
        let scope = CoScope::new();
        scope.cancel();
        let count = Arc::new(AtomicUsize::new(0));
        scope.add(Arc::new(CountingCancellable {
            count: count.clone(),
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Canceling again must not re-cancel the late-added member.
        scope.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn when_complete_fires_once() {
        let scope = CoScope::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        scope.when_complete(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.cancel();
        scope.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_scope_cancels_members() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let scope = CoScope::new();
            scope.add(Arc::new(CountingCancellable {
                count: count.clone(),
            }));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_add_and_cancel_loses_nothing() {
        let scope = CoScope::new();
        let count = Arc::new(AtomicUsize::new(0));
        let threads = 8;
        let per_thread = 1_250;
        let barrier = Arc::new(Barrier::new(threads + 1));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let scope = scope.clone();
                let count = count.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..per_thread {
                        scope.add(Arc::new(CountingCancellable {
                            count: count.clone(),
                        }));
                    }
                })
            })
            .collect();

        barrier.wait();
        scope.cancel();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), (threads * per_thread) as usize);
    }
}
