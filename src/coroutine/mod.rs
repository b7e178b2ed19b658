// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Stackful coroutines: a dedicated stack per coroutine, a register-level
//! context switch, and the `suspend` primitive that `CoFuture`/`Channel`
//! await on top of.
//!
//! The coroutine state machine spec describes (`prepared -> running ->
//! suspending -> suspended -> restarting -> ...`) is not reified as an
//! explicit field anywhere in this module: which state a coroutine is in is
//! always exactly determined by which code is currently executing on its
//! stack (or, for `suspended`, by the fact that nothing is). Encoding it as
//! a separate enum would just be a cache of information control flow already
//! carries and would need to be kept in lockstep with it by hand.

mod context_switch;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use context::Context;
use parking_lot::Mutex;

use crate::error::{CoFutureError, CoroutineError};
use crate::executor::Executor;
use crate::future::CoFuture;
use context_switch::{Handoff, ParkableSlot};

pub use context_switch::is_inside_coroutine;

const ARMED: u8 = 0;
const SUSPENDED: u8 = 1;
const FIRED: u8 = 2;

/// The slot a single `suspend` call blocks on. Implements the `{none,
/// armed, firing, fired}` resume protocol from spec section 4.1 as a
/// 3-state `AtomicU8` (there is no separate `none` state here: the slot
/// only exists from the moment `suspend` creates it, which is already
/// `armed`).
struct AwaitSlot<T> {
    state: AtomicU8,
    value: Mutex<Option<T>>,
    parked: Mutex<Option<Context>>,
    executor: Arc<dyn Executor>,
}

impl<T: Send + 'static> AwaitSlot<T> {
    fn new(executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(AwaitSlot {
            state: AtomicU8::new(ARMED),
            value: Mutex::new(None),
            parked: Mutex::new(None),
            executor,
        })
    }

    /// Called by whoever resolves the awaited thing, possibly from a
    /// different thread than the one that created this slot, possibly
    /// before `suspend` has even decided to suspend.
    fn fire(self: Arc<Self>, value: T) {
        *self.value.lock() = Some(value);
        if self
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Won the race against the coroutine's own suspend attempt: the
            // coroutine hasn't switched away and never will for this await.
            // It'll see FIRED via its own failed CAS and read the value
            // inline. This is the suspension-free fast path.
            return;
        }

        // Lost the race: the coroutine already recorded itself as
        // suspended. Claim the slot and hand the continuation to its
        // resume submitter.
        let previous = self.state.swap(FIRED, Ordering::AcqRel);
        debug_assert_eq!(previous, SUSPENDED);

        let executor = self.executor.clone();
        let slot = self;
        executor.submit(Box::new(move || {
            let context = slot.take_parked_blocking();
            context_switch::drive(context, Handoff::Resume, slot.executor.clone());
        }));
    }

    fn try_mark_suspended(&self) -> bool {
        self.state
            .compare_exchange(ARMED, SUSPENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take_value_if_fired(&self) -> Option<T> {
        if self.state.load(Ordering::Acquire) == FIRED {
            self.value.lock().take()
        } else {
            None
        }
    }

    fn take_value(&self) -> Option<T> {
        self.value.lock().take()
    }

    /// Spins until the driver has stored the coroutine's parked context.
    /// The window is bounded by a handful of instructions on the suspending
    /// side (the CAS to `SUSPENDED` happens before the physical jump, so a
    /// resume racing in right on top of it may observe `SUSPENDED` slightly
    /// before the jump completes); it is never unbounded.
    fn take_parked_blocking(&self) -> Context {
        loop {
            if let Some(context) = self.parked.lock().take() {
                return context;
            }
            std::hint::spin_loop();
        }
    }
}

impl<T: Send + 'static> ParkableSlot for AwaitSlot<T> {
    fn park(&self, context: Context) {
        *self.parked.lock() = Some(context);
    }
}

/// The one-shot continuation a `suspend` registrant calls to wake the
/// coroutine back up, carrying the awaited value.
pub struct Resume<T: Send + 'static> {
    slot: Arc<AwaitSlot<T>>,
}

impl<T: Send + 'static> Resume<T> {
    pub fn fire(self, value: T) {
        self.slot.fire(value);
    }
}

/// Launches `body` as a coroutine on `executor`. Returns a future that
/// resolves with the body's result; a panic inside `body` is caught and
/// surfaces as [`CoFutureError::Broken`] rather than aborting the process,
/// matching the "wrapped by a promise" branch of spec's failure handling.
pub fn launch<R, F>(executor: Arc<dyn Executor>, body: F) -> CoFuture<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (promise, future) = crate::future::pending();
    let erased: Box<dyn FnOnce() + Send> = Box::new(move || {
        match context_switch::catch(body) {
            Ok(value) => promise.success(value),
            Err(_panic) => promise.fail(CoFutureError::Broken),
        };
    });
    context_switch::start(executor, erased);
    future
}

/// Launches `body` as a fire-and-forget coroutine on `executor`: there is no
/// promise wrapping it and nothing to observe its result through. A panic
/// inside `body` is therefore not caught -- it unwinds straight out of the
/// coroutine's trampoline and aborts the process, matching "a coroutine that
/// throws without a surrounding promise aborts the process."
pub fn spawn<F>(executor: Arc<dyn Executor>, body: F)
where
    F: FnOnce() + Send + 'static,
{
    context_switch::start(executor, Box::new(body));
}

/// The foundational suspend primitive: inside a running coroutine, calls
/// `register(resume)` and then blocks the coroutine (context-switching back
/// to its host thread) until `resume.fire(value)` is called, at which point
/// this returns `value`. If `register` invokes `resume` before returning,
/// the context switch never happens at all.
///
/// Outside a coroutine, fails immediately with
/// [`CoroutineError::NotInsideCoroutine`].
pub fn suspend<T, F>(register: F) -> Result<T, CoroutineError>
where
    T: Send + 'static,
    F: FnOnce(Resume<T>),
{
    let executor = context_switch::current_executor().ok_or(CoroutineError::NotInsideCoroutine)?;
    suspend_on(executor, register)
}

/// Like [`suspend`], but the slot's resume submitter is `executor` rather
/// than whichever executor is currently driving this coroutine. Used by
/// [`switch_to`] to move a coroutine onto a different executor.
pub(crate) fn suspend_on<T, F>(executor: Arc<dyn Executor>, register: F) -> Result<T, CoroutineError>
where
    T: Send + 'static,
    F: FnOnce(Resume<T>),
{
    let slot = AwaitSlot::new(executor);
    register(Resume { slot: slot.clone() });

    if let Some(value) = slot.take_value_if_fired() {
        return Ok(value);
    }

    if slot.try_mark_suspended() {
        let host_context = context_switch::take_host_context();
        let parked: Arc<dyn ParkableSlot> = slot.clone();
        let data = Box::into_raw(Box::new(Handoff::Suspend(parked))) as usize;
        let transfer = unsafe { host_context.resume(data) };
        // The only thing ever sent into an already-started coroutine is
        // Handoff::Resume; the awaited value itself lives in `slot`, which
        // survived the switch as a local variable on this very stack.
        let _ = unsafe { Box::from_raw(transfer.data as *mut Handoff) };
        context_switch::publish_host_context(transfer.context);
        Ok(slot.take_value().expect("resumed coroutine slot has no value"))
    } else {
        Ok(slot.take_value().expect("fired coroutine slot has no value"))
    }
}

/// Suspends the current coroutine and resumes it on `executor`. Outside a
/// coroutine, fails with [`CoroutineError::NotInsideCoroutine`].
pub fn switch_to(executor: Arc<dyn Executor>) -> Result<(), CoroutineError> {
    context_switch::current_executor().ok_or(CoroutineError::NotInsideCoroutine)?;
    let target = executor.clone();
    suspend_on(executor, move |resume: Resume<()>| {
        target.submit(Box::new(move || resume.fire(())));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SerialExecutor;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    #[test]
    fn suspend_outside_coroutine_fails() {
        let result = suspend::<(), _>(|resume| resume.fire(()));
        assert_eq!(result, Err(CoroutineError::NotInsideCoroutine));
    }

    #[test]
    fn suspend_fast_path_elides_switch() {
        let executor = SerialExecutor::new();
        let (tx, rx) = mpsc::channel();
        let fired_inline = Arc::new(AtomicBool::new(false));
        let fired_inline_clone = fired_inline.clone();
        context_switch::start(
            executor.clone(),
            Box::new(move || {
                let value = suspend::<i32, _>(|resume| {
                    fired_inline_clone.store(true, Ordering::SeqCst);
                    resume.fire(42);
                })
                .unwrap();
                let _ = tx.send(value);
            }),
        );
        assert_eq!(rx.recv().unwrap(), 42);
        assert!(fired_inline.load(Ordering::SeqCst));
        executor.shutdown();
    }

    #[test]
    fn suspend_async_path_resumes_later() {
        let executor = SerialExecutor::new();
        let (result_tx, result_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel::<Resume<i32>>();
        context_switch::start(
            executor.clone(),
            Box::new(move || {
                let value = suspend::<i32, _>(|resume| {
                    resume_tx.send(resume).ok();
                })
                .unwrap();
                let _ = result_tx.send(value);
            }),
        );
        let resume = resume_rx.recv().unwrap();
        resume.fire(7);
        assert_eq!(result_rx.recv().unwrap(), 7);
        executor.shutdown();
    }
}
