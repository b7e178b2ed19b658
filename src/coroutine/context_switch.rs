// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The register-level context switch and the handoff protocol that rides on
//! top of it.
//!
//! The teacher hand-rolled per-architecture save areas and a nightly-only
//! `ctxswtch` static library. `corostack` gets the same two-context design
//! (host context / coroutine context) from the published, stable `context`
//! crate instead: `Context::new` prepares a coroutine context on top of a
//! stack, and `Context::resume` is the single primitive that flips which
//! side is running. Everything else here -- the `Handoff` enum, the
//! `FRAMES` thread-local, `drive`/`trampoline` -- is this crate's own
//! generalization of the `Switch`/driver pattern in
//! `examples/amilajack-corona`'s `switch.rs`/`coroutine.rs` to an arbitrary
//! executor instead of a single `tokio_core` reactor thread.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use context::{Context, Transfer};
use log::trace;

use crate::executor::Executor;
use crate::stack::Stack;

/// Something a suspended coroutine can be resumed through once its context
/// has been parked by the driver. Implemented by `AwaitSlot<T>` for whichever
/// `T` is being awaited; boxed as a trait object because `Handoff` itself
/// cannot be generic (it rides through the same `Context`/`Transfer`
/// conduit for every suspension in the process).
pub(crate) trait ParkableSlot: Send + Sync {
    fn park(&self, context: Context);
}

/// What flows across a context switch between a coroutine and whichever
/// side resumed it.
pub(crate) enum Handoff {
    /// Host to coroutine, exactly once: the body to run and the stack it
    /// runs on.
    Start {
        body: Box<dyn FnOnce() + Send>,
        stack: Stack,
    },
    /// Coroutine to host: I am suspending; park my continuation here.
    Suspend(Arc<dyn ParkableSlot>),
    /// Host to coroutine: continue. The awaited value already lives in the
    /// `AwaitSlot` the coroutine is holding locally; nothing rides along.
    Resume,
    /// Coroutine to host, exactly once: the body returned (or its panic was
    /// already caught and turned into a failed promise); here is the stack
    /// back.
    Finished(Stack),
}

struct ActiveFrame {
    host_context: RefCell<Option<Context>>,
    executor: Arc<dyn Executor>,
}

thread_local! {
    static FRAMES: RefCell<Vec<ActiveFrame>> = RefCell::new(Vec::new());
}

/// True inside a running (or restarting) coroutine body on this thread.
pub fn is_inside_coroutine() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

pub(crate) fn current_executor() -> Option<Arc<dyn Executor>> {
    FRAMES.with(|frames| frames.borrow().last().map(|frame| frame.executor.clone()))
}

pub(crate) fn publish_host_context(context: Context) {
    FRAMES.with(|frames| {
        let frames = frames.borrow();
        let frame = frames
            .last()
            .expect("publish_host_context called with no active coroutine frame");
        *frame.host_context.borrow_mut() = Some(context);
    });
}

pub(crate) fn take_host_context() -> Context {
    FRAMES.with(|frames| {
        let frames = frames.borrow();
        let frame = frames
            .last()
            .expect("take_host_context called with no active coroutine frame");
        let context = frame
            .host_context
            .borrow_mut()
            .take()
            .expect("host context missing: suspend called twice without an intervening resume");
        context
    })
}

/// The entry point every coroutine's `Context` starts at, invoked exactly
/// once by the underlying assembly on the first `resume()`.
extern "C" fn trampoline(transfer: Transfer) -> ! {
    let handoff = *unsafe { Box::from_raw(transfer.data as *mut Handoff) };
    let (body, stack) = match handoff {
        Handoff::Start { body, stack } => (body, stack),
        _ => unreachable!("a coroutine must start with Handoff::Start"),
    };
    publish_host_context(transfer.context);

    body();

    let host_context = take_host_context();
    let out = Box::into_raw(Box::new(Handoff::Finished(stack))) as usize;
    let _ = unsafe { host_context.resume(out) };
    unreachable!("a finished coroutine's context must never be resumed again");
}

/// Outcome of driving a coroutine through one run-until-it-yields episode.
pub(crate) enum DriveOutcome {
    Suspended,
    Finished,
}

/// Runs (or resumes) a coroutine until it next suspends or finishes.
/// Brackets the call with a `FRAMES` push/pop so that whichever OS thread
/// happens to execute this episode has the right ambient executor and host
/// context available to any `suspend()` call the coroutine makes, even if
/// the coroutine started life -- or last suspended -- on a different
/// thread entirely.
pub(crate) fn drive(context: Context, handoff: Handoff, executor: Arc<dyn Executor>) -> DriveOutcome {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(ActiveFrame {
            host_context: RefCell::new(None),
            executor,
        })
    });

    let data = Box::into_raw(Box::new(handoff)) as usize;
    let transfer = unsafe { context.resume(data) };
    let handoff_out = *unsafe { Box::from_raw(transfer.data as *mut Handoff) };

    FRAMES.with(|frames| {
        frames.borrow_mut().pop();
    });

    match handoff_out {
        Handoff::Suspend(slot) => {
            trace!("coroutine suspended, parking its context");
            slot.park(transfer.context);
            DriveOutcome::Suspended
        }
        Handoff::Finished(stack) => {
            trace!("coroutine finished, releasing its stack");
            crate::stack::global().release(stack);
            DriveOutcome::Finished
        }
        _ => unreachable!("a coroutine may only yield Suspend or Finished"),
    }
}

/// Starts a brand-new coroutine on `executor`: acquires a stack, builds a
/// `Context` on top of it and drives the first episode.
pub(crate) fn start(executor: Arc<dyn Executor>, body: Box<dyn FnOnce() + Send>) {
    let exec_for_thunk = executor.clone();
    executor.submit(Box::new(move || {
        let stack = crate::stack::global().acquire(crate::stack::DEFAULT_STACK_SIZE);
        let context = unsafe { Context::new(&stack, trampoline) };
        let handoff = Handoff::Start { body, stack };
        drive(context, handoff, exec_for_thunk);
    }));
}

/// Any payload that must cross a panic boundary uses this alias for clarity.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Runs `body`, catching a panic rather than letting it unwind across the
/// coroutine's `extern "C"` entry point.
pub(crate) fn catch<R>(body: impl FnOnce() -> R) -> Result<R, PanicPayload> {
    panic::catch_unwind(AssertUnwindSafe(body))
}
