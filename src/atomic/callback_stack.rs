// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A lock-free stack of callbacks that can be closed and drained exactly
//! once.
//!
//! This is the `future`/`channel`/`scope` completion mechanism described in
//! spec section 4: callbacks accumulate via `push` while the stack is open;
//! the first `close` call takes ownership of the whole chain in a single
//! atomic swap and fires every callback that had been registered. Any
//! `push` racing with or arriving after `close` observes the closed
//! sentinel and is handed its value back so the caller can fire it inline
//! on the registering thread instead, matching the "exactly once" contract.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

/// Sentinel head value marking the stack as closed. Never a valid node
/// pointer since it is not 8-byte aligned for any real allocation.
fn closed_sentinel<T>() -> *mut Node<T> {
    1usize as *mut Node<T>
}

pub struct CallbackStack<T> {
    head: AtomicPtr<Node<T>>,
}

/// Outcome of [`CallbackStack::push`].
pub enum PushOutcome<T> {
    /// The callback was stored; it will fire when the stack is closed.
    Queued,
    /// The stack was already closed; the caller gets the value back and is
    /// expected to fire it inline, on the registering thread.
    AlreadyClosed(T),
}

impl<T> CallbackStack<T> {
    pub fn new() -> Self {
        CallbackStack {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Registers a callback. Returns [`PushOutcome::AlreadyClosed`] if the
    /// stack had already been drained, handing the value straight back.
    pub fn push(&self, value: T) -> PushOutcome<T> {
        let node = Box::into_raw(Box::new(Node {
            value,
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == closed_sentinel::<T>() {
                // SAFETY: we just allocated `node` above and no other thread
                // has observed its address, so reclaiming it here is sound.
                let boxed = unsafe { Box::from_raw(node) };
                return PushOutcome::AlreadyClosed(boxed.value);
            }

            unsafe { (*node).next = head };

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return PushOutcome::Queued,
                Err(observed) => head = observed,
            }
        }
    }

    /// Atomically marks the stack closed and returns every previously
    /// queued callback, oldest registration first. Idempotent: a second
    /// call observes an already-empty closed stack and returns nothing, so
    /// callers may invoke this from both their completion path and their
    /// `Drop` impl without double-firing anything.
    pub fn close(&self) -> Vec<T> {
        let old_head = self.head.swap(closed_sentinel::<T>(), Ordering::AcqRel);
        if old_head.is_null() || old_head == closed_sentinel::<T>() {
            return Vec::new();
        }

        let mut values = Vec::new();
        let mut current = old_head;
        while !current.is_null() {
            // SAFETY: `current` came from a chain we exclusively own after
            // winning the swap above; no other thread can still be holding
            // or mutating these nodes since `push` checks the sentinel
            // before linking in new ones.
            let node = unsafe { Box::from_raw(current) };
            current = node.next;
            values.push(node.value);
        }
        // Nodes were pushed most-recently-first (LIFO); reverse so
        // callbacks fire in registration order.
        values.reverse();
        values
    }

    /// True once [`CallbackStack::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.head.load(Ordering::Acquire) == closed_sentinel::<T>()
    }
}

impl<T> Default for CallbackStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for CallbackStack<T> {
    fn drop(&mut self) {
        // Reclaim anything left if the owner never called `close`. We don't
        // fire these -- by the time we're dropping, nobody holds a
        // reference to wait on the result, so there is nothing to notify.
        let _ = self.close();
    }
}

unsafe impl<T: Send> Send for CallbackStack<T> {}
unsafe impl<T: Send> Sync for CallbackStack<T> {}
