// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bounded pool of pre-allocated coroutine stacks.
//!
//! Adapted from the teacher's `StackPool` (`examples/rustcc-coroutine-rs/src/stack/stack_pool.rs`):
//! acquire pops a stack at least as large as requested, falling back to a
//! fresh allocation on a miss; release pushes back under a capacity gate and
//! otherwise lets the stack deallocate. The teacher protected this state with
//! a thread-local `RefCell` because its scheduler pinned coroutines to the
//! thread that spawned them; this pool is process-wide and, per the
//! mutex-free MPMC-queue-with-capacity-gate shape the shared-resources
//! design calls for, backed by `crossbeam_channel::bounded` -- the same
//! queue already used for executor job submission -- rather than a lock
//! around a `Vec`.

use std::env;
use std::sync::OnceLock;

use context::stack::ProtectedFixedSizeStack;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

/// Default stack size for a pooled coroutine, matching the teacher's own
/// default and the size spec.md names as typical (512 KiB).
pub const DEFAULT_STACK_SIZE: usize = 512 * 1024;

pub struct StackPool {
    tx: Sender<ProtectedFixedSizeStack>,
    rx: Receiver<ProtectedFixedSizeStack>,
    capacity: usize,
}

impl StackPool {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        StackPool { tx, rx, capacity }
    }

    /// Pops a cached stack at least `min_size` bytes, or allocates a fresh
    /// one on a miss. The fresh allocation plays the role of spec.md's
    /// "spill buffer": it is a standalone heap-backed stack that the
    /// coroutine keeps for the rest of its suspended lifetime rather than a
    /// relocation target for an existing stack's live frames.
    ///
    /// A queue can only be popped, not searched, so a cached stack smaller
    /// than `min_size` is dropped rather than put back -- harmless in
    /// practice since every caller in this crate requests
    /// [`DEFAULT_STACK_SIZE`] and the pool is therefore always homogeneous.
    pub fn acquire(&self, min_size: usize) -> ProtectedFixedSizeStack {
        while let Ok(stack) = self.rx.try_recv() {
            if stack.len() >= min_size {
                return stack;
            }
            debug!("stack pool dropped a cached stack too small for {} bytes", min_size);
        }
        debug!("stack pool miss for {} bytes, allocating fresh stack", min_size);
        ProtectedFixedSizeStack::new(min_size)
            .expect("failed to allocate a guarded coroutine stack")
    }

    /// Returns a stack to the pool if there is room, otherwise lets it drop
    /// (and deallocate its guard pages).
    pub fn release(&self, stack: ProtectedFixedSizeStack) {
        if self.tx.try_send(stack).is_err() {
            debug!("stack pool at capacity ({}), freeing stack", self.capacity);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_len(&self) -> usize {
        self.rx.len()
    }
}

/// Pool capacity, overridable with `COROSTACK_MAX_CACHED_STACKS`. Mirrors the
/// teacher's `RUST_MAX_CACHED_STACKS` environment override.
pub fn default_capacity() -> usize {
    env::var("COROSTACK_MAX_CACHED_STACKS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

static GLOBAL_POOL: OnceLock<StackPool> = OnceLock::new();

/// The process-wide stack pool used by [`crate::coroutine::launch`] unless a
/// coroutine is started with an explicit stack size override that bypasses
/// pooling entirely.
pub fn global() -> &'static StackPool {
    GLOBAL_POOL.get_or_init(|| StackPool::new(default_capacity()))
}
