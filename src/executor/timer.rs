// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Background-thread timer service backing `Future::await(timeout)`.
//!
//! One dedicated thread owns a min-heap of deadlines and fires callbacks as
//! they come due, playing the role `tokio_core::reactor::Timeout` played for
//! `examples/amilajack-corona`'s waiting coroutines -- except here the timer
//! is ambient infrastructure rather than something borrowed from a reactor
//! crate, since spec leaves timers entirely up to the embedder.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

struct Deadline {
    at: Instant,
    id: u64,
    callback: Box<dyn FnOnce() + Send>,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}
impl Eq for Deadline {}
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts first.
        other.at.cmp(&self.at).then_with(|| other.id.cmp(&self.id))
    }
}
impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    heap: Mutex<BinaryHeap<Deadline>>,
    condvar: Condvar,
    next_id: AtomicU64,
}

/// A handle to a scheduled, not-yet-fired timer.
pub struct TimerHandle {
    id: u64,
    shared: Arc<Shared>,
}

impl TimerHandle {
    /// Attempts to prevent the callback from firing. Returns `false` if the
    /// deadline already fired (or is about to); racing with a fire is benign
    /// for this crate's uses since the downstream completion is
    /// single-assignment.
    pub fn cancel(&self) -> bool {
        let mut heap = self.shared.heap.lock().unwrap();
        let len_before = heap.len();
        heap.retain(|d| d.id != self.id);
        len_before != heap.len()
    }
}

pub struct Timer {
    shared: Arc<Shared>,
}

impl Timer {
    fn new() -> Self {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            condvar: Condvar::new(),
            next_id: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        thread::Builder::new()
            .name("corostack-timer".into())
            .spawn(move || run(worker_shared))
            .expect("failed to spawn timer thread");

        Timer { shared }
    }

    /// The process-wide timer, lazily started on first use.
    pub fn global() -> &'static Timer {
        static GLOBAL: OnceLock<Timer> = OnceLock::new();
        GLOBAL.get_or_init(Timer::new)
    }

    pub fn schedule(&self, after: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Deadline {
            at: Instant::now() + after,
            id,
            callback,
        };
        {
            let mut heap = self.shared.heap.lock().unwrap();
            heap.push(deadline);
        }
        self.shared.condvar.notify_all();
        TimerHandle {
            id,
            shared: self.shared.clone(),
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let mut heap = shared.heap.lock().unwrap();
        loop {
            match heap.peek() {
                None => {
                    heap = shared.condvar.wait(heap).unwrap();
                }
                Some(next) => {
                    let now = Instant::now();
                    if next.at <= now {
                        break;
                    }
                    let wait_for = next.at - now;
                    let (guard, _timeout) = shared.condvar.wait_timeout(heap, wait_for).unwrap();
                    heap = guard;
                }
            }
        }
        let due = heap.pop().expect("checked non-empty above");
        drop(heap);
        (due.callback)();
    }
}
