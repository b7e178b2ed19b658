// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A fixed-size pool of worker threads pulling from a shared MPMC queue.
//! Modeled loosely on the teacher's `Scheduler` minus its work-stealing
//! `deque` and `mio` reactor integration, both out of scope here; sized from
//! `num_cpus` exactly as the teacher's own `Cargo.toml` already depended on
//! that crate for.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use log::trace;
use parking_lot::Mutex;

use super::Executor;

enum Job {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

pub struct ThreadPoolExecutor {
    tx: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    /// Spawns a pool sized to the number of logical CPUs.
    pub fn new() -> Arc<Self> {
        Self::with_workers(num_cpus::get().max(1))
    }

    pub fn with_workers(count: usize) -> Arc<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("corostack-pool-{index}"))
                .spawn(move || {
                    for job in rx.iter() {
                        match job {
                            Job::Run(thunk) => {
                                trace!("thread pool worker {index} running a thunk");
                                thunk();
                            }
                            Job::Shutdown => break,
                        }
                    }
                })
                .expect("failed to spawn thread pool worker");
            workers.push(handle);
        }

        Arc::new(ThreadPoolExecutor {
            tx,
            workers: Mutex::new(workers),
        })
    }

    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        for _ in workers.iter() {
            let _ = self.tx.send(Job::Shutdown);
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, thunk: Box<dyn FnOnce() + Send>) {
        let _ = self.tx.send(Job::Run(thunk));
    }
}
