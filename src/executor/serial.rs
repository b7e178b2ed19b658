// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A single worker thread draining a FIFO queue of thunks, one at a time, in
//! submission order. Models spec's "serial executor" / "specific-thread
//! executor" variants and is what backs the strict-interleave ordering test.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use log::{debug, trace};

use super::Executor;

enum Job {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

pub struct SerialExecutor {
    tx: Sender<Job>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = unbounded::<Job>();
        let worker = thread::Builder::new()
            .name("corostack-serial".into())
            .spawn(move || {
                for job in rx.iter() {
                    match job {
                        Job::Run(thunk) => {
                            trace!("serial executor running a thunk");
                            thunk();
                        }
                        Job::Shutdown => break,
                    }
                }
                debug!("serial executor worker exiting");
            })
            .expect("failed to spawn serial executor thread");

        Arc::new(SerialExecutor {
            tx,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    /// Signals the worker thread to drain the remaining queue and exit, then
    /// blocks until it has. Dropping the executor without calling this still
    /// shuts the thread down once the channel's senders are all gone.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Job::Shutdown);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Executor for SerialExecutor {
    fn submit(&self, thunk: Box<dyn FnOnce() + Send>) {
        let _ = self.tx.send(Job::Run(thunk));
    }
}
