// Copyright (c) 2026 corostack contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy for the coroutine runtime, futures and channels.
//!
//! Mirrors the teacher crate's `Result<T, Error>`-everywhere style, but
//! expresses the variants with `thiserror` rather than a hand-rolled
//! `Display`/`Error` impl.

use thiserror::Error;

/// Errors produced by [`crate::coroutine`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineError {
    /// `Coroutine::suspend`/`await` was called from a thread that is not
    /// currently running a coroutine body. Unrecoverable programming error;
    /// callers that hit this should treat it as fatal rather than retry.
    #[error("await called outside of a coroutine")]
    NotInsideCoroutine,
}

/// Errors produced by [`crate::future::CoFuture`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoFutureError {
    /// The future was canceled, explicitly or through a propagating parent
    /// or enclosing [`crate::scope::CoScope`].
    #[error("future was canceled")]
    Canceled,
    /// `await(timeout)` elapsed before the future resolved.
    #[error("await timed out")]
    Timeout,
    /// The promise side was dropped without ever being resolved.
    #[error("promise was dropped without a result")]
    Broken,
}

/// Errors produced by [`crate::channel::Channel`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoChannelError {
    /// The channel is closed and, for receives, fully drained.
    #[error("channel is closed")]
    Closed,
    /// The channel was canceled; buffered elements are dropped.
    #[error("channel was canceled")]
    Canceled,
}

/// The result type threaded through a coroutine body's `?` operator when it
/// is started via a promise-returning launch API.
pub type CoResult<T, E = CoFutureError> = Result<T, E>;
