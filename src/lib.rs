//! Lightweight single-assignment promise/future pairs.
//!
//! A [`Promise`] writes exactly one outcome (a value, an error or an exception)
//! and the [`Future`] it hands out observes it, usually from another thread.
//! Either end may be moved, swapped or dropped on its own:
//!
//! - dropping a promise that never wrote anything breaks its future;
//! - dropping a future detaches its promise;
//! - an outcome written before the future is requested is kept for it.
//!
//! Futures can be waited on with [`BasicFuture::wait`]/[`BasicFuture::get`],
//! which park the calling thread, or `.await`ed from any executor.
//!
//! ```
//! use lightfuture::Promise;
//! use std::thread;
//! let mut promise = Promise::<u32>::new();
//! let future = promise.get_future().unwrap();
//! let task = thread::spawn(move || promise.set_value(42));
//! assert_eq!(future.get().unwrap(), 42);
//! task.join().unwrap().unwrap();
//! ```
mod error;
mod lock;
pub mod outcome;
pub mod pair;
pub mod poly;

pub use error::{Error, Failure};
pub use outcome::{Exception, Fallible, Full, Optional, Outcome, Rereadable, Shape};
pub use pair::{BasicFuture, BasicPromise, FailureOf};
pub use poly::BasicSharedFuture;

use std::io::ErrorKind;

/// Value, error and exception transport.
pub type Promise<T, E = ErrorKind, X = Exception> = BasicPromise<Full<T, E, X>>;
pub type Future<T, E = ErrorKind, X = Exception> = BasicFuture<Full<T, E, X>>;
pub type SharedFuture<T, E = ErrorKind, X = Exception> = BasicSharedFuture<Full<T, E, X>>;

/// Value and error transport, no exceptions.
pub type PromiseResult<T, E = ErrorKind> = BasicPromise<Fallible<T, E>>;
pub type FutureResult<T, E = ErrorKind> = BasicFuture<Fallible<T, E>>;
pub type SharedFutureResult<T, E = ErrorKind> = BasicSharedFuture<Fallible<T, E>>;

/// Value transport only.
pub type PromiseOption<T> = BasicPromise<Optional<T>>;
pub type FutureOption<T> = BasicFuture<Optional<T>>;
pub type SharedFutureOption<T> = BasicSharedFuture<Optional<T>>;

/// A future that is already ready with `value`.
pub fn make_ready_future<T>(value: T) -> Future<T> {
    BasicFuture::ready(value)
}

/// A future that already holds `error`.
pub fn make_errored_future<T>(error: ErrorKind) -> Future<T> {
    BasicFuture::errored(error)
}

/// A future that already holds `exception`.
pub fn make_exceptional_future<T>(exception: Exception) -> Future<T> {
    BasicFuture::exceptional(exception)
}

/// A value-and-error future that is already ready with `value`.
pub fn make_ready_future_result<T, E>(value: T) -> FutureResult<T, E> {
    BasicFuture::ready(value)
}

/// A value-and-error future that already holds `error`.
pub fn make_errored_future_result<T, E>(error: E) -> FutureResult<T, E> {
    BasicFuture::errored(error)
}

/// A value-only future that is already ready with `value`.
pub fn make_ready_future_option<T>(value: T) -> FutureOption<T> {
    BasicFuture::ready(value)
}
