use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::outcome::{Outcome, Shape};
use crate::pair::{BasicFuture, FailureOf};
use crate::{Error, Failure};

/// A future many observers can hold at once. Clones share the same underlying
/// [`BasicFuture`], and reading through a shared handle never consumes the
/// outcome.
///
/// # Examples
///
/// ```
/// use lightfuture::Promise;
/// use std::thread;
/// let mut promise = Promise::<String>::new();
/// let consumer = promise.get_future().unwrap().share().unwrap();
/// let consumer2 = consumer.clone();
/// let task1 = thread::spawn(move || {
///     println!("Received on task 1 {:?}", consumer.get());
/// });
/// let task2 = thread::spawn(move || {
///     println!("Received on task 2 {:?}", consumer2.get());
/// });
/// promise.set_value("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// task2.join().expect("The task2 thread has panicked.");
/// ```
pub struct BasicSharedFuture<S: Shape> {
    future: Option<Arc<BasicFuture<S>>>,
    /// Identifies this handle's task among everything awaiting the future.
    observer: u64,
}

fn next_observer() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

impl<S: Shape> Clone for BasicSharedFuture<S> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            observer: next_observer(),
        }
    }
}

impl<S: Shape> BasicSharedFuture<S> {
    pub(crate) fn new(future: BasicFuture<S>) -> Self {
        Self {
            future: Some(Arc::new(future)),
            observer: next_observer(),
        }
    }

    /// A shared handle with no future behind it is never handed out by this
    /// crate; reaching one is unrecoverable.
    fn check(&self) -> &BasicFuture<S> {
        match self.future.as_deref() {
            Some(future) => future,
            None => {
                tracing::error!("shared future used without an underlying future");
                std::process::abort()
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.check().is_ready()
    }

    pub fn is_empty(&self) -> bool {
        self.check().is_empty()
    }

    pub fn has_value(&self) -> bool {
        self.check().has_value()
    }

    pub fn has_error(&self) -> bool {
        self.check().has_error()
    }

    pub fn has_exception(&self) -> bool {
        self.check().has_exception()
    }

    pub fn valid(&self) -> bool {
        self.check().valid()
    }

    pub fn wait(&self) -> Result<(), Error> {
        self.check().wait()
    }

    pub fn get_error_and<U>(&self, other: U) -> Option<U> {
        self.check().get_error_and(other)
    }

    pub fn get_exception_and<U>(&self, other: U) -> Option<U> {
        self.check().get_exception_and(other)
    }

    pub fn get_and<U>(&self, other: U) -> Option<U> {
        self.check().get_and(other)
    }
}

impl<S: Shape> BasicSharedFuture<S>
where
    S::Value: Clone,
    S::Error: Clone,
    S::Exception: Clone,
{
    fn peek(&self) -> Result<Outcome<S>, Error> {
        self.check().with_outcome(|outcome| outcome.cloned())
    }

    /// Waits for the outcome and returns a copy of the value.
    pub fn get(&self) -> Result<S::Value, FailureOf<S>> {
        self.peek()?.into_result()
    }

    pub fn get_or(&self, default: S::Value) -> S::Value {
        self.peek()
            .ok()
            .and_then(Outcome::into_value)
            .unwrap_or(default)
    }

    pub fn get_error(&self) -> Result<Option<S::Error>, Error> {
        self.peek().map(Outcome::into_error)
    }

    pub fn get_error_or(&self, default: S::Error) -> S::Error {
        self.peek()
            .ok()
            .and_then(Outcome::into_error)
            .unwrap_or(default)
    }

    pub fn get_exception(&self) -> Result<Option<S::Exception>, Error> {
        self.peek().map(Outcome::into_exception)
    }

    pub fn get_exception_or(&self, default: S::Exception) -> S::Exception {
        self.peek()
            .ok()
            .and_then(Outcome::into_exception)
            .unwrap_or(default)
    }
}

impl<S: Shape> Default for BasicSharedFuture<S> {
    fn default() -> Self {
        Self {
            future: None,
            observer: next_observer(),
        }
    }
}

impl<S: Shape> Drop for BasicSharedFuture<S> {
    /// Stop waking this handle's task once it is gone.
    fn drop(&mut self) {
        if let Some(future) = self.future.as_deref() {
            future.forget_observer(self.observer);
        }
    }
}

impl<S: Shape> Future for BasicSharedFuture<S>
where
    S::Value: Clone,
    S::Error: Clone,
    S::Exception: Clone,
{
    type Output = Result<S::Value, FailureOf<S>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.check()
            .poll_outcome(cx, Some(self.observer), |outcome| outcome.cloned())
            .map(|fetched| fetched.map_err(Failure::from).and_then(Outcome::into_result))
    }
}

impl<S: Shape> Debug for BasicSharedFuture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.future.as_deref() {
            Some(future) => f.debug_tuple("SharedFuture").field(future).finish(),
            None => write!(f, "SharedFuture(<none>)"),
        }
    }
}
