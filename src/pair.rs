use std::fmt::{self, Debug};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::lock::{status, Cell, Link, PairGuard};
use crate::outcome::{Outcome, Shape};
use crate::poly::BasicSharedFuture;
use crate::{Error, Failure};

/// What `get` on a future of shape `S` fails with.
pub type FailureOf<S> = Failure<<S as Shape>::Error, <S as Shape>::Exception>;

/// The writing end of a promise/future pair.
///
/// A promise starts out holding its outcome slot. [`get_future`] hands the slot
/// to a future; every outcome written afterwards goes straight to that future.
/// An outcome written before any future exists is kept until one is requested.
///
/// # Examples
///
/// ```
/// use lightfuture::Promise;
/// use std::thread;
/// let mut promise = Promise::<String>::new();
/// let future = promise.get_future().unwrap();
///
/// let task1 = thread::spawn(move || {
///     println!("Received {:?}", future.get());
/// });
/// promise.set_value("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// ```
///
/// [`get_future`]: BasicPromise::get_future
pub struct BasicPromise<S: Shape> {
    cell: Arc<Cell<S>>,
}

impl<S: Shape> BasicPromise<S> {
    pub fn new() -> Self {
        BasicPromise {
            cell: Arc::new(Cell::new()),
        }
    }

    /// Creates the future associated with this promise. Succeeds at most once.
    ///
    /// If an outcome was already written the future comes back ready and the
    /// promise detaches from it.
    pub fn get_future(&mut self) -> Result<BasicFuture<S>, Error> {
        {
            let mut guard = PairGuard::acquire(&mut self.cell);
            if guard.link != Link::Unclaimed {
                return Err(Error::FutureAlreadyRetrieved);
            }
            guard.link = if guard.outcome.is_ready() {
                Link::Detached
            } else {
                Link::Linked
            };
            tracing::trace!(link = ?guard.link, "future retrieved");
        }
        Ok(BasicFuture {
            cell: Some(Arc::clone(&self.cell)),
        })
    }

    /// Whether a future was ever requested from this promise. Not a
    /// synchronization point; the answer may be stale.
    pub fn has_future(&self) -> bool {
        self.cell.status() & status::RETRIEVED != 0
    }

    pub fn set_value(&mut self, value: S::Value) -> Result<(), Error> {
        self.settle(|| Outcome::Value(value))
    }

    /// Builds the value only once the promise is known to accept it.
    pub fn emplace_value<F>(&mut self, make: F) -> Result<(), Error>
    where
        F: FnOnce() -> S::Value,
    {
        self.settle(|| Outcome::Value(make()))
    }

    pub fn set_error(&mut self, error: S::Error) -> Result<(), Error> {
        self.settle(|| Outcome::Error(error))
    }

    pub fn set_exception(&mut self, exception: S::Exception) -> Result<(), Error> {
        self.settle(|| Outcome::Exception(exception))
    }

    /// Exchanges the state of two promises, each future following its own
    /// outcome.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.cell, &mut other.cell);
    }

    fn settle<F>(&mut self, make: F) -> Result<(), Error>
    where
        F: FnOnce() -> Outcome<S>,
    {
        let mut guard = PairGuard::acquire(&mut self.cell);
        match guard.link {
            Link::Detached => Err(Error::AlreadySet),
            _ if !guard.outcome.is_empty() => Err(Error::AlreadySet),
            Link::Linked => {
                guard.outcome = make();
                guard.link = Link::Detached;
                guard.release_waiters();
                tracing::trace!("outcome delivered to future");
                Ok(())
            }
            Link::Unclaimed => {
                guard.outcome = make();
                Ok(())
            }
        }
    }
}

impl<T, E> BasicPromise<crate::Full<T, E, crate::Exception>> {
    /// Stores any error object in the exception channel.
    pub fn set_exception_from<X>(&mut self, exception: X) -> Result<(), Error>
    where
        X: std::error::Error + Send + Sync + 'static,
    {
        self.set_exception(Arc::new(exception))
    }
}

impl<S: Shape> Default for BasicPromise<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Shape> Drop for BasicPromise<S> {
    /// If a future is still waiting on this promise, break it.
    fn drop(&mut self) {
        let mut guard = PairGuard::acquire(&mut self.cell);
        match guard.link {
            Link::Linked => {
                if !guard.outcome.is_ready() {
                    guard.broken = true;
                    tracing::trace!("promise dropped before writing an outcome");
                }
                guard.link = Link::Detached;
                guard.release_waiters();
            }
            Link::Unclaimed => guard.outcome.clear(),
            Link::Detached => {}
        }
    }
}

#[cfg(test)]
impl<S: Shape> BasicPromise<S> {
    fn registered_wakers(&self) -> usize {
        PairGuard::lock(&self.cell).registered_wakers()
    }
}

impl<S: Shape> Debug for BasicPromise<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("has_future", &self.has_future())
            .finish()
    }
}

/// The reading end of a promise/future pair.
///
/// The query methods (`is_ready`, `valid`, ...) do not synchronize and may
/// report stale state. `wait`, the `get` family, `share` and dropping the
/// future do synchronize with the promise.
pub struct BasicFuture<S: Shape> {
    cell: Option<Arc<Cell<S>>>,
}

impl<S: Shape> BasicFuture<S> {
    /// A future that is already ready with `value`.
    pub fn ready(value: S::Value) -> Self {
        Self::settled(Outcome::Value(value))
    }

    /// A future that already holds `error`.
    pub fn errored(error: S::Error) -> Self {
        Self::settled(Outcome::Error(error))
    }

    /// A future that already holds `exception`.
    pub fn exceptional(exception: S::Exception) -> Self {
        Self::settled(Outcome::Exception(exception))
    }

    fn settled(outcome: Outcome<S>) -> Self {
        let mut cell = Arc::new(Cell::new());
        {
            let mut guard = PairGuard::acquire(&mut cell);
            guard.outcome = outcome;
            guard.link = Link::Detached;
        }
        BasicFuture { cell: Some(cell) }
    }

    #[inline]
    fn status(&self) -> u8 {
        self.cell.as_ref().map_or(0, |cell| cell.status())
    }

    pub fn is_ready(&self) -> bool {
        self.status() & status::READY != 0
    }

    pub fn is_empty(&self) -> bool {
        !self.is_ready()
    }

    pub fn has_value(&self) -> bool {
        self.status() & status::VALUE != 0
    }

    pub fn has_error(&self) -> bool {
        self.status() & status::ERROR != 0
    }

    pub fn has_exception(&self) -> bool {
        self.status() & status::EXCEPTION != 0
    }

    /// True while linked to a promise, holding an outcome, or broken.
    pub fn valid(&self) -> bool {
        self.status() & (status::LINKED | status::READY | status::BROKEN) != 0
    }

    /// Blocks until the promise writes an outcome.
    ///
    /// Fails with [`Error::BrokenPromise`] if the promise is dropped first and
    /// with [`Error::NoState`] if there is nothing to wait for.
    pub fn wait(&self) -> Result<(), Error> {
        if self.is_ready() {
            return Ok(());
        }
        let cell = self.cell.as_deref().ok_or(Error::NoState)?;
        let mut guard = PairGuard::lock(cell);
        loop {
            if guard.outcome.is_ready() {
                return Ok(());
            }
            guard.check_validity()?;
            guard.wait();
        }
    }

    /// Waits, then runs `read` on the settled outcome under the lock.
    pub(crate) fn with_outcome<R, F>(&self, read: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Outcome<S>) -> R,
    {
        self.wait()?;
        let cell = self.cell.as_deref().ok_or(Error::NoState)?;
        let mut guard = PairGuard::lock(cell);
        guard.check_validity()?;
        Ok(read(&mut guard.outcome))
    }

    /// Polls for the settled outcome. `observer` names the shared handle that
    /// polls; `None` is the future itself.
    pub(crate) fn poll_outcome<R, F>(
        &self,
        cx: &mut Context<'_>,
        observer: Option<u64>,
        read: F,
    ) -> Poll<Result<R, Error>>
    where
        F: FnOnce(&mut Outcome<S>) -> R,
    {
        let cell = match self.cell.as_deref() {
            Some(cell) => cell,
            None => return Poll::Ready(Err(Error::NoState)),
        };
        let mut guard = PairGuard::lock(cell);
        if guard.outcome.is_ready() {
            return Poll::Ready(Ok(read(&mut guard.outcome)));
        }
        if let Err(error) = guard.check_validity() {
            return Poll::Ready(Err(error));
        }
        match observer {
            Some(observer) => guard.register_observer(observer, cx.waker()),
            None => guard.register(cx.waker()),
        }
        Poll::Pending
    }

    pub(crate) fn forget_observer(&self, observer: u64) {
        if let Some(cell) = self.cell.as_deref() {
            PairGuard::lock(cell).forget_observer(observer);
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_wakers(&self) -> usize {
        self.cell
            .as_deref()
            .map_or(0, |cell| PairGuard::lock(cell).registered_wakers())
    }

    /// Waits for the outcome and returns the value, or the stored error or
    /// exception as a [`Failure`].
    ///
    /// With a consuming shape this succeeds once; later calls fail with
    /// [`Error::NoState`].
    pub fn get(&self) -> Result<S::Value, FailureOf<S>> {
        self.with_outcome(S::retrieve)?.into_result()
    }

    /// The value, or `default` if the outcome is anything else.
    pub fn get_or(&self, default: S::Value) -> S::Value {
        self.fetch(Outcome::has_value)
            .and_then(Outcome::into_value)
            .unwrap_or(default)
    }

    /// `other` if the outcome is a value, otherwise `None`.
    pub fn get_and<U>(&self, other: U) -> Option<U> {
        self.with_outcome(|outcome| outcome.has_value())
            .unwrap_or(false)
            .then_some(other)
    }

    /// The stored error, `None` if the outcome is not an error.
    pub fn get_error(&self) -> Result<Option<S::Error>, Error> {
        self.with_outcome(|outcome| {
            if outcome.has_error() {
                S::retrieve(outcome).into_error()
            } else {
                None
            }
        })
    }

    pub fn get_error_or(&self, default: S::Error) -> S::Error {
        self.fetch(Outcome::has_error)
            .and_then(Outcome::into_error)
            .unwrap_or(default)
    }

    pub fn get_error_and<U>(&self, other: U) -> Option<U> {
        self.with_outcome(|outcome| outcome.has_error())
            .unwrap_or(false)
            .then_some(other)
    }

    /// The stored exception, `None` if the outcome is not an exception.
    pub fn get_exception(&self) -> Result<Option<S::Exception>, Error> {
        self.with_outcome(|outcome| {
            if outcome.has_exception() {
                S::retrieve(outcome).into_exception()
            } else {
                None
            }
        })
    }

    pub fn get_exception_or(&self, default: S::Exception) -> S::Exception {
        self.fetch(Outcome::has_exception)
            .and_then(Outcome::into_exception)
            .unwrap_or(default)
    }

    pub fn get_exception_and<U>(&self, other: U) -> Option<U> {
        self.with_outcome(|outcome| outcome.has_exception())
            .unwrap_or(false)
            .then_some(other)
    }

    fn fetch(&self, wanted: fn(&Outcome<S>) -> bool) -> Option<Outcome<S>> {
        self.with_outcome(|outcome| wanted(outcome).then(|| S::retrieve(outcome)))
            .ok()
            .flatten()
    }

    /// Turns this future into a shared handle that many observers can clone.
    pub fn share(self) -> Result<BasicSharedFuture<S>, Error> {
        self.check_validity()?;
        Ok(BasicSharedFuture::new(self))
    }

    fn check_validity(&self) -> Result<(), Error> {
        let cell = self.cell.as_deref().ok_or(Error::NoState)?;
        PairGuard::lock(cell).check_validity()
    }

    /// Exchanges the state of two futures, each promise following its own
    /// future.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.cell, &mut other.cell);
    }
}

impl<S: Shape> Default for BasicFuture<S> {
    /// A future with no state.
    fn default() -> Self {
        BasicFuture { cell: None }
    }
}

impl<S: Shape> Drop for BasicFuture<S> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.as_mut() {
            let mut guard = PairGuard::acquire(cell);
            if guard.link == Link::Linked {
                guard.link = Link::Detached;
                tracing::trace!("future dropped while linked");
            }
            guard.forget_wakers();
            guard.outcome.clear();
        }
    }
}

impl<S: Shape> Future for BasicFuture<S> {
    type Output = Result<S::Value, FailureOf<S>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.poll_outcome(cx, None, S::retrieve)
            .map(|fetched| fetched.map_err(Failure::from).and_then(Outcome::into_result))
    }
}

impl<S: Shape> Debug for BasicFuture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("valid", &self.valid())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use futures::executor::block_on;
    use futures::task::{waker, ArcWake};
    use std::future::Future as _;
    use std::io::{self, ErrorKind};
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::Context;
    use std::thread;
    use std::time::Duration;

    use crate::{Error, Failure, Future, FutureOption, Promise, PromiseOption, PromiseResult};

    #[test]
    fn test_get_future_twice() {
        let mut promise = Promise::<u32>::new();
        let _future = promise.get_future().unwrap();
        assert_eq!(promise.get_future().unwrap_err(), Error::FutureAlreadyRetrieved);
    }

    #[test]
    fn test_get_future_after_set_is_ready() {
        let mut promise = Promise::<String>::new();
        promise.set_value("🍓".into()).unwrap();
        assert!(!promise.has_future());
        let future = promise.get_future().unwrap();
        assert!(promise.has_future());
        assert!(future.is_ready());
        assert!(future.has_value());
        assert_eq!(future.get().unwrap(), "🍓");
        assert_eq!(promise.get_future().unwrap_err(), Error::FutureAlreadyRetrieved);
    }

    #[test]
    fn test_set_twice_without_future() {
        let mut promise = Promise::<u32>::new();
        promise.set_value(1).unwrap();
        assert_eq!(promise.set_value(2), Err(Error::AlreadySet));
        assert_eq!(promise.set_error(ErrorKind::Other), Err(Error::AlreadySet));
    }

    #[test]
    fn test_set_twice_with_future() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        promise.set_error(ErrorKind::TimedOut).unwrap();
        assert_eq!(promise.set_value(2), Err(Error::AlreadySet));
        assert_eq!(
            promise.set_exception_from(io::Error::new(ErrorKind::Other, "late")),
            Err(Error::AlreadySet)
        );
        assert!(matches!(future.get(), Err(Failure::Errored(ErrorKind::TimedOut))));
    }

    #[test]
    fn test_emplace_skipped_when_already_set() {
        let mut promise = PromiseOption::<Vec<u8>>::new();
        promise.emplace_value(|| vec![1, 2, 3]).unwrap();
        let result = promise.emplace_value(|| unreachable!("value built for a full promise"));
        assert_eq!(result, Err(Error::AlreadySet));
        assert_eq!(promise.get_future().unwrap().get().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_broken_promise() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        assert!(future.valid());
        drop(promise);
        assert!(future.valid());
        assert_eq!(future.wait(), Err(Error::BrokenPromise));
        assert!(matches!(future.get(), Err(Failure::State(Error::BrokenPromise))));
    }

    #[test]
    fn test_promise_without_future_drops_quietly() {
        let mut promise = Promise::<String>::new();
        promise.set_value("unseen".into()).unwrap();
        drop(promise);
    }

    #[test]
    fn test_future_dropped_first_detaches_promise() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        drop(future);
        assert!(promise.has_future());
        assert_eq!(promise.set_value(1), Err(Error::AlreadySet));
        assert_eq!(promise.get_future().unwrap_err(), Error::FutureAlreadyRetrieved);
    }

    #[test]
    fn test_set_value_unblocks_waiter() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let task1 = thread::spawn(move || future.get().unwrap());
        thread::sleep(Duration::from_millis(20));
        promise.set_value(42).unwrap();
        assert_eq!(task1.join().expect("The task1 thread has panicked"), 42);
    }

    #[test]
    fn test_drop_unblocks_waiter() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let task1 = thread::spawn(move || future.wait());
        thread::sleep(Duration::from_millis(20));
        drop(promise);
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Err(Error::BrokenPromise)
        );
    }

    #[test]
    fn test_single_shot_get() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let task_a = thread::spawn(move || promise.set_value(42));
        let task_b = thread::spawn(move || {
            let first = future.get();
            let second = future.get();
            (first, second, future.valid())
        });
        task_a.join().expect("The task_a thread has panicked").unwrap();
        let (first, second, valid) = task_b.join().expect("The task_b thread has panicked");
        assert_eq!(first.unwrap(), 42);
        assert!(matches!(second, Err(Failure::State(Error::NoState))));
        assert!(!valid);
    }

    #[test]
    fn test_moved_promise_reaches_future() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let mut moved = promise;
        moved.set_value(7).unwrap();
        assert_eq!(future.get().unwrap(), 7);
    }

    #[test]
    fn test_swapped_futures_follow_their_promises() {
        let mut p1 = Promise::<u32>::new();
        let mut p2 = Promise::<u32>::new();
        let mut f1 = p1.get_future().unwrap();
        let mut f2 = p2.get_future().unwrap();
        f1.swap(&mut f2);
        p1.set_value(1).unwrap();
        p2.set_value(2).unwrap();
        assert_eq!(f1.get().unwrap(), 2);
        assert_eq!(f2.get().unwrap(), 1);
    }

    #[test]
    fn test_swapped_promises() {
        let mut p1 = Promise::<u32>::new();
        let mut p2 = Promise::<u32>::new();
        p2.set_value(2).unwrap();
        let f1 = p1.get_future().unwrap();
        p1.swap(&mut p2);
        // p2 now holds the link to f1, p1 the buffered value.
        p2.set_value(1).unwrap();
        assert_eq!(f1.get().unwrap(), 1);
        assert_eq!(p1.get_future().unwrap().get().unwrap(), 2);
    }

    #[test]
    fn test_default_future_has_no_state() {
        let future = Future::<u32>::default();
        assert!(!future.valid());
        assert_eq!(future.wait(), Err(Error::NoState));
        assert!(matches!(future.get(), Err(Failure::State(Error::NoState))));
        assert_eq!(future.share().unwrap_err(), Error::NoState);
    }

    #[test]
    fn test_taken_future_has_no_state() {
        let mut promise = Promise::<u32>::new();
        let mut future = promise.get_future().unwrap();
        let taken = std::mem::take(&mut future);
        assert!(!future.valid());
        assert!(taken.valid());
        promise.set_value(3).unwrap();
        assert_eq!(taken.get().unwrap(), 3);
    }

    #[test]
    fn test_defaulting_getters() {
        let future = Future::<u32>::ready(5);
        assert_eq!(future.get_error_or(ErrorKind::Other), ErrorKind::Other);
        assert_eq!(future.get_and("yes"), Some("yes"));
        assert_eq!(future.get_error_and("yes"), None);
        assert_eq!(future.get_or(0), 5);
        // The value was consumed by get_or.
        assert_eq!(future.get_or(0), 0);

        let stateless = FutureOption::<u32>::default();
        assert_eq!(stateless.get_or(9), 9);
    }

    #[test]
    fn test_error_channel() {
        let mut promise = PromiseResult::<u32, String>::new();
        let future = promise.get_future().unwrap();
        promise.set_error("bad".into()).unwrap();
        assert!(future.has_error());
        assert_eq!(future.get_exception().unwrap(), None);
        assert_eq!(future.get_error().unwrap().as_deref(), Some("bad"));
        assert_eq!(future.get_error().unwrap_err(), Error::NoState);
    }

    #[test]
    fn test_exception_channel() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        promise
            .set_exception_from(io::Error::new(ErrorKind::Other, "💥"))
            .unwrap();
        assert!(future.has_exception());
        assert!(future.get_exception_and(()).is_some());
        let exception = future.get_exception().unwrap().unwrap();
        assert_eq!(exception.to_string(), "💥");
    }

    #[test]
    fn test_await_future() {
        let mut promise = Promise::<String>::new();
        let future = promise.get_future().unwrap();
        let task1 = thread::spawn(move || block_on(async { future.await }));
        let task2 = thread::spawn(move || promise.set_value(String::from("🍓")));
        task2.join().expect("The task2 thread has panicked").unwrap();
        let received = task1.join().expect("The task1 thread has panicked");
        assert_eq!(received.unwrap(), "🍓");
    }

    #[test]
    fn test_await_broken_future() {
        let mut promise = Promise::<String>::new();
        let future = promise.get_future().unwrap();
        let task1 = thread::spawn(move || block_on(future));
        let task2 = thread::spawn(move || drop(promise));
        task2.join().expect("The task2 thread has panicked");
        let received = task1.join().expect("The task1 thread has panicked");
        assert!(matches!(received, Err(Failure::State(Error::BrokenPromise))));
    }

    struct Idle;

    impl ArcWake for Idle {
        fn wake_by_ref(_arc_self: &Arc<Self>) {}
    }

    #[test]
    fn test_repolling_keeps_one_waker() {
        let mut promise = Promise::<u32>::new();
        let mut future = promise.get_future().unwrap();
        for _ in 0..100 {
            let waker = waker(Arc::new(Idle));
            let mut cx = Context::from_waker(&waker);
            assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        }
        assert_eq!(future.registered_wakers(), 1);
        promise.set_value(1).unwrap();
        assert_eq!(future.registered_wakers(), 0);
        assert_eq!(future.get().unwrap(), 1);
    }

    #[test]
    fn test_dropped_future_leaves_no_waker() {
        let mut promise = Promise::<u32>::new();
        let mut future = promise.get_future().unwrap();
        let waker = waker(Arc::new(Idle));
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        assert_eq!(promise.registered_wakers(), 1);
        drop(future);
        assert_eq!(promise.registered_wakers(), 0);
    }
}
