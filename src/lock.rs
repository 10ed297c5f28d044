//! The cell a promise and its future share, and the guard both sides use to
//! lock it.
//!
//! A linked promise/future pair is two handles on one `Arc<Cell>`. Each cell has
//! exactly one mutex, so it does not matter which handle takes the lock first.
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Waker;

use crate::outcome::{Outcome, Shape};
use crate::Error;

/// Whether a future was handed out, and whether it still waits on the promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    /// No future has been requested yet.
    Unclaimed,
    /// A future exists and the promise has not delivered.
    Linked,
    /// The promise delivered, broke, or lost its future.
    Detached,
}

pub(crate) struct State<S: Shape> {
    pub outcome: Outcome<S>,
    pub link: Link,
    pub broken: bool,
    /// Task of the owning future.
    waker: Option<Waker>,
    /// Tasks of shared observers, keyed by observer id.
    observers: Vec<(u64, Waker)>,
}

/// Relaxed mirror of `State`, readable without the lock.
pub(crate) mod status {
    pub const VALUE: u8 = 1;
    pub const ERROR: u8 = 1 << 1;
    pub const EXCEPTION: u8 = 1 << 2;
    pub const LINKED: u8 = 1 << 3;
    pub const BROKEN: u8 = 1 << 4;
    pub const RETRIEVED: u8 = 1 << 5;

    pub const READY: u8 = VALUE | ERROR | EXCEPTION;
}

impl<S: Shape> State<S> {
    fn summary(&self) -> u8 {
        let mut bits = match self.outcome {
            Outcome::Value(_) => status::VALUE,
            Outcome::Error(_) => status::ERROR,
            Outcome::Exception(_) => status::EXCEPTION,
            Outcome::Empty | Outcome::Consumed => 0,
        };
        match self.link {
            Link::Unclaimed => {}
            Link::Linked => bits |= status::LINKED | status::RETRIEVED,
            Link::Detached => bits |= status::RETRIEVED,
        }
        if self.broken {
            bits |= status::BROKEN;
        }
        bits
    }

    /// Fails unless a wait on this state could ever finish.
    pub fn check_validity(&self) -> Result<(), Error> {
        if self.broken {
            return Err(Error::BrokenPromise);
        }
        if self.link != Link::Linked && !self.outcome.is_ready() {
            return Err(Error::NoState);
        }
        Ok(())
    }

    /// Remembers the owning future's task, replacing the one it polled with
    /// before.
    pub fn register(&mut self, waker: &Waker) {
        let stale = self
            .waker
            .as_ref()
            .map_or(true, |current| !current.will_wake(waker));
        if stale {
            self.waker = Some(waker.clone());
        }
    }

    /// Remembers the task of one shared observer, replacing that observer's
    /// earlier task.
    pub fn register_observer(&mut self, observer: u64, waker: &Waker) {
        match self.observers.iter_mut().find(|(id, _)| *id == observer) {
            Some((_, current)) => {
                if !current.will_wake(waker) {
                    *current = waker.clone();
                }
            }
            None => self.observers.push((observer, waker.clone())),
        }
    }

    pub fn forget_observer(&mut self, observer: u64) {
        self.observers.retain(|(id, _)| *id != observer);
    }

    /// Drops every registered task without waking it.
    pub fn forget_wakers(&mut self) {
        self.waker = None;
        self.observers.clear();
    }

    #[cfg(test)]
    pub fn registered_wakers(&self) -> usize {
        usize::from(self.waker.is_some()) + self.observers.len()
    }
}

pub(crate) struct Cell<S: Shape> {
    state: Mutex<State<S>>,
    ready: Condvar,
    status: AtomicU8,
}

impl<S: Shape> Cell<S> {
    pub fn new() -> Self {
        Cell {
            state: Mutex::new(State {
                outcome: Outcome::Empty,
                link: Link::Unclaimed,
                broken: false,
                waker: None,
                observers: vec![],
            }),
            ready: Condvar::new(),
            status: AtomicU8::new(0),
        }
    }

    /// Last published status. May be stale relative to a concurrent writer.
    #[inline]
    pub fn status(&self) -> u8 {
        self.status.load(Ordering::Relaxed)
    }
}

enum Access<'a, S: Shape> {
    Exclusive(&'a mut State<S>),
    Shared {
        guard: MutexGuard<'a, State<S>>,
        ready: &'a Condvar,
    },
}

/// Exclusive access to the state of a promise/future pair.
///
/// Obtainable from either handle. Dropping it publishes the status word and
/// releases the lock.
pub(crate) struct PairGuard<'a, S: Shape> {
    access: Access<'a, S>,
    status: &'a AtomicU8,
}

impl<'a, S: Shape> PairGuard<'a, S> {
    /// Locks through a handle that can prove exclusive ownership.
    ///
    /// While no other handle shares the cell the mutex is skipped entirely.
    pub fn acquire(cell: &'a mut Arc<Cell<S>>) -> Self {
        // Checked and then taken again: returning the first borrow from one
        // branch and locking in the other is rejected by the borrow checker.
        if Arc::get_mut(cell).is_some() {
            match Arc::get_mut(cell) {
                Some(cell) => {
                    let Cell { state, status, .. } = cell;
                    PairGuard {
                        access: Access::Exclusive(state.get_mut()),
                        status,
                    }
                }
                // Nobody else holds the cell, so it cannot have been cloned.
                None => unreachable!("exclusively owned cell was shared"),
            }
        } else {
            Self::lock(cell)
        }
    }

    /// Locks through a shared handle.
    pub fn lock(cell: &'a Cell<S>) -> Self {
        PairGuard {
            access: Access::Shared {
                guard: cell.state.lock(),
                ready: &cell.ready,
            },
            status: &cell.status,
        }
    }

    /// Parks the calling thread until the state is notified. Returns at once if
    /// nobody else can touch the state.
    pub fn wait(&mut self) {
        if let Access::Shared { guard, ready } = &mut self.access {
            ready.wait(guard);
        }
    }

    /// Unblocks every thread parked in `wait` and every registered task.
    pub fn release_waiters(&mut self) {
        if let Access::Shared { ready, .. } = &self.access {
            ready.notify_all();
        }
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
        for (_, waker) in self.observers.drain(..) {
            waker.wake();
        }
    }
}

impl<'a, S: Shape> Deref for PairGuard<'a, S> {
    type Target = State<S>;

    fn deref(&self) -> &State<S> {
        match &self.access {
            Access::Exclusive(state) => &**state,
            Access::Shared { guard, .. } => &**guard,
        }
    }
}

impl<'a, S: Shape> DerefMut for PairGuard<'a, S> {
    fn deref_mut(&mut self) -> &mut State<S> {
        match &mut self.access {
            Access::Exclusive(state) => &mut **state,
            Access::Shared { guard, .. } => &mut **guard,
        }
    }
}

impl<'a, S: Shape> Drop for PairGuard<'a, S> {
    fn drop(&mut self) {
        let bits = self.summary();
        self.status.store(bits, Ordering::Release);
    }
}
