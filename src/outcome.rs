//! The outcome slot held by a promise/future pair, and the `Shape` policy that
//! decides which channels a pair carries.
//!
use std::convert::Infallible;
use std::fmt::{self, Debug};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use crate::{Error, Failure};

/// Default exception payload: any shareable error object.
pub type Exception = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Picks the value, error and exception types of a promise/future pair.
///
/// Channels a shape does not carry use [`Infallible`], so the matching setter
/// can never be called.
pub trait Shape: Sized {
    type Value;
    type Error;
    type Exception;

    /// Hands a completed outcome to a reader.
    ///
    /// The default moves it out and leaves [`Outcome::Consumed`] behind, so
    /// fetching is single shot. [`Rereadable`] clones instead.
    fn retrieve(outcome: &mut Outcome<Self>) -> Outcome<Self> {
        outcome.take()
    }
}

/// Value, error and exception transport.
pub struct Full<T, E = ErrorKind, X = Exception>(PhantomData<fn() -> (T, E, X)>);

/// Value and error transport, no exception channel.
pub struct Fallible<T, E = ErrorKind>(PhantomData<fn() -> (T, E)>);

/// Value transport only.
pub struct Optional<T>(PhantomData<fn() -> T>);

/// Any shape whose outcome stays in place after a fetch, so a future can be
/// read again and stays valid.
pub struct Rereadable<S>(PhantomData<fn() -> S>);

impl<T, E, X> Shape for Full<T, E, X> {
    type Value = T;
    type Error = E;
    type Exception = X;
}

impl<T, E> Shape for Fallible<T, E> {
    type Value = T;
    type Error = E;
    type Exception = Infallible;
}

impl<T> Shape for Optional<T> {
    type Value = T;
    type Error = Infallible;
    type Exception = Infallible;
}

impl<S: Shape> Shape for Rereadable<S>
where
    S::Value: Clone,
    S::Error: Clone,
    S::Exception: Clone,
{
    type Value = S::Value;
    type Error = S::Error;
    type Exception = S::Exception;

    fn retrieve(outcome: &mut Outcome<Self>) -> Outcome<Self> {
        outcome.cloned()
    }
}

/// Exactly one of nothing, a value, an error or an exception.
pub enum Outcome<S: Shape> {
    Empty,
    Value(S::Value),
    Error(S::Error),
    Exception(S::Exception),
    /// A single-shot outcome that has already been handed out.
    Consumed,
}

impl<S: Shape> Outcome<S> {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            Outcome::Value(_) | Outcome::Error(_) | Outcome::Exception(_)
        )
    }

    /// True while nothing was ever written. A consumed slot is not empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    #[inline]
    pub fn has_exception(&self) -> bool {
        matches!(self, Outcome::Exception(_))
    }

    pub fn clear(&mut self) {
        *self = Outcome::Empty;
    }

    /// Moves a ready outcome out, marking the slot consumed. Unready slots are
    /// left untouched.
    pub fn take(&mut self) -> Self {
        match self {
            Outcome::Empty => Outcome::Empty,
            Outcome::Consumed => Outcome::Consumed,
            _ => mem::replace(self, Outcome::Consumed),
        }
    }

    pub fn into_value(self) -> Option<S::Value> {
        match self {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<S::Error> {
        match self {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_exception(self) -> Option<S::Exception> {
        match self {
            Outcome::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Converts a fetched outcome into what `get` hands back.
    pub fn into_result(self) -> Result<S::Value, Failure<S::Error, S::Exception>> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Error(error) => Err(Failure::Errored(error)),
            Outcome::Exception(exception) => Err(Failure::Exceptional(exception)),
            Outcome::Empty | Outcome::Consumed => Err(Failure::State(Error::NoState)),
        }
    }
}

impl<S: Shape> Outcome<S>
where
    S::Value: Clone,
    S::Error: Clone,
    S::Exception: Clone,
{
    pub fn cloned(&self) -> Self {
        match self {
            Outcome::Empty => Outcome::Empty,
            Outcome::Value(value) => Outcome::Value(value.clone()),
            Outcome::Error(error) => Outcome::Error(error.clone()),
            Outcome::Exception(exception) => Outcome::Exception(exception.clone()),
            Outcome::Consumed => Outcome::Consumed,
        }
    }
}

impl<S: Shape> Default for Outcome<S> {
    fn default() -> Self {
        Outcome::Empty
    }
}

impl<S: Shape> Debug for Outcome<S>
where
    S::Value: Debug,
    S::Error: Debug,
    S::Exception: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Empty => write!(f, "Empty"),
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Error(error) => f.debug_tuple("Error").field(error).finish(),
            Outcome::Exception(exception) => f.debug_tuple("Exception").field(exception).finish(),
            Outcome::Consumed => write!(f, "Consumed"),
        }
    }
}
