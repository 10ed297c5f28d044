/// Contract and lifecycle errors raised by promises and futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The promise was dropped before it wrote an outcome.
    #[error("broken promise")]
    BrokenPromise,
    /// `get_future` was already called on this promise.
    #[error("future already retrieved")]
    FutureAlreadyRetrieved,
    /// The future has no shared state, or its outcome was already consumed.
    #[error("no associated state")]
    NoState,
    /// An outcome was already written.
    #[error("outcome already set")]
    AlreadySet,
}

/// What fetching a value out of a future can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure<E, X> {
    #[error(transparent)]
    State(#[from] Error),
    #[error("errored outcome: {0}")]
    Errored(E),
    #[error("exceptional outcome: {0}")]
    Exceptional(X),
}

impl<E, X> Failure<E, X> {
    /// The state error, if this failure did not come from a stored outcome.
    pub fn state(&self) -> Option<Error> {
        match self {
            Failure::State(error) => Some(*error),
            _ => None,
        }
    }
}
