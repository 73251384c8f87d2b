//! Settlement errors shared by promises, the keyed cache and the debouncer.

use thiserror::Error;

/// Crate result alias for promise outcomes.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a [`Promise`](crate::sync::Promise) settled without a value.
///
/// Cloneable so one outcome can be observed by every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Every `Deferred` handle was dropped before settling.
    #[error("deferred dropped before it settled")]
    Abandoned,

    /// The keyed cache was cleared while a `get` was pending. Retry.
    #[error("cache cleared while waiting for `{0}`")]
    Cleared(String),

    /// A debounced task failed or panicked.
    #[error("{0}")]
    Task(String),

    /// The coordinator was stopped.
    #[error("bundle stopped")]
    Stopped,
}

impl Error {
    /// Wrap any displayable failure as a task error.
    pub fn task(err: impl std::fmt::Display) -> Self {
        Self::Task(err.to_string())
    }

    /// Whether the caller should retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cleared(_))
    }
}
