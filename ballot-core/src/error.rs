use std::fmt;

use thiserror::Error;

use crate::model::PollId;

/// Failures surfaced by the cache, the mutation coordinator and the service adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    #[error("network error: {0}")]
    Network(String),
    #[error("poll {0} not found")]
    NotFound(PollId),
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("{0}")]
    StateConflict(Conflict),
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

/// Operations that are rejected because of the poll's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("voting for this poll has been closed")]
    VotingClosed,
    #[error("you have already voted in this poll")]
    AlreadyVoted,
    #[error("candidate is not part of this poll")]
    InvalidCandidate,
    #[error("candidate already exists in this poll")]
    DuplicateCandidate,
    #[error("only the poll creator can do this")]
    Unauthorized,
    #[error("you must be signed in to perform this action")]
    SignInRequired,
}

impl BallotError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Transport failures and unclassified errors may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unknown(_))
    }
}

impl From<Conflict> for BallotError {
    fn from(conflict: Conflict) -> Self {
        Self::StateConflict(conflict)
    }
}

impl From<reqwest::Error> for BallotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Unknown(format!("malformed response: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for BallotError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Unknown(format!("fetch task failed: {err}"))
    }
}

/// A failed read, carrying whatever the cache held before the failure.
#[derive(Debug, Clone)]
pub struct QueryError<T> {
    pub error: BallotError,
    pub stale: Option<T>,
}

impl<T> QueryError<T> {
    pub fn and_then_stale<U>(self, f: impl FnOnce(T) -> Option<U>) -> QueryError<U> {
        QueryError {
            error: self.error,
            stale: self.stale.and_then(f),
        }
    }
}

impl<T> fmt::Display for QueryError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stale {
            Some(_) => write!(f, "{} (showing cached data)", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for QueryError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
