use thiserror::Error;

use crate::domain::{LinkId, RecordId, TraceError, TransitionError};

/// Coarse classification of a [`CommandError`].
///
/// `Conflict` is the only kind callers are expected to retry automatically,
/// by re-fetching and resubmitting; all others require caller correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown id.
    NotFound,
    /// Malformed or missing required fields.
    ValidationFailed,
    /// The requested transition is not legal from the current state.
    InvalidTransition,
    /// A gated transition was attempted without a verified credential.
    CredentialRejected,
    /// A type-specific precondition of the transition does not hold.
    PreconditionFailed,
    /// Concurrent modification detected via a stale version token.
    Conflict,
    /// A traceability graph constraint was violated.
    GraphConstraintViolation,
}

/// A failed command.
///
/// Every guard failure aborts the whole operation before any field
/// mutation, version bump, or audit append. Variants carry the ids and
/// expected-vs-actual context needed to render a precise message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No live record with this id.
    #[error("no record found with id {0}")]
    NotFound(RecordId),

    /// No trace link with this id.
    #[error("no trace link found with id {0}")]
    LinkNotFound(LinkId),

    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record's current lifecycle state does not permit the
    /// transition.
    #[error("invalid transition on {id}: {source}")]
    InvalidTransition {
        /// The record the transition targeted.
        id: RecordId,
        /// Why the state machine refused it.
        #[source]
        source: TransitionError,
    },

    /// The transition is gated on credential verification, which failed
    /// or was not performed.
    #[error("credential verification required for this transition on {0}")]
    CredentialRejected(RecordId),

    /// A precondition specific to the record type does not hold, e.g.
    /// approving a test run that is not complete.
    #[error("precondition failed on {id}: {message}")]
    PreconditionFailed {
        /// The record the command targeted.
        id: RecordId,
        /// Which precondition failed.
        message: String,
    },

    /// The caller's expected version is stale; the record was mutated by
    /// someone else since it was read.
    #[error("conflict on {id}: expected version {expected}, found {actual}")]
    Conflict {
        /// The record the command targeted.
        id: RecordId,
        /// The version the caller read.
        expected: u64,
        /// The version actually committed.
        actual: u64,
    },

    /// A trace graph constraint was violated.
    #[error(transparent)]
    GraphConstraint(#[from] TraceError),
}

impl CommandError {
    /// The coarse error kind this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::LinkNotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::CredentialRejected(_) => ErrorKind::CredentialRejected,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::GraphConstraint(_) => ErrorKind::GraphConstraintViolation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_one_to_one() {
        let id: RecordId = "UR-1".parse().unwrap();
        assert_eq!(CommandError::NotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            CommandError::LinkNotFound(LinkId::generate()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CommandError::Conflict {
                id,
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CommandError::GraphConstraint(TraceError::SelfLoop { id }).kind(),
            ErrorKind::GraphConstraintViolation
        );
    }

    #[test]
    fn conflict_message_carries_versions() {
        let id: RecordId = "SR-3".parse().unwrap();
        let error = CommandError::Conflict {
            id,
            expected: 4,
            actual: 7,
        };
        assert_eq!(
            error.to_string(),
            "conflict on SR-3: expected version 4, found 7"
        );
    }
}
