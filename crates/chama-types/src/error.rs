//! Error taxonomy for the engine.
//!
//! Every validation failure is returned synchronously as a typed error;
//! nothing is retried internally. Payout delivery faults are NOT part of
//! this taxonomy — they are a side-channel report (see `chama-engine`)
//! and never roll back a committed state transition.

use thiserror::Error;

use crate::group::GroupId;
use crate::member::PrincipalId;

/// Result alias used across the engine crates.
pub type ChamaResult<T> = Result<T, ChamaError>;

#[derive(Debug, Error)]
pub enum ChamaError {
    /// No membership record exists for the principal in the group.
    #[error("no membership record for {principal} in group {group}")]
    NotMember {
        group: GroupId,
        principal: PrincipalId,
    },

    /// A membership record exists but is inactive, or the role lacks the
    /// capability the operation requires.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// Non-positive or malformed monetary value.
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Operation attempted on an entity whose state does not permit it,
    /// e.g. deciding a non-pending loan or starting a round while one is
    /// already active.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The proposed winner is not an eligible active member.
    #[error("invalid winner: {0} is not an eligible active member")]
    InvalidWinner(PrincipalId),

    /// The proposed borrower is not an eligible active member.
    #[error("invalid borrower: {0} is not an eligible active member")]
    InvalidBorrower(PrincipalId),

    /// Contribution rejected: the member already holds the winner slot
    /// in the currently active round.
    #[error("{0} already holds the winner slot in the active round")]
    AlreadyWonThisRound(PrincipalId),

    /// Winner selection or rotation contribution with no open round.
    #[error("no active round for group {0}")]
    NoActiveRound(GroupId),

    /// Referenced group, loan, round, or contribution does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A store lock was poisoned by a panicking writer.
    #[error("lock error")]
    LockError,
}

impl ChamaError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        ChamaError::AccessDenied {
            reason: reason.into(),
        }
    }

    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        ChamaError::InvalidAmount {
            reason: reason.into(),
        }
    }
}
