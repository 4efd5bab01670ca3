//! Payout events emitted to the external disbursement sink.
//!
//! On round completion or loan approval the engine emits exactly one
//! credit event; the surrounding ledger-of-record owns the crediting
//! itself. Delivery failure is a retriable side-channel fault for the
//! collaborator and never rolls back the committed state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::loan::{Loan, LoanId};
use crate::member::PrincipalId;
use crate::money::Amount;
use crate::rotation::{Round, RoundId};

/// What produced a payout, tagged for audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutSource {
    Round { id: RoundId, number: u32 },
    Loan { id: LoanId },
}

/// A credit event: exact amount, recipient, and reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutEvent {
    pub group: GroupId,
    pub recipient: PrincipalId,
    pub amount: Amount,
    pub reason: String,
    pub source: PayoutSource,
    pub emitted_at: DateTime<Utc>,
}

impl PayoutEvent {
    /// The payout for a completed round: the pooled total to the winner,
    /// tagged with the round number. Valid even for a zero pool (an
    /// honor round completes with a zero payout).
    pub fn for_round(round: &Round, winner: PrincipalId) -> Self {
        Self {
            group: round.group.clone(),
            recipient: winner,
            amount: round.pool,
            reason: format!("round {}", round.number),
            source: PayoutSource::Round {
                id: round.id.clone(),
                number: round.number,
            },
            emitted_at: Utc::now(),
        }
    }

    /// The disbursement for an approved loan: the principal to the
    /// borrower.
    pub fn for_loan(loan: &Loan) -> Self {
        Self {
            group: loan.group.clone(),
            recipient: loan.borrower.clone(),
            amount: loan.principal,
            reason: format!("loan {}", loan.id),
            source: PayoutSource::Loan {
                id: loan.id.clone(),
            },
            emitted_at: Utc::now(),
        }
    }
}
