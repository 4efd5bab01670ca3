//! Loan records and the loan state machine vocabulary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::group::{Frequency, GroupId};
use crate::member::PrincipalId;
use crate::money::{Amount, InterestRate};

/// Unique identifier for a loan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl LoanId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loan lifecycle:
/// `pending -> approved | rejected`, then `approved -> active ->
/// completed` or `active -> defaulted`, driven by the external
/// repayment-scheduling collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Active,
    Completed,
    Defaulted,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Rejected | LoanStatus::Completed | LoanStatus::Defaulted
        )
    }
}

/// The decision an admin or treasurer makes on a pending loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanDecision {
    Approve,
    Reject,
}

/// Repayment schedule descriptor. The engine stores it verbatim; payment
/// rows are generated by the external scheduling collaborator once the
/// loan is approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentSchedule {
    pub installments: u32,
    pub frequency: Frequency,
}

impl Default for RepaymentSchedule {
    fn default() -> Self {
        Self {
            installments: 1,
            frequency: Frequency::Monthly,
        }
    }
}

/// A loan issued within a group.
///
/// Principal and interest rate are immutable once created: the rate is a
/// snapshot of the group's rate at request time, never a live reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub group: GroupId,
    pub borrower: PrincipalId,
    pub principal: Amount,
    pub interest_rate: InterestRate,
    /// `principal × (1 + rate/100)`, fixed at creation.
    pub total_due: Amount,
    pub purpose: String,
    pub due_date: NaiveDate,
    pub schedule: RepaymentSchedule,
    pub status: LoanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
