//! Contribution records and their sub-amount split.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::member::PrincipalId;
use crate::money::Amount;

/// Unique identifier for a contribution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContributionId(pub String);

impl ContributionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ContributionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a payment is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    #[default]
    Regular,
    MerryGoRound,
    Investment,
    Penalty,
}

/// Payment status. The only permitted transition is
/// `Pending -> Paid | Late`; due-date scheduling itself is owned by an
/// external collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Late,
}

/// Sub-allocations of a single payment. These portions are carved out of
/// the total amount, never added on top of it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionSplit {
    pub merry_go_round: Amount,
    pub investment: Amount,
    pub penalty: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_reason: Option<String>,
}

impl ContributionSplit {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn merry_go_round(amount: Amount) -> Self {
        Self {
            merry_go_round: amount,
            ..Self::default()
        }
    }

    pub fn with_investment(mut self, amount: Amount) -> Self {
        self.investment = amount;
        self
    }

    pub fn with_penalty(mut self, amount: Amount, reason: impl Into<String>) -> Self {
        self.penalty = amount;
        self.penalty_reason = Some(reason.into());
        self
    }

    /// Sum of all sub-allocations.
    pub fn total(&self) -> Amount {
        self.merry_go_round
            .saturating_add(self.investment)
            .saturating_add(self.penalty)
    }

    /// The split is well-formed for a payment of `amount`: no negative
    /// portion, portions fit within the total, and a penalty carries its
    /// reason.
    pub fn fits_within(&self, amount: Amount) -> bool {
        !self.merry_go_round.minor().is_negative()
            && !self.investment.minor().is_negative()
            && !self.penalty.minor().is_negative()
            && self.total() <= amount
            && (!self.penalty.is_positive() || self.penalty_reason.is_some())
    }
}

/// An individual payment into the group.
///
/// Immutable once recorded, except for the payment status transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub group: GroupId,
    pub member: PrincipalId,
    pub amount: Amount,
    pub kind: ContributionKind,
    pub split: ContributionSplit,
    pub contributed_on: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Contribution {
    /// The portion of this payment that feeds the active round's pool:
    /// the merry-go-round sub-amount when one was given, otherwise the
    /// full payment.
    pub fn rotation_portion(&self) -> Amount {
        if self.kind != ContributionKind::MerryGoRound {
            return Amount::ZERO;
        }
        if self.split.merry_go_round.is_positive() {
            self.split.merry_go_round
        } else {
            self.amount
        }
    }
}
