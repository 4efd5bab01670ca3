//! Contribution Ledger - append-only record of member payments
//!
//! Records individual payments (regular dues, rotation contributions,
//! investment top-ups, penalties) and maintains per-member running
//! totals. Contributions are immutable once recorded except for the
//! `pending -> paid | late` status transition.
//!
//! Rotation eligibility for merry-go-round contributions is checked by
//! the engine against the Rotation Scheduler *before* anything is
//! recorded here.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use chama_types::{
    Amount, ChamaError, ChamaResult, Contribution, ContributionId, ContributionKind,
    ContributionSplit, GroupId, PaymentStatus, PrincipalId,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request to record a payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewContribution {
    pub group: GroupId,
    pub member: PrincipalId,
    pub amount: Amount,
    pub kind: ContributionKind,
    pub split: ContributionSplit,
    pub contributed_on: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl NewContribution {
    pub fn new(
        group: GroupId,
        member: PrincipalId,
        amount: Amount,
        kind: ContributionKind,
        contributed_on: NaiveDate,
    ) -> Self {
        Self {
            group,
            member,
            amount,
            kind,
            split: ContributionSplit::none(),
            contributed_on,
            due_date: None,
        }
    }

    pub fn with_split(mut self, split: ContributionSplit) -> Self {
        self.split = split;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Filters for ledger queries. Results are newest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContributionQuery {
    pub member: Option<PrincipalId>,
    pub kind: Option<ContributionKind>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<usize>,
}

impl ContributionQuery {
    pub fn for_member(member: PrincipalId) -> Self {
        Self {
            member: Some(member),
            ..Self::default()
        }
    }
}

/// The contribution ledger.
pub struct ContributionLedger {
    entries: RwLock<HashMap<ContributionId, Contribution>>,
    group_index: RwLock<HashMap<GroupId, Vec<ContributionId>>>,
}

impl ContributionLedger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            group_index: RwLock::new(HashMap::new()),
        }
    }

    /// Record a payment. The amount must be positive and the sub-amount
    /// split must fit within it: rotation, investment, and penalty
    /// portions are carved out of the total payment, not added on top.
    pub fn record(&self, new: NewContribution) -> ChamaResult<Contribution> {
        if !new.amount.is_positive() {
            return Err(ChamaError::invalid_amount(format!(
                "contribution amount must be positive, got {}",
                new.amount
            )));
        }
        if !new.split.fits_within(new.amount) {
            return Err(ChamaError::invalid_amount(format!(
                "sub-amounts total {} exceeds payment of {}, or a penalty is missing its reason",
                new.split.total(),
                new.amount
            )));
        }

        let contribution = Contribution {
            id: ContributionId::generate(),
            group: new.group,
            member: new.member,
            amount: new.amount,
            kind: new.kind,
            split: new.split,
            contributed_on: new.contributed_on,
            due_date: new.due_date,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.write().map_err(|_| ChamaError::LockError)?;
        let mut group_index = self.group_index.write().map_err(|_| ChamaError::LockError)?;
        group_index
            .entry(contribution.group.clone())
            .or_default()
            .push(contribution.id.clone());
        entries.insert(contribution.id.clone(), contribution.clone());

        info!(
            group = %contribution.group,
            member = %contribution.member,
            amount = %contribution.amount,
            kind = ?contribution.kind,
            "contribution recorded"
        );
        Ok(contribution)
    }

    pub fn get(&self, id: &ContributionId) -> ChamaResult<Contribution> {
        let entries = self.entries.read().map_err(|_| ChamaError::LockError)?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| ChamaError::NotFound(format!("contribution {id}")))
    }

    /// Query a group's contributions, newest first.
    pub fn query(&self, group: &GroupId, query: ContributionQuery) -> ChamaResult<Vec<Contribution>> {
        let entries = self.entries.read().map_err(|_| ChamaError::LockError)?;
        let group_index = self.group_index.read().map_err(|_| ChamaError::LockError)?;

        let ids = match group_index.get(group) {
            Some(ids) => ids,
            None => return Ok(vec![]),
        };

        let mut results: Vec<_> = ids
            .iter()
            .filter_map(|id| entries.get(id))
            .filter(|c| {
                if let Some(ref member) = query.member {
                    if c.member != *member {
                        return false;
                    }
                }
                if let Some(kind) = query.kind {
                    if c.kind != kind {
                        return false;
                    }
                }
                if let Some(status) = query.status {
                    if c.status != status {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    /// Transition a contribution's payment status. Only
    /// `pending -> paid | late` is permitted.
    pub fn mark(&self, id: &ContributionId, status: PaymentStatus) -> ChamaResult<Contribution> {
        let mut entries = self.entries.write().map_err(|_| ChamaError::LockError)?;
        let contribution = entries
            .get_mut(id)
            .ok_or_else(|| ChamaError::NotFound(format!("contribution {id}")))?;

        if contribution.status != PaymentStatus::Pending {
            return Err(ChamaError::InvalidState(format!(
                "contribution {id} is {:?}, only pending contributions can be marked",
                contribution.status
            )));
        }
        if status == PaymentStatus::Pending {
            return Err(ChamaError::InvalidState(
                "a contribution cannot be marked pending".into(),
            ));
        }

        contribution.status = status;
        info!(contribution = %id, status = ?status, "contribution marked");
        Ok(contribution.clone())
    }

    /// Running total of everything a member has paid into a group.
    pub fn member_total(&self, group: &GroupId, member: &PrincipalId) -> ChamaResult<Amount> {
        let entries = self.entries.read().map_err(|_| ChamaError::LockError)?;
        let group_index = self.group_index.read().map_err(|_| ChamaError::LockError)?;

        let total = group_index
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(|id| entries.get(id))
            .filter(|c| c.member == *member)
            .map(|c| c.amount)
            .sum();
        Ok(total)
    }
}

impl Default for ContributionLedger {
    fn default() -> Self {
        Self::new()
    }
}
