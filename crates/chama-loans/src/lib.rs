//! Loan Lifecycle Manager - from request to payoff
//!
//! Owns the loan book and the `pending -> approved | rejected` decision
//! point. A decision is made exactly once: re-deciding a non-pending
//! loan is rejected, never silently ignored, and the first decision's
//! terminal fields are never overwritten.
//!
//! Later transitions (`approved -> active -> completed`, `active ->
//! defaulted`) are driven by the external repayment-scheduling
//! collaborator through [`LoanBook::mark_status`]. This crate only
//! guarantees an approved loan is eligible for schedule generation; it
//! never generates payment rows itself.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use chama_types::{
    Amount, ChamaError, ChamaResult, GroupId, InterestRate, Loan, LoanDecision, LoanId,
    LoanStatus, PrincipalId, RepaymentSchedule,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request to open a loan. The interest rate is the group's rate,
/// snapshotted by the engine at request time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewLoan {
    pub group: GroupId,
    pub borrower: PrincipalId,
    pub principal: Amount,
    pub interest_rate: InterestRate,
    pub purpose: String,
    pub due_date: NaiveDate,
    pub schedule: RepaymentSchedule,
    /// Set when an admin/treasurer requested with auto-approval: the
    /// loan is created directly in `approved` with this approver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approver: Option<PrincipalId>,
}

/// Filters for loan queries. Results are newest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoanQuery {
    pub borrower: Option<PrincipalId>,
    pub status: Option<LoanStatus>,
}

/// The loan book.
pub struct LoanBook {
    loans: RwLock<HashMap<LoanId, Loan>>,
    group_index: RwLock<HashMap<GroupId, Vec<LoanId>>>,
}

impl LoanBook {
    pub fn new() -> Self {
        Self {
            loans: RwLock::new(HashMap::new()),
            group_index: RwLock::new(HashMap::new()),
        }
    }

    /// Create a loan. Total due is `principal × (1 + rate/100)`,
    /// computed here once and immutable afterwards.
    pub fn create(&self, new: NewLoan) -> ChamaResult<Loan> {
        if !new.principal.is_positive() {
            return Err(ChamaError::invalid_amount(format!(
                "loan principal must be positive, got {}",
                new.principal
            )));
        }

        let now = Utc::now();
        let approved = new.auto_approver.is_some();
        let loan = Loan {
            id: LoanId::generate(),
            group: new.group,
            borrower: new.borrower,
            principal: new.principal,
            interest_rate: new.interest_rate,
            total_due: new.interest_rate.total_due(new.principal),
            purpose: new.purpose,
            due_date: new.due_date,
            schedule: new.schedule,
            status: if approved {
                LoanStatus::Approved
            } else {
                LoanStatus::Pending
            },
            approver: new.auto_approver,
            decided_at: approved.then_some(now),
            disbursement_date: approved.then(|| now.date_naive()),
            created_at: now,
        };

        let mut loans = self.loans.write().map_err(|_| ChamaError::LockError)?;
        let mut group_index = self.group_index.write().map_err(|_| ChamaError::LockError)?;
        group_index
            .entry(loan.group.clone())
            .or_default()
            .push(loan.id.clone());
        loans.insert(loan.id.clone(), loan.clone());

        info!(
            group = %loan.group,
            loan = %loan.id,
            borrower = %loan.borrower,
            principal = %loan.principal,
            total_due = %loan.total_due,
            status = ?loan.status,
            "loan created"
        );
        Ok(loan)
    }

    pub fn get(&self, id: &LoanId) -> ChamaResult<Loan> {
        let loans = self.loans.read().map_err(|_| ChamaError::LockError)?;
        loans
            .get(id)
            .cloned()
            .ok_or_else(|| ChamaError::NotFound(format!("loan {id}")))
    }

    /// Approve or reject a pending loan. The read-check-write runs under
    /// one write lock, so of two concurrent deciders exactly one wins and
    /// the other gets `InvalidState`.
    pub fn decide(
        &self,
        id: &LoanId,
        approver: PrincipalId,
        decision: LoanDecision,
        disbursement_date: Option<NaiveDate>,
    ) -> ChamaResult<Loan> {
        let mut loans = self.loans.write().map_err(|_| ChamaError::LockError)?;
        let loan = loans
            .get_mut(id)
            .ok_or_else(|| ChamaError::NotFound(format!("loan {id}")))?;

        if loan.status != LoanStatus::Pending {
            return Err(ChamaError::InvalidState(format!(
                "loan {id} is {:?}, a decision can only be made on a pending loan",
                loan.status
            )));
        }

        let now = Utc::now();
        loan.approver = Some(approver);
        loan.decided_at = Some(now);
        match decision {
            LoanDecision::Approve => {
                loan.status = LoanStatus::Approved;
                loan.disbursement_date = Some(disbursement_date.unwrap_or_else(|| now.date_naive()));
            }
            LoanDecision::Reject => {
                loan.status = LoanStatus::Rejected;
            }
        }

        info!(loan = %id, decision = ?decision, status = ?loan.status, "loan decided");
        Ok(loan.clone())
    }

    /// Transition driven by the external scheduling collaborator.
    /// Permitted: `approved -> active`, `active -> completed`,
    /// `active -> defaulted`.
    pub fn mark_status(&self, id: &LoanId, status: LoanStatus) -> ChamaResult<Loan> {
        let mut loans = self.loans.write().map_err(|_| ChamaError::LockError)?;
        let loan = loans
            .get_mut(id)
            .ok_or_else(|| ChamaError::NotFound(format!("loan {id}")))?;

        let permitted = matches!(
            (loan.status, status),
            (LoanStatus::Approved, LoanStatus::Active)
                | (LoanStatus::Active, LoanStatus::Completed)
                | (LoanStatus::Active, LoanStatus::Defaulted)
        );
        if !permitted {
            return Err(ChamaError::InvalidState(format!(
                "loan {id} cannot move from {:?} to {:?}",
                loan.status, status
            )));
        }

        loan.status = status;
        info!(loan = %id, status = ?status, "loan status updated");
        Ok(loan.clone())
    }

    /// A group's loans, newest first.
    pub fn loans_for_group(&self, group: &GroupId, query: LoanQuery) -> ChamaResult<Vec<Loan>> {
        let loans = self.loans.read().map_err(|_| ChamaError::LockError)?;
        let group_index = self.group_index.read().map_err(|_| ChamaError::LockError)?;

        let ids = match group_index.get(group) {
            Some(ids) => ids,
            None => return Ok(vec![]),
        };

        let mut results: Vec<_> = ids
            .iter()
            .filter_map(|id| loans.get(id))
            .filter(|loan| {
                if let Some(ref borrower) = query.borrower {
                    if loan.borrower != *borrower {
                        return false;
                    }
                }
                if let Some(status) = query.status {
                    if loan.status != status {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }
}

impl Default for LoanBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_loan(borrower: &str, major: i64, percent: u32) -> NewLoan {
        NewLoan {
            group: GroupId::new("grp-1"),
            borrower: PrincipalId::new(borrower),
            principal: Amount::from_major(major),
            interest_rate: InterestRate::from_percent(percent),
            purpose: "stock for kiosk".into(),
            due_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            schedule: RepaymentSchedule::default(),
            auto_approver: None,
        }
    }

    #[test]
    fn test_create_pending_loan_snapshots_total() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.total_due, Amount::from_major(2100));
        assert!(loan.approver.is_none());
        assert!(loan.disbursement_date.is_none());
    }

    #[test]
    fn test_non_positive_principal_rejected() {
        let book = LoanBook::new();
        assert!(matches!(
            book.create(new_loan("alice", 0, 5)),
            Err(ChamaError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_auto_approved_creation() {
        let book = LoanBook::new();
        let mut new = new_loan("alice", 1000, 10);
        new.auto_approver = Some(PrincipalId::new("admin"));

        let loan = book.create(new).unwrap();
        assert_eq!(loan.status, LoanStatus::Approved);
        assert_eq!(loan.approver, Some(PrincipalId::new("admin")));
        assert!(loan.decided_at.is_some());
        assert!(loan.disbursement_date.is_some());
        assert_eq!(loan.total_due, Amount::from_major(1100));
    }

    #[test]
    fn test_approve_sets_terminal_fields() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        let decided = book
            .decide(&loan.id, PrincipalId::new("admin"), LoanDecision::Approve, None)
            .unwrap();
        assert_eq!(decided.status, LoanStatus::Approved);
        assert_eq!(decided.approver, Some(PrincipalId::new("admin")));
        assert!(decided.decided_at.is_some());
        assert!(decided.disbursement_date.is_some());
    }

    #[test]
    fn test_reject_leaves_disbursement_unset() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        let decided = book
            .decide(&loan.id, PrincipalId::new("admin"), LoanDecision::Reject, None)
            .unwrap();
        assert_eq!(decided.status, LoanStatus::Rejected);
        assert!(decided.disbursement_date.is_none());
    }

    #[test]
    fn test_second_decision_fails_and_first_stands() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        let first = book
            .decide(&loan.id, PrincipalId::new("admin"), LoanDecision::Approve, None)
            .unwrap();

        let result = book.decide(
            &loan.id,
            PrincipalId::new("tess"),
            LoanDecision::Reject,
            None,
        );
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));

        // Terminal fields from the first decision are untouched.
        let current = book.get(&loan.id).unwrap();
        assert_eq!(current.approver, first.approver);
        assert_eq!(current.decided_at, first.decided_at);
        assert_eq!(current.status, LoanStatus::Approved);
    }

    #[test]
    fn test_explicit_disbursement_date() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 500, 0)).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        let decided = book
            .decide(
                &loan.id,
                PrincipalId::new("admin"),
                LoanDecision::Approve,
                Some(date),
            )
            .unwrap();
        assert_eq!(decided.disbursement_date, Some(date));
    }

    #[test]
    fn test_external_status_transitions() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();
        book.decide(&loan.id, PrincipalId::new("admin"), LoanDecision::Approve, None)
            .unwrap();

        book.mark_status(&loan.id, LoanStatus::Active).unwrap();
        let done = book.mark_status(&loan.id, LoanStatus::Completed).unwrap();
        assert_eq!(done.status, LoanStatus::Completed);
    }

    #[test]
    fn test_illegal_status_transitions_rejected() {
        let book = LoanBook::new();
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        // pending -> active skips the decision
        assert!(matches!(
            book.mark_status(&loan.id, LoanStatus::Active),
            Err(ChamaError::InvalidState(_))
        ));
        // pending -> defaulted is nonsense
        assert!(matches!(
            book.mark_status(&loan.id, LoanStatus::Defaulted),
            Err(ChamaError::InvalidState(_))
        ));
    }

    #[test]
    fn test_query_filters_and_order() {
        let book = LoanBook::new();
        let group = GroupId::new("grp-1");
        book.create(new_loan("alice", 100, 5)).unwrap();
        book.create(new_loan("bob", 200, 5)).unwrap();
        let last = book.create(new_loan("alice", 300, 5)).unwrap();

        let all = book.loans_for_group(&group, LoanQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, last.id);

        let alices = book
            .loans_for_group(
                &group,
                LoanQuery {
                    borrower: Some(PrincipalId::new("alice")),
                    status: None,
                },
            )
            .unwrap();
        assert_eq!(alices.len(), 2);

        let pending = book
            .loans_for_group(
                &group,
                LoanQuery {
                    borrower: None,
                    status: Some(LoanStatus::Pending),
                },
            )
            .unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_concurrent_decisions_have_one_winner() {
        use std::sync::Arc;

        let book = Arc::new(LoanBook::new());
        let loan = book.create(new_loan("alice", 2000, 5)).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let book = Arc::clone(&book);
            let id = loan.id.clone();
            handles.push(std::thread::spawn(move || {
                book.decide(
                    &id,
                    PrincipalId::new(format!("approver-{i}")),
                    LoanDecision::Approve,
                    None,
                )
                .is_ok()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
