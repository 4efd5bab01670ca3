//! Chama Engine - the single entry point for group financial operations
//!
//! Composes the membership directory, contribution ledger, rotation
//! scheduler, and loan book behind one facade. Every guarded operation
//! follows the same shape: resolve the group, take the group's write
//! guard, authorize the actor, then call into the owning component.
//!
//! Cross-component writes for one group are serialized by a per-group
//! mutex, so a rotation eligibility check and the ledger write that
//! depends on it cannot interleave with another writer. Reads go
//! straight to the components.

#![deny(unsafe_code)]

pub mod config;
pub mod payout;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chama_ledger::ContributionLedger;
use chama_loans::{LoanBook, NewLoan};
use chama_membership::MembershipDirectory;
use chama_rotation::RotationScheduler;
use chama_types::{
    Amount, Capability, ChamaError, ChamaResult, Contribution, ContributionId, ContributionKind,
    Group, GroupId, GroupSpec, GroupUpdate, Loan, LoanDecision, LoanId, LoanStatus, Membership,
    PaymentStatus, PayoutEvent, PrincipalId, RepaymentSchedule, Role, Round, SelectionMethod,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use chama_ledger::{ContributionQuery, NewContribution};
pub use chama_loans::LoanQuery;
pub use config::EngineConfig;
pub use payout::{FailingSink, PayoutDelivery, PayoutError, PayoutSink, RecordingSink};

/// A loan request as it arrives at the facade. `borrower` defaults to
/// the actor; setting it to someone else requires the on-behalf
/// capability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanRequest {
    pub group: GroupId,
    pub actor: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrower: Option<PrincipalId>,
    pub amount: Amount,
    pub purpose: String,
    pub due_date: NaiveDate,
    pub schedule: RepaymentSchedule,
    /// Create the loan directly in `approved`, with the actor as the
    /// approver. The actor must hold the decide-loans capability.
    pub auto_approve: bool,
}

impl LoanRequest {
    pub fn new(
        group: GroupId,
        actor: PrincipalId,
        amount: Amount,
        purpose: impl Into<String>,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            group,
            actor,
            borrower: None,
            amount,
            purpose: purpose.into(),
            due_date,
            schedule: RepaymentSchedule::default(),
            auto_approve: false,
        }
    }

    pub fn on_behalf_of(mut self, borrower: PrincipalId) -> Self {
        self.borrower = Some(borrower);
        self
    }

    pub fn with_schedule(mut self, schedule: RepaymentSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn auto_approved(mut self) -> Self {
        self.auto_approve = true;
        self
    }
}

/// A completed round plus how its payout emission went. The round is
/// committed either way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: Round,
    pub payout: PayoutDelivery,
}

/// A created or decided loan plus the disbursement emission, when one
/// was due (only approvals disburse).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanOutcome {
    pub loan: Loan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<PayoutDelivery>,
}

/// The engine facade.
pub struct ChamaEngine {
    config: EngineConfig,
    groups: RwLock<HashMap<GroupId, Group>>,
    group_locks: RwLock<HashMap<GroupId, Arc<Mutex<()>>>>,
    membership: MembershipDirectory,
    ledger: ContributionLedger,
    rotation: RotationScheduler,
    loans: LoanBook,
    sink: Arc<dyn PayoutSink>,
}

impl ChamaEngine {
    pub fn new(sink: Arc<dyn PayoutSink>) -> Self {
        Self::with_config(EngineConfig::default(), sink)
    }

    pub fn with_config(config: EngineConfig, sink: Arc<dyn PayoutSink>) -> Self {
        Self {
            config,
            groups: RwLock::new(HashMap::new()),
            group_locks: RwLock::new(HashMap::new()),
            membership: MembershipDirectory::new(),
            ledger: ContributionLedger::new(),
            rotation: RotationScheduler::new(),
            loans: LoanBook::new(),
            sink,
        }
    }

    // ----- groups -----

    /// Create a group with its founding admin. The caller becomes the
    /// group's first (and initially only) member.
    pub fn create_group(&self, spec: GroupSpec, founding_admin: PrincipalId) -> ChamaResult<Group> {
        let max_members = spec.max_members.unwrap_or(self.config.default_max_members);
        let group = Group::new(spec, max_members);

        self.membership
            .register_group(group.id.clone(), founding_admin.clone())?;
        {
            let mut groups = self.groups.write().map_err(|_| ChamaError::LockError)?;
            groups.insert(group.id.clone(), group.clone());
        }
        {
            let mut locks = self.group_locks.write().map_err(|_| ChamaError::LockError)?;
            locks.insert(group.id.clone(), Arc::new(Mutex::new(())));
        }

        info!(
            group = %group.id,
            name = %group.name,
            admin = %founding_admin,
            max_members = group.max_members,
            "group created"
        );
        Ok(group)
    }

    pub fn get_group(&self, group: &GroupId) -> ChamaResult<Group> {
        let groups = self.groups.read().map_err(|_| ChamaError::LockError)?;
        groups
            .get(group)
            .cloned()
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))
    }

    /// Update group configuration. Existing loans keep the interest rate
    /// they snapshotted at creation.
    pub fn update_group(
        &self,
        group: &GroupId,
        actor: &PrincipalId,
        update: GroupUpdate,
    ) -> ChamaResult<Group> {
        let guard = self.group_guard(group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(group, actor, Capability::ManageGroup)?;

        let mut groups = self.groups.write().map_err(|_| ChamaError::LockError)?;
        let record = groups
            .get_mut(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;
        record.apply(update);
        info!(group = %group, actor = %actor, "group updated");
        Ok(record.clone())
    }

    // ----- membership -----

    pub fn get_role(&self, group: &GroupId, principal: &PrincipalId) -> ChamaResult<Membership> {
        self.membership.role_of(group, principal)
    }

    /// All membership records of a group. Any active member may look at
    /// the roster.
    pub fn list_members(
        &self,
        group: &GroupId,
        caller: &PrincipalId,
    ) -> ChamaResult<Vec<Membership>> {
        self.membership.require_active(group, caller)?;
        self.membership.list_members(group)
    }

    /// Add a member, enforcing the group's member cap against active
    /// members only.
    pub fn add_member(
        &self,
        group: &GroupId,
        actor: &PrincipalId,
        principal: PrincipalId,
        role: Role,
    ) -> ChamaResult<Membership> {
        let record = self.get_group(group)?;
        let guard = self.group_guard(group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(group, actor, Capability::ManageMembers)?;

        let active = self.membership.active_member_count(group)?;
        if active >= record.max_members as usize {
            return Err(ChamaError::InvalidState(format!(
                "group {group} is full ({} members)",
                record.max_members
            )));
        }

        self.membership
            .add_member(group, Membership::new(principal, role))
    }

    pub fn deactivate_member(
        &self,
        group: &GroupId,
        actor: &PrincipalId,
        principal: &PrincipalId,
    ) -> ChamaResult<Membership> {
        let guard = self.group_guard(group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(group, actor, Capability::ManageMembers)?;
        self.membership.deactivate(group, principal)
    }

    // ----- contributions -----

    /// Record a member's payment. For merry-go-round contributions the
    /// rotation eligibility check runs before anything is persisted, and
    /// the rotation portion is credited to the active round's pool under
    /// the same group guard.
    pub fn record_contribution(&self, new: NewContribution) -> ChamaResult<Contribution> {
        self.get_group(&new.group)?;
        let guard = self.group_guard(&new.group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(&new.group, &new.member, Capability::RecordContribution)?;

        if new.kind == ContributionKind::MerryGoRound {
            self.rotation.check_eligibility(&new.group, &new.member)?;
        }

        let contribution = self.ledger.record(new)?;

        let portion = contribution.rotation_portion();
        if portion.is_positive() {
            self.rotation
                .add_to_pool(&contribution.group, &contribution.member, portion)?;
        }
        Ok(contribution)
    }

    /// A group's contribution history. Callers without the view-all
    /// capability are scoped to their own records (active or not);
    /// explicitly filtering to someone else's is denied.
    pub fn list_contributions(
        &self,
        group: &GroupId,
        caller: &PrincipalId,
        mut query: ContributionQuery,
    ) -> ChamaResult<Vec<Contribution>> {
        let membership = self.membership.role_of(group, caller)?;
        if membership.is_active() && membership.role.can(Capability::ViewAllRecords) {
            return self.ledger.query(group, query);
        }
        if matches!(&query.member, Some(m) if m != caller) {
            self.membership
                .authorize(group, caller, Capability::ViewAllRecords)?;
        }
        query.member = Some(caller.clone());
        self.ledger.query(group, query)
    }

    /// Transition a contribution's payment status.
    pub fn mark_contribution(
        &self,
        group: &GroupId,
        actor: &PrincipalId,
        contribution: &ContributionId,
        status: PaymentStatus,
    ) -> ChamaResult<Contribution> {
        self.membership
            .authorize(group, actor, Capability::MarkContributions)?;

        let record = self.ledger.get(contribution)?;
        if record.group != *group {
            return Err(ChamaError::NotFound(format!(
                "contribution {contribution} in group {group}"
            )));
        }
        self.ledger.mark(contribution, status)
    }

    /// Running total a member has paid into a group. Same visibility
    /// rule as contribution listings.
    pub fn member_total(
        &self,
        group: &GroupId,
        caller: &PrincipalId,
        member: &PrincipalId,
    ) -> ChamaResult<Amount> {
        if member == caller {
            self.membership.role_of(group, caller)?;
        } else {
            self.membership
                .authorize(group, caller, Capability::ViewAllRecords)?;
        }
        self.ledger.member_total(group, member)
    }

    // ----- rotation -----

    pub fn start_round(&self, group: &GroupId, actor: &PrincipalId) -> ChamaResult<Round> {
        self.get_group(group)?;
        let guard = self.group_guard(group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(group, actor, Capability::ManageRounds)?;
        self.rotation.start_round(group)
    }

    /// Record the winner, close the round, and emit the payout exactly
    /// once. A missing active round fails before authorization so the
    /// answer does not depend on who asks.
    pub fn select_winner(
        &self,
        group: &GroupId,
        actor: &PrincipalId,
        winner: PrincipalId,
        method: SelectionMethod,
        reason: Option<String>,
    ) -> ChamaResult<RoundOutcome> {
        self.get_group(group)?;
        let guard = self.group_guard(group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;

        if self.rotation.active_round(group)?.is_none() {
            return Err(ChamaError::NoActiveRound(group.clone()));
        }
        self.membership
            .authorize(group, actor, Capability::ManageRounds)?;

        if !self.membership.is_active_member(group, &winner) {
            return Err(ChamaError::InvalidWinner(winner));
        }
        if self.config.unique_winners {
            let past = self.rotation.past_winners(group)?;
            if past.contains(&winner) {
                let unserved = self
                    .membership
                    .active_principals(group)?
                    .into_iter()
                    .any(|p| p != winner && !past.contains(&p));
                if unserved {
                    return Err(ChamaError::InvalidWinner(winner));
                }
            }
        }

        let round = self
            .rotation
            .select_winner(group, winner.clone(), method, reason)?;
        let payout = self.emit(PayoutEvent::for_round(&round, winner));
        Ok(RoundOutcome { round, payout })
    }

    /// Advisory: can this member still contribute to the current round?
    pub fn can_contribute(&self, group: &GroupId, member: &PrincipalId) -> bool {
        self.rotation.can_contribute(group, member)
    }

    pub fn active_round(&self, group: &GroupId) -> ChamaResult<Option<Round>> {
        self.rotation.active_round(group)
    }

    pub fn completed_rounds(&self, group: &GroupId) -> ChamaResult<Vec<Round>> {
        self.rotation.completed_rounds(group)
    }

    // ----- loans -----

    /// Open a loan. The group's current interest rate is snapshotted
    /// into the loan here; later rate changes never touch it.
    pub fn request_loan(&self, request: LoanRequest) -> ChamaResult<LoanOutcome> {
        let group = self.get_group(&request.group)?;
        let guard = self.group_guard(&request.group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;

        let borrower = request.borrower.unwrap_or_else(|| request.actor.clone());
        if borrower == request.actor {
            self.membership.require_active(&request.group, &borrower)?;
        } else {
            self.membership.authorize(
                &request.group,
                &request.actor,
                Capability::RequestLoanOnBehalf,
            )?;
            if !self.membership.is_active_member(&request.group, &borrower) {
                return Err(ChamaError::InvalidBorrower(borrower));
            }
        }

        let auto_approver = if request.auto_approve {
            self.membership
                .authorize(&request.group, &request.actor, Capability::DecideLoans)?;
            Some(request.actor.clone())
        } else {
            None
        };

        let loan = self.loans.create(NewLoan {
            group: request.group,
            borrower,
            principal: request.amount,
            interest_rate: group.interest_rate,
            purpose: request.purpose,
            due_date: request.due_date,
            schedule: request.schedule,
            auto_approver,
        })?;

        let payout = (loan.status == LoanStatus::Approved)
            .then(|| self.emit(PayoutEvent::for_loan(&loan)));
        Ok(LoanOutcome { loan, payout })
    }

    /// Approve or reject a pending loan. An approval disburses the
    /// principal through the payout sink exactly once.
    pub fn decide_loan(
        &self,
        loan: &LoanId,
        actor: &PrincipalId,
        decision: LoanDecision,
        disbursement_date: Option<NaiveDate>,
    ) -> ChamaResult<LoanOutcome> {
        let existing = self.loans.get(loan)?;
        let guard = self.group_guard(&existing.group)?;
        let _held = guard.lock().map_err(|_| ChamaError::LockError)?;
        self.membership
            .authorize(&existing.group, actor, Capability::DecideLoans)?;

        let decided = self
            .loans
            .decide(loan, actor.clone(), decision, disbursement_date)?;

        let payout = (decided.status == LoanStatus::Approved)
            .then(|| self.emit(PayoutEvent::for_loan(&decided)));
        Ok(LoanOutcome {
            loan: decided,
            payout,
        })
    }

    pub fn get_loan(&self, loan: &LoanId) -> ChamaResult<Loan> {
        self.loans.get(loan)
    }

    /// A group's loans. Callers without the view-all capability are
    /// scoped to loans where they are the borrower (active or not);
    /// explicitly filtering to another borrower is denied.
    pub fn list_loans(
        &self,
        group: &GroupId,
        caller: &PrincipalId,
        mut query: LoanQuery,
    ) -> ChamaResult<Vec<Loan>> {
        let membership = self.membership.role_of(group, caller)?;
        if membership.is_active() && membership.role.can(Capability::ViewAllRecords) {
            return self.loans.loans_for_group(group, query);
        }
        if matches!(&query.borrower, Some(b) if b != caller) {
            self.membership
                .authorize(group, caller, Capability::ViewAllRecords)?;
        }
        query.borrower = Some(caller.clone());
        self.loans.loans_for_group(group, query)
    }

    /// Status transition driven by the external repayment-scheduling
    /// collaborator, not by a group member.
    pub fn mark_loan_status(&self, loan: &LoanId, status: LoanStatus) -> ChamaResult<Loan> {
        self.loans.mark_status(loan, status)
    }

    // ----- internals -----

    fn group_guard(&self, group: &GroupId) -> ChamaResult<Arc<Mutex<()>>> {
        {
            let locks = self.group_locks.read().map_err(|_| ChamaError::LockError)?;
            if let Some(lock) = locks.get(group) {
                return Ok(Arc::clone(lock));
            }
        }
        let mut locks = self.group_locks.write().map_err(|_| ChamaError::LockError)?;
        Ok(Arc::clone(locks.entry(group.clone()).or_default()))
    }

    /// Hand a payout to the sink. The state transition that produced the
    /// event is already committed; a sink failure is reported back as a
    /// delivery fault and left for the collaborator to retry.
    fn emit(&self, event: PayoutEvent) -> PayoutDelivery {
        match self.sink.emit(&event) {
            Ok(()) => {
                info!(
                    group = %event.group,
                    recipient = %event.recipient,
                    amount = %event.amount,
                    reason = %event.reason,
                    "payout emitted"
                );
                PayoutDelivery::Emitted
            }
            Err(e) => {
                warn!(
                    group = %event.group,
                    recipient = %event.recipient,
                    amount = %event.amount,
                    reason = %event.reason,
                    error = %e,
                    "payout delivery failed"
                );
                PayoutDelivery::Failed(e.to_string())
            }
        }
    }
}
