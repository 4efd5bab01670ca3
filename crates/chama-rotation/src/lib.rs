//! Rotation Scheduler - the merry-go-round round lifecycle
//!
//! One state machine per group:
//! `no round -> active -> completed -> active (next number) -> ...`
//!
//! At most one round per group is active at any time. Round numbers are
//! strictly increasing from 1 and never reused. The pooled total only
//! grows while a round is open; completion closes the round logically,
//! it never zeroes history.
//!
//! The scheduler does not draw winners. Selection is a human decision
//! passed in by the caller; this component validates and records it and
//! hands the completed round back so the engine can emit the payout.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use chama_types::{
    Amount, ChamaError, ChamaResult, GroupId, PrincipalId, Round, RoundStatus, SelectionMethod,
};
use chrono::Utc;
use tracing::info;

/// Per-group round history.
#[derive(Clone, Debug, Default)]
struct RoundBook {
    active: Option<Round>,
    completed: Vec<Round>,
    last_number: u32,
}

/// The rotation scheduler. All writes to one group's book go through a
/// single write lock, so round-number allocation and pool accumulation
/// are serialized: concurrent `start_round` callers get exactly one
/// winner, and pool increments never lose updates.
pub struct RotationScheduler {
    books: RwLock<HashMap<GroupId, RoundBook>>,
}

impl RotationScheduler {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Open the next round. Fails while a round is already active.
    pub fn start_round(&self, group: &GroupId) -> ChamaResult<Round> {
        let mut books = self.books.write().map_err(|_| ChamaError::LockError)?;
        let book = books.entry(group.clone()).or_default();

        if book.active.is_some() {
            return Err(ChamaError::InvalidState(format!(
                "a round is already active for group {group}"
            )));
        }

        let number = book.last_number + 1;
        let round = Round::open(group.clone(), number);
        book.last_number = number;
        book.active = Some(round.clone());

        info!(group = %group, round = number, "round opened");
        Ok(round)
    }

    /// Eligibility check, without mutation. The engine runs this before
    /// persisting a merry-go-round contribution so that an ineligible
    /// payment is never recorded.
    ///
    /// With the current lifecycle the winner slot is only filled by
    /// [`select_winner`](Self::select_winner), which completes the round
    /// in the same call, so the arm that fires after a win is
    /// `NoActiveRound`. The winner-slot check matters only if selection
    /// ever stops closing the round.
    pub fn check_eligibility(&self, group: &GroupId, member: &PrincipalId) -> ChamaResult<()> {
        let books = self.books.read().map_err(|_| ChamaError::LockError)?;
        let active = books
            .get(group)
            .and_then(|book| book.active.as_ref())
            .ok_or_else(|| ChamaError::NoActiveRound(group.clone()))?;

        if active.winner.as_ref() == Some(member) {
            return Err(ChamaError::AlreadyWonThisRound(member.clone()));
        }
        Ok(())
    }

    /// Advisory predicate for callers: false only when the member is the
    /// already-recorded winner of the currently active round. A group
    /// with no active round answers true; the authoritative check at
    /// contribution time will still fail with `NoActiveRound`.
    pub fn can_contribute(&self, group: &GroupId, member: &PrincipalId) -> bool {
        let Ok(books) = self.books.read() else {
            return false;
        };
        match books.get(group).and_then(|book| book.active.as_ref()) {
            Some(round) => round.winner.as_ref() != Some(member),
            None => true,
        }
    }

    /// Credit a contribution into the active round's pool and return the
    /// new pooled total. Contributions can never land in a closed round.
    pub fn add_to_pool(
        &self,
        group: &GroupId,
        member: &PrincipalId,
        amount: Amount,
    ) -> ChamaResult<Amount> {
        if !amount.is_positive() {
            return Err(ChamaError::invalid_amount(format!(
                "pool credit must be positive, got {amount}"
            )));
        }

        let mut books = self.books.write().map_err(|_| ChamaError::LockError)?;
        let active = books
            .get_mut(group)
            .and_then(|book| book.active.as_mut())
            .ok_or_else(|| ChamaError::NoActiveRound(group.clone()))?;

        if active.winner.as_ref() == Some(member) {
            return Err(ChamaError::AlreadyWonThisRound(member.clone()));
        }

        active.pool = active.pool.saturating_add(amount);
        info!(
            group = %group,
            round = active.number,
            member = %member,
            credit = %amount,
            pool = %active.pool,
            "pool credited"
        );
        Ok(active.pool)
    }

    /// Record the winner and close the round. `reason` is mandatory for
    /// `request` selections. Returns the completed round; emitting the
    /// payout (exactly once, even for a zero pool) is the engine's job.
    pub fn select_winner(
        &self,
        group: &GroupId,
        winner: PrincipalId,
        method: SelectionMethod,
        reason: Option<String>,
    ) -> ChamaResult<Round> {
        if method == SelectionMethod::Request && reason.as_deref().map_or(true, str::is_empty) {
            return Err(ChamaError::InvalidState(
                "selection method 'request' requires a reason".into(),
            ));
        }

        let mut books = self.books.write().map_err(|_| ChamaError::LockError)?;
        let book = books
            .get_mut(group)
            .ok_or_else(|| ChamaError::NoActiveRound(group.clone()))?;
        let mut round = book
            .active
            .take()
            .ok_or_else(|| ChamaError::NoActiveRound(group.clone()))?;

        round.winner = Some(winner.clone());
        round.method = Some(method);
        round.reason = reason;
        round.status = RoundStatus::Completed;
        round.completed_at = Some(Utc::now());
        book.completed.push(round.clone());

        info!(
            group = %group,
            round = round.number,
            winner = %winner,
            method = ?method,
            pool = %round.pool,
            "round completed"
        );
        Ok(round)
    }

    pub fn active_round(&self, group: &GroupId) -> ChamaResult<Option<Round>> {
        let books = self.books.read().map_err(|_| ChamaError::LockError)?;
        Ok(books.get(group).and_then(|book| book.active.clone()))
    }

    /// Completed rounds, newest first.
    pub fn completed_rounds(&self, group: &GroupId) -> ChamaResult<Vec<Round>> {
        let books = self.books.read().map_err(|_| ChamaError::LockError)?;
        let mut rounds = books
            .get(group)
            .map(|book| book.completed.clone())
            .unwrap_or_default();
        rounds.sort_by(|a, b| b.number.cmp(&a.number));
        Ok(rounds)
    }

    /// Principals that have won a completed round in this group.
    pub fn past_winners(&self, group: &GroupId) -> ChamaResult<Vec<PrincipalId>> {
        let books = self.books.read().map_err(|_| ChamaError::LockError)?;
        Ok(books
            .get(group)
            .map(|book| {
                book.completed
                    .iter()
                    .filter_map(|r| r.winner.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn last_round_number(&self, group: &GroupId) -> ChamaResult<u32> {
        let books = self.books.read().map_err(|_| ChamaError::LockError)?;
        Ok(books.get(group).map(|book| book.last_number).unwrap_or(0))
    }
}

impl Default for RotationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupId {
        GroupId::new("grp-1")
    }

    #[test]
    fn test_first_round_is_number_one() {
        let sched = RotationScheduler::new();
        let round = sched.start_round(&group()).unwrap();
        assert_eq!(round.number, 1);
        assert_eq!(round.pool, Amount::ZERO);
        assert!(round.is_active());
    }

    #[test]
    fn test_second_start_fails_while_active() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();
        let result = sched.start_round(&group());
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));
    }

    #[test]
    fn test_round_numbers_strictly_increase() {
        let sched = RotationScheduler::new();
        for expected in 1..=4u32 {
            let round = sched.start_round(&group()).unwrap();
            assert_eq!(round.number, expected);
            sched
                .select_winner(&group(), PrincipalId::new("w"), SelectionMethod::Raffle, None)
                .unwrap();
        }
        assert_eq!(sched.last_round_number(&group()).unwrap(), 4);
        assert_eq!(sched.completed_rounds(&group()).unwrap().len(), 4);
    }

    #[test]
    fn test_pool_accumulates() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();

        let pool = sched
            .add_to_pool(&group(), &PrincipalId::new("alice"), Amount::from_major(500))
            .unwrap();
        assert_eq!(pool, Amount::from_major(500));

        let pool = sched
            .add_to_pool(&group(), &PrincipalId::new("bob"), Amount::from_major(250))
            .unwrap();
        assert_eq!(pool, Amount::from_major(750));

        let active = sched.active_round(&group()).unwrap().unwrap();
        assert_eq!(active.pool, Amount::from_major(750));
    }

    #[test]
    fn test_contribution_without_round_fails() {
        let sched = RotationScheduler::new();
        let result = sched.add_to_pool(&group(), &PrincipalId::new("alice"), Amount::from_major(10));
        assert!(matches!(result, Err(ChamaError::NoActiveRound(_))));
        assert!(matches!(
            sched.check_eligibility(&group(), &PrincipalId::new("alice")),
            Err(ChamaError::NoActiveRound(_))
        ));
    }

    #[test]
    fn test_contribution_after_close_fails() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();
        sched
            .select_winner(&group(), PrincipalId::new("alice"), SelectionMethod::Raffle, None)
            .unwrap();

        // The round is completed; nothing can land in it anymore.
        let result = sched.add_to_pool(&group(), &PrincipalId::new("bob"), Amount::from_major(10));
        assert!(matches!(result, Err(ChamaError::NoActiveRound(_))));
    }

    #[test]
    fn test_select_winner_without_round_fails() {
        let sched = RotationScheduler::new();
        let result =
            sched.select_winner(&group(), PrincipalId::new("alice"), SelectionMethod::Raffle, None);
        assert!(matches!(result, Err(ChamaError::NoActiveRound(_))));
    }

    #[test]
    fn test_request_selection_requires_reason() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();

        let result =
            sched.select_winner(&group(), PrincipalId::new("alice"), SelectionMethod::Request, None);
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));
        let result = sched.select_winner(
            &group(),
            PrincipalId::new("alice"),
            SelectionMethod::Request,
            Some(String::new()),
        );
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));

        let round = sched
            .select_winner(
                &group(),
                PrincipalId::new("alice"),
                SelectionMethod::Request,
                Some("school fees emergency".into()),
            )
            .unwrap();
        assert_eq!(round.reason.as_deref(), Some("school fees emergency"));
    }

    #[test]
    fn test_completed_round_carries_winner_and_pool() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();
        sched
            .add_to_pool(&group(), &PrincipalId::new("alice"), Amount::from_major(500))
            .unwrap();

        let round = sched
            .select_winner(&group(), PrincipalId::new("alice"), SelectionMethod::Raffle, None)
            .unwrap();
        assert_eq!(round.status, RoundStatus::Completed);
        assert_eq!(round.winner, Some(PrincipalId::new("alice")));
        assert_eq!(round.pool, Amount::from_major(500));
        assert!(round.completed_at.is_some());

        assert!(sched.active_round(&group()).unwrap().is_none());
        assert_eq!(sched.past_winners(&group()).unwrap().len(), 1);
    }

    #[test]
    fn test_can_contribute_is_advisory() {
        let sched = RotationScheduler::new();
        let alice = PrincipalId::new("alice");

        // No round at all: advisory yes, authoritative check says no round.
        assert!(sched.can_contribute(&group(), &alice));

        sched.start_round(&group()).unwrap();
        assert!(sched.can_contribute(&group(), &alice));
    }

    #[test]
    fn test_zero_pool_completion_is_valid() {
        let sched = RotationScheduler::new();
        sched.start_round(&group()).unwrap();
        let round = sched
            .select_winner(&group(), PrincipalId::new("alice"), SelectionMethod::Raffle, None)
            .unwrap();
        assert_eq!(round.pool, Amount::ZERO);
    }

    #[test]
    fn test_numbers_independent_per_group() {
        let sched = RotationScheduler::new();
        let other = GroupId::new("grp-2");
        sched.start_round(&group()).unwrap();
        let round = sched.start_round(&other).unwrap();
        assert_eq!(round.number, 1);
    }

    #[test]
    fn test_concurrent_starts_have_one_winner() {
        use std::sync::Arc;

        let sched = Arc::new(RotationScheduler::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sched = Arc::clone(&sched);
            handles.push(std::thread::spawn(move || {
                sched.start_round(&GroupId::new("grp-race")).is_ok()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(
            sched.last_round_number(&GroupId::new("grp-race")).unwrap(),
            1
        );
    }
}
