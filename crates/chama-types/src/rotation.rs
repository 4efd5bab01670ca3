//! Merry-go-round rounds: one pool-and-payout cycle per round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::member::PrincipalId;
use crate::money::Amount;

/// Unique identifier for a round.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(pub String);

impl RoundId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the winner was chosen. The engine never draws winners itself;
/// selection is a human decision it validates and records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Raffle,
    Request,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    Active,
    Completed,
}

/// One merry-go-round cycle. Round numbers are monotonic per group,
/// starting at 1, never reused. At most one round per group is `Active`
/// at any time; the pool only grows while the round is open.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub group: GroupId,
    pub number: u32,
    pub pool: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SelectionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Open a new round with an empty pool.
    pub fn open(group: GroupId, number: u32) -> Self {
        Self {
            id: RoundId::generate(),
            group,
            number,
            pool: Amount::ZERO,
            winner: None,
            method: None,
            reason: None,
            status: RoundStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RoundStatus::Active)
    }
}
