//! Membership records, roles, and the capability model.
//!
//! Each write operation declares the capability it requires; a single
//! authorization check in `chama-membership` evaluates role ⊇ capability
//! before any side effect. There is no blanket write hierarchy — a
//! treasurer cannot manage members, even though an admin can decide loans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a caller, as resolved by the external
/// principal-resolution service. Authentication mechanics live there,
/// not here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a principal holds within one group. A principal may hold
/// memberships in many groups, each with an independent role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Treasurer,
    #[default]
    Member,
}

impl Role {
    /// The capability set this role grants.
    pub fn grants(&self) -> &'static [Capability] {
        match self {
            Role::Admin => &[
                Capability::RecordContribution,
                Capability::ViewOwnRecords,
                Capability::ViewAllRecords,
                Capability::MarkContributions,
                Capability::ManageMembers,
                Capability::ManageGroup,
                Capability::ManageRounds,
                Capability::DecideLoans,
                Capability::RequestLoanOnBehalf,
            ],
            Role::Treasurer => &[
                Capability::RecordContribution,
                Capability::ViewOwnRecords,
                Capability::ViewAllRecords,
                Capability::MarkContributions,
                Capability::ManageRounds,
                Capability::DecideLoans,
                Capability::RequestLoanOnBehalf,
            ],
            Role::Member => &[Capability::RecordContribution, Capability::ViewOwnRecords],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.grants().contains(&capability)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Treasurer => write!(f, "treasurer"),
            Role::Member => write!(f, "member"),
        }
    }
}

/// Enumerated capabilities. One per guarded operation family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Record one's own contribution
    RecordContribution,
    /// Read one's own historical records
    ViewOwnRecords,
    /// Read any member's records in the group
    ViewAllRecords,
    /// Transition contribution payment status (pending -> paid/late)
    MarkContributions,
    /// Add or deactivate members
    ManageMembers,
    /// Update group configuration
    ManageGroup,
    /// Start rounds and select winners
    ManageRounds,
    /// Approve or reject loans
    DecideLoans,
    /// Request a loan on behalf of another member
    RequestLoanOnBehalf,
}

/// A membership record: one principal's standing within one group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Membership {
    pub principal: PrincipalId,
    pub role: Role,
    /// Deactivation is the only removal path. An inactive member loses
    /// all write capability but keeps read access to their own history.
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(principal: PrincipalId, role: Role) -> Self {
        Self {
            principal,
            role,
            active: true,
            joined_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
