//! Savings group identity and configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Amount, InterestRate};

/// Unique identifier for a savings group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Generate a new random GroupId.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a GroupId from a known string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How often dues are expected (also used for loan repayment schedules).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    #[default]
    Monthly,
}

/// Specification for creating a new savings group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Human-readable group name
    pub name: String,
    /// Expected periodic contribution per member
    pub contribution_amount: Amount,
    /// Contribution cadence
    pub frequency: Frequency,
    /// Interest rate applied to loans issued by the group
    pub interest_rate: InterestRate,
    /// Member cap; `None` falls back to the engine default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_members: Option<u32>,
    /// Private groups are invisible to non-members in the product layer
    pub private: bool,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, contribution_amount: Amount) -> Self {
        Self {
            name: name.into(),
            contribution_amount,
            frequency: Frequency::default(),
            interest_rate: InterestRate::default(),
            max_members: None,
            private: false,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_interest_rate(mut self, rate: InterestRate) -> Self {
        self.interest_rate = rate;
        self
    }

    pub fn with_max_members(mut self, max: u32) -> Self {
        self.max_members = Some(max);
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

/// A savings group record.
///
/// Mutable only through [`GroupUpdate`] by an admin member. Groups are
/// never deleted; the engine exposes no delete operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub contribution_amount: Amount,
    pub frequency: Frequency,
    /// Rate applied to loans at creation time. Loans snapshot this value;
    /// updating it never changes an existing loan.
    pub interest_rate: InterestRate,
    pub max_members: u32,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(spec: GroupSpec, max_members: u32) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::generate(),
            name: spec.name,
            contribution_amount: spec.contribution_amount,
            frequency: spec.frequency,
            interest_rate: spec.interest_rate,
            max_members,
            private: spec.private,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update, bumping `updated_at`.
    pub fn apply(&mut self, update: GroupUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(amount) = update.contribution_amount {
            self.contribution_amount = amount;
        }
        if let Some(frequency) = update.frequency {
            self.frequency = frequency;
        }
        if let Some(rate) = update.interest_rate {
            self.interest_rate = rate;
        }
        if let Some(max) = update.max_members {
            self.max_members = max;
        }
        if let Some(private) = update.private {
            self.private = private;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update to a group's configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub contribution_amount: Option<Amount>,
    pub frequency: Option<Frequency>,
    pub interest_rate: Option<InterestRate>,
    pub max_members: Option<u32>,
    pub private: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id() {
        let id = GroupId::generate();
        assert!(!id.0.is_empty());
        assert_eq!(format!("{}", GroupId::new("grp-1")), "grp-1");
    }

    #[test]
    fn test_group_from_spec() {
        let spec = GroupSpec::new("Umoja Savings", Amount::from_major(50))
            .with_frequency(Frequency::Weekly)
            .with_interest_rate(InterestRate::from_percent(10))
            .with_max_members(12)
            .private();

        let group = Group::new(spec, 12);
        assert_eq!(group.name, "Umoja Savings");
        assert_eq!(group.frequency, Frequency::Weekly);
        assert_eq!(group.max_members, 12);
        assert!(group.private);
        assert_eq!(group.created_at, group.updated_at);
    }

    #[test]
    fn test_group_apply_update() {
        let spec = GroupSpec::new("Umoja", Amount::from_major(50));
        let mut group = Group::new(spec, 30);
        let old_rate = group.interest_rate;

        group.apply(GroupUpdate {
            interest_rate: Some(InterestRate::from_percent(15)),
            max_members: Some(20),
            ..Default::default()
        });

        assert_ne!(group.interest_rate, old_rate);
        assert_eq!(group.max_members, 20);
        assert_eq!(group.name, "Umoja");
        assert!(group.updated_at >= group.created_at);
    }
}
