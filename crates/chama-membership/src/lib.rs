//! Membership Directory - who belongs to a group, and with what role
//!
//! Leaf dependency for every other component: resolves a principal's
//! role and standing within a group, and performs the single
//! authorization check every guarded operation goes through before any
//! side effect.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use chama_types::{Capability, ChamaError, ChamaResult, GroupId, Membership, PrincipalId, Role};
use tracing::{info, warn};

/// Per-group membership rosters. Pure lookup plus roster maintenance;
/// no monetary state lives here.
pub struct MembershipDirectory {
    rosters: RwLock<HashMap<GroupId, HashMap<PrincipalId, Membership>>>,
}

impl MembershipDirectory {
    pub fn new() -> Self {
        Self {
            rosters: RwLock::new(HashMap::new()),
        }
    }

    /// Create the roster for a new group with exactly one founding admin.
    /// The roster and the admin record are created atomically.
    pub fn register_group(
        &self,
        group: GroupId,
        founding_admin: PrincipalId,
    ) -> ChamaResult<Membership> {
        let mut rosters = self.rosters.write().map_err(|_| ChamaError::LockError)?;
        if rosters.contains_key(&group) {
            return Err(ChamaError::InvalidState(format!(
                "group {group} already has a roster"
            )));
        }

        let membership = Membership::new(founding_admin.clone(), Role::Admin);
        let mut roster = HashMap::new();
        roster.insert(founding_admin.clone(), membership.clone());
        rosters.insert(group.clone(), roster);

        info!(group = %group, principal = %founding_admin, "group roster created with founding admin");
        Ok(membership)
    }

    /// Add a member to an existing group.
    pub fn add_member(&self, group: &GroupId, membership: Membership) -> ChamaResult<Membership> {
        let mut rosters = self.rosters.write().map_err(|_| ChamaError::LockError)?;
        let roster = rosters
            .get_mut(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;

        if roster.contains_key(&membership.principal) {
            return Err(ChamaError::InvalidState(format!(
                "{} is already a member of group {group}",
                membership.principal
            )));
        }

        info!(
            group = %group,
            principal = %membership.principal,
            role = %membership.role,
            "member added"
        );
        roster.insert(membership.principal.clone(), membership.clone());
        Ok(membership)
    }

    /// Deactivate a membership. Deactivation is the only removal path;
    /// the record stays for historical reads.
    pub fn deactivate(&self, group: &GroupId, principal: &PrincipalId) -> ChamaResult<Membership> {
        let mut rosters = self.rosters.write().map_err(|_| ChamaError::LockError)?;
        let roster = rosters
            .get_mut(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;

        let membership = roster.get_mut(principal).ok_or_else(|| ChamaError::NotMember {
            group: group.clone(),
            principal: principal.clone(),
        })?;

        membership.deactivate();
        info!(group = %group, principal = %principal, "member deactivated");
        Ok(membership.clone())
    }

    /// Resolve a principal's membership: `NotMember` when no record
    /// exists. Inactive memberships are returned as-is; write-path
    /// callers go through [`authorize`](Self::authorize) instead.
    pub fn role_of(&self, group: &GroupId, principal: &PrincipalId) -> ChamaResult<Membership> {
        let rosters = self.rosters.read().map_err(|_| ChamaError::LockError)?;
        rosters
            .get(group)
            .and_then(|roster| roster.get(principal))
            .cloned()
            .ok_or_else(|| ChamaError::NotMember {
                group: group.clone(),
                principal: principal.clone(),
            })
    }

    /// The single authorization check: membership must exist, be active,
    /// and the role's capability set must contain `capability`.
    pub fn authorize(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        capability: Capability,
    ) -> ChamaResult<Membership> {
        let membership = self.role_of(group, principal)?;

        if !membership.is_active() {
            warn!(group = %group, principal = %principal, "denied: membership inactive");
            return Err(ChamaError::access_denied(format!(
                "membership of {principal} in group {group} is inactive"
            )));
        }

        if !membership.role.can(capability) {
            warn!(
                group = %group,
                principal = %principal,
                role = %membership.role,
                capability = ?capability,
                "denied: insufficient role"
            );
            return Err(ChamaError::access_denied(format!(
                "role {} lacks capability {capability:?}",
                membership.role
            )));
        }

        Ok(membership)
    }

    /// Active membership check without a capability requirement
    /// (self-service operations such as requesting one's own loan).
    pub fn require_active(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
    ) -> ChamaResult<Membership> {
        let membership = self.role_of(group, principal)?;
        if !membership.is_active() {
            return Err(ChamaError::access_denied(format!(
                "membership of {principal} in group {group} is inactive"
            )));
        }
        Ok(membership)
    }

    pub fn is_active_member(&self, group: &GroupId, principal: &PrincipalId) -> bool {
        self.role_of(group, principal)
            .map(|m| m.is_active())
            .unwrap_or(false)
    }

    /// All membership records for a group, active and inactive.
    pub fn list_members(&self, group: &GroupId) -> ChamaResult<Vec<Membership>> {
        let rosters = self.rosters.read().map_err(|_| ChamaError::LockError)?;
        let roster = rosters
            .get(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;
        let mut members: Vec<_> = roster.values().cloned().collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    pub fn active_member_count(&self, group: &GroupId) -> ChamaResult<usize> {
        let rosters = self.rosters.read().map_err(|_| ChamaError::LockError)?;
        let roster = rosters
            .get(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;
        Ok(roster.values().filter(|m| m.is_active()).count())
    }

    /// Principals of all active members.
    pub fn active_principals(&self, group: &GroupId) -> ChamaResult<Vec<PrincipalId>> {
        let rosters = self.rosters.read().map_err(|_| ChamaError::LockError)?;
        let roster = rosters
            .get(group)
            .ok_or_else(|| ChamaError::NotFound(format!("group {group}")))?;
        Ok(roster
            .values()
            .filter(|m| m.is_active())
            .map(|m| m.principal.clone())
            .collect())
    }
}

impl Default for MembershipDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (MembershipDirectory, GroupId, PrincipalId) {
        let dir = MembershipDirectory::new();
        let group = GroupId::new("grp-1");
        let admin = PrincipalId::new("admin");
        dir.register_group(group.clone(), admin.clone()).unwrap();
        (dir, group, admin)
    }

    #[test]
    fn test_founding_admin_created_with_group() {
        let (dir, group, admin) = setup();
        let m = dir.role_of(&group, &admin).unwrap();
        assert_eq!(m.role, Role::Admin);
        assert!(m.is_active());
        assert_eq!(dir.active_member_count(&group).unwrap(), 1);
    }

    #[test]
    fn test_register_group_twice_fails() {
        let (dir, group, _) = setup();
        let result = dir.register_group(group, PrincipalId::new("other"));
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));
    }

    #[test]
    fn test_role_of_unknown_principal_is_not_member() {
        let (dir, group, _) = setup();
        let result = dir.role_of(&group, &PrincipalId::new("stranger"));
        assert!(matches!(result, Err(ChamaError::NotMember { .. })));
    }

    #[test]
    fn test_add_and_list_members() {
        let (dir, group, _) = setup();
        dir.add_member(
            &group,
            Membership::new(PrincipalId::new("alice"), Role::Member),
        )
        .unwrap();
        dir.add_member(
            &group,
            Membership::new(PrincipalId::new("tess"), Role::Treasurer),
        )
        .unwrap();

        assert_eq!(dir.list_members(&group).unwrap().len(), 3);
        assert_eq!(dir.active_member_count(&group).unwrap(), 3);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let (dir, group, admin) = setup();
        let result = dir.add_member(&group, Membership::new(admin, Role::Member));
        assert!(matches!(result, Err(ChamaError::InvalidState(_))));
    }

    #[test]
    fn test_authorize_respects_capability_set() {
        let (dir, group, _) = setup();
        let tess = PrincipalId::new("tess");
        dir.add_member(&group, Membership::new(tess.clone(), Role::Treasurer))
            .unwrap();

        assert!(dir.authorize(&group, &tess, Capability::DecideLoans).is_ok());
        let result = dir.authorize(&group, &tess, Capability::ManageMembers);
        assert!(matches!(result, Err(ChamaError::AccessDenied { .. })));
    }

    #[test]
    fn test_deactivated_member_fails_every_write_check() {
        let (dir, group, _) = setup();
        let alice = PrincipalId::new("alice");
        dir.add_member(&group, Membership::new(alice.clone(), Role::Member))
            .unwrap();
        dir.deactivate(&group, &alice).unwrap();

        let result = dir.authorize(&group, &alice, Capability::RecordContribution);
        assert!(matches!(result, Err(ChamaError::AccessDenied { .. })));
        let result = dir.require_active(&group, &alice);
        assert!(matches!(result, Err(ChamaError::AccessDenied { .. })));

        // The record itself survives for historical reads.
        assert!(dir.role_of(&group, &alice).is_ok());
        assert!(!dir.is_active_member(&group, &alice));
    }

    #[test]
    fn test_independent_roles_across_groups() {
        let (dir, group, admin) = setup();
        let other = GroupId::new("grp-2");
        dir.register_group(other.clone(), PrincipalId::new("someone"))
            .unwrap();
        dir.add_member(&other, Membership::new(admin.clone(), Role::Member))
            .unwrap();

        assert_eq!(dir.role_of(&group, &admin).unwrap().role, Role::Admin);
        assert_eq!(dir.role_of(&other, &admin).unwrap().role, Role::Member);
    }

    #[test]
    fn test_active_principals() {
        let (dir, group, admin) = setup();
        let alice = PrincipalId::new("alice");
        dir.add_member(&group, Membership::new(alice.clone(), Role::Member))
            .unwrap();
        dir.deactivate(&group, &alice).unwrap();

        let active = dir.active_principals(&group).unwrap();
        assert_eq!(active, vec![admin]);
    }
}
