//! Object-level authorization predicates.
//!
//! Every handler runs [`Policy::require`] first (does the principal hold the
//! permission at all) and then, for item operations, one of the `can_*`
//! predicates against the target's [`Ownership`].

use thiserror::Error;

use super::{CapabilitySet, Permission};
use crate::domain::Principal;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("You do not have permission to perform this action")]
pub struct AccessDenied;

/// Ownership chain of a target object: the user it belongs to and that
/// user's admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub user_id: i32,
    pub admin_id: Option<i32>,
}

impl Ownership {
    #[must_use]
    pub const fn new(user_id: i32, admin_id: Option<i32>) -> Self {
        Self { user_id, admin_id }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    allow_peer_edit: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Policy {
    #[must_use]
    pub const fn new(allow_peer_edit: bool) -> Self {
        Self { allow_peer_edit }
    }

    /// Collection-level check.
    pub fn require(
        &self,
        principal: &Principal,
        permission: Permission,
    ) -> Result<(), AccessDenied> {
        if principal.has_perm(permission) {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }

    /// Principal is the direct admin of the target.
    #[must_use]
    pub fn is_admin_of(principal: &Principal, target: &Ownership) -> bool {
        target.admin_id == Some(principal.id)
    }

    /// Principal and target are sub-users of the same concrete admin. Two
    /// root users are never peers.
    #[must_use]
    pub fn is_peer_of(principal: &Principal, target: &Ownership) -> bool {
        principal.admin_id.is_some() && principal.admin_id == target.admin_id
    }

    fn admin_or_peer(&self, principal: &Principal, target: &Ownership) -> bool {
        Self::is_admin_of(principal, target)
            || (self.allow_peer_edit && Self::is_peer_of(principal, target))
    }

    pub fn can_change_user(
        &self,
        principal: &Principal,
        target: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(self.admin_or_peer(principal, target))
    }

    pub fn can_delete_user(
        &self,
        principal: &Principal,
        target: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(Self::is_admin_of(principal, target))
    }

    /// Only the direct admin may read or replace a user's permission list.
    pub fn can_manage_permissions(
        &self,
        principal: &Principal,
        target: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(Self::is_admin_of(principal, target))
    }

    /// A principal can only hand out capabilities it holds itself.
    pub fn can_grant(
        &self,
        principal: &Principal,
        requested: &CapabilitySet,
    ) -> Result<(), AccessDenied> {
        check(requested.is_subset_of(&principal.capabilities))
    }

    /// `owner` is the user the image belongs to.
    pub fn can_add_image(
        &self,
        principal: &Principal,
        owner: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(self.admin_or_peer(principal, owner))
    }

    pub fn can_change_image(
        &self,
        principal: &Principal,
        owner: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(self.admin_or_peer(principal, owner))
    }

    pub fn can_delete_image(
        &self,
        principal: &Principal,
        owner: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(Self::is_admin_of(principal, owner))
    }

    /// Tickets have no admin override: only the author may touch them.
    pub fn can_change_ticket(
        &self,
        principal: &Principal,
        ticket_user_id: i32,
    ) -> Result<(), AccessDenied> {
        check(principal.id == ticket_user_id)
    }

    pub fn can_delete_ticket(
        &self,
        principal: &Principal,
        ticket_user_id: i32,
    ) -> Result<(), AccessDenied> {
        check(principal.id == ticket_user_id)
    }

    /// Turn customers and coworkers must live in the principal's tenant.
    pub fn can_schedule_for(
        &self,
        principal: &Principal,
        customer: &Ownership,
    ) -> Result<(), AccessDenied> {
        let root = principal.tenant_root();
        check(customer.user_id == root || customer.admin_id == Some(root))
    }

    /// Notifications can be sent to oneself or to users one administers.
    pub fn can_notify(
        &self,
        principal: &Principal,
        recipient: &Ownership,
    ) -> Result<(), AccessDenied> {
        check(recipient.user_id == principal.id || Self::is_admin_of(principal, recipient))
    }
}

const fn check(allowed: bool) -> Result<(), AccessDenied> {
    if allowed { Ok(()) } else { Err(AccessDenied) }
}
