//! Permission catalogue and capability sets.
//!
//! Permissions are a fixed `(resource, action)` grid. Each one has a stable
//! numeric id (used by the permission-list endpoints and stored in the
//! `group_permissions` / `user_permissions` tables) and a codename such as
//! `view_user`. A principal's grants are folded into a [`CapabilitySet`] once
//! per request and every check afterwards is a bit test.

pub mod policy;

pub use policy::{AccessDenied, Ownership, Policy};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    User,
    UserImage,
    Notification,
    NotificationType,
    Turn,
    Ticket,
}

impl Resource {
    pub const ALL: [Self; 6] = [
        Self::User,
        Self::UserImage,
        Self::Notification,
        Self::NotificationType,
        Self::Turn,
        Self::Ticket,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::UserImage => "userimage",
            Self::Notification => "notification",
            Self::NotificationType => "notificationtype",
            Self::Turn => "turn",
            Self::Ticket => "ticket",
        }
    }

    const fn index(self) -> u8 {
        match self {
            Self::User => 0,
            Self::UserImage => 1,
            Self::Notification => 2,
            Self::NotificationType => 3,
            Self::Turn => 4,
            Self::Ticket => 5,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    pub const ALL: [Self; 4] = [Self::View, Self::Add, Self::Change, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Add => "add",
            Self::Change => "change",
            Self::Delete => "delete",
        }
    }

    const fn index(self) -> u8 {
        match self {
            Self::View => 0,
            Self::Add => 1,
            Self::Change => 2,
            Self::Delete => 3,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub const COUNT: usize = Resource::ALL.len() * Action::ALL.len();

    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }

    #[must_use]
    pub const fn view(resource: Resource) -> Self {
        Self::new(resource, Action::View)
    }

    #[must_use]
    pub const fn add(resource: Resource) -> Self {
        Self::new(resource, Action::Add)
    }

    #[must_use]
    pub const fn change(resource: Resource) -> Self {
        Self::new(resource, Action::Change)
    }

    #[must_use]
    pub const fn delete(resource: Resource) -> Self {
        Self::new(resource, Action::Delete)
    }

    /// Every permission in id order.
    pub fn all() -> impl Iterator<Item = Self> {
        Resource::ALL
            .into_iter()
            .flat_map(|r| Action::ALL.into_iter().map(move |a| Self::new(r, a)))
    }

    /// Stable 1-based id; never reorder `Resource::ALL` or `Action::ALL`.
    #[must_use]
    pub const fn id(self) -> i32 {
        (self.resource.index() * 4 + self.action.index()) as i32 + 1
    }

    #[must_use]
    pub fn from_id(id: i32) -> Option<Self> {
        if id < 1 {
            return None;
        }
        let idx = usize::try_from(id - 1).ok()?;
        let resource = *Resource::ALL.get(idx / Action::ALL.len())?;
        let action = *Action::ALL.get(idx % Action::ALL.len())?;
        Some(Self::new(resource, action))
    }

    #[must_use]
    pub fn codename(self) -> String {
        format!("{}_{}", self.action.as_str(), self.resource.as_str())
    }

    #[must_use]
    pub fn parse_codename(codename: &str) -> Option<Self> {
        let codename = codename.strip_prefix("users.").unwrap_or(codename);
        let (action, resource) = codename.split_once('_')?;
        Some(Self::new(Resource::parse(resource)?, Action::parse(action)?))
    }

    #[must_use]
    pub fn display_name(self) -> String {
        format!("Can {} {}", self.action.as_str(), self.resource.as_str())
    }

    const fn bit(self) -> u32 {
        1 << (self.id() - 1)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action.as_str(), self.resource.as_str())
    }
}

/// Set of permissions held by a principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn all() -> Self {
        Permission::all().collect()
    }

    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = i32>) -> Self {
        ids.into_iter().filter_map(Permission::from_id).collect()
    }

    pub const fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    pub const fn remove(&mut self, permission: Permission) {
        self.0 &= !permission.bit();
    }

    #[must_use]
    pub const fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    #[must_use]
    pub const fn is_subset_of(&self, other: &Self) -> bool {
        self.0 & !other.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::all().filter(|p| self.contains(*p))
    }

    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.iter().map(Permission::id)
    }
}

impl FromIterator<Permission> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_reversible() {
        let ids: Vec<i32> = Permission::all().map(Permission::id).collect();
        assert_eq!(ids.len(), Permission::COUNT);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&24));

        for permission in Permission::all() {
            assert_eq!(Permission::from_id(permission.id()), Some(permission));
        }
        assert_eq!(Permission::from_id(0), None);
        assert_eq!(Permission::from_id(25), None);
    }

    #[test]
    fn test_codenames() {
        assert_eq!(Permission::view(Resource::User).codename(), "view_user");
        assert_eq!(
            Permission::delete(Resource::UserImage).codename(),
            "delete_userimage"
        );
        assert_eq!(
            Permission::parse_codename("add_turn"),
            Some(Permission::add(Resource::Turn))
        );
        assert_eq!(
            Permission::parse_codename("users.change_ticket"),
            Some(Permission::change(Resource::Ticket))
        );
        assert_eq!(
            Permission::parse_codename("add_notificationtype"),
            Some(Permission::add(Resource::NotificationType))
        );
        assert_eq!(Permission::parse_codename("fly_user"), None);
        assert_eq!(Permission::parse_codename("view"), None);
    }

    #[test]
    fn test_capability_set_operations() {
        let mut caps = CapabilitySet::empty();
        assert!(caps.is_empty());

        caps.insert(Permission::view(Resource::Turn));
        caps.insert(Permission::add(Resource::Turn));
        assert!(caps.contains(Permission::view(Resource::Turn)));
        assert!(!caps.contains(Permission::delete(Resource::Turn)));

        caps.remove(Permission::add(Resource::Turn));
        assert!(!caps.contains(Permission::add(Resource::Turn)));

        assert!(caps.is_subset_of(&CapabilitySet::all()));
        assert!(!CapabilitySet::all().is_subset_of(&caps));
        assert_eq!(CapabilitySet::all().iter().count(), Permission::COUNT);

        let from_ids = CapabilitySet::from_ids([1, 2, 99]);
        assert_eq!(from_ids.ids().collect::<Vec<_>>(), vec![1, 2]);
    }
}
