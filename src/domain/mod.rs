//! Domain types shared by the store, the policy layer and the API.
//!
//! The enums here double as `SeaORM` active enums so the database only ever
//! holds one of the listed string values.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::permissions::{CapabilitySet, Ownership, Permission};

/// The authenticated user behind a request, with its grants resolved.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: i32,
    pub username: String,
    pub admin_id: Option<i32>,
    pub is_superuser: bool,
    pub capabilities: CapabilitySet,
}

impl Principal {
    #[must_use]
    pub fn has_perm(&self, permission: Permission) -> bool {
        self.is_superuser || self.capabilities.contains(permission)
    }

    /// Top-level account of the principal's tenant.
    #[must_use]
    pub fn tenant_root(&self) -> i32 {
        self.admin_id.unwrap_or(self.id)
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.admin_id.is_none()
    }

    #[must_use]
    pub const fn ownership(&self) -> Ownership {
        Ownership::new(self.id, self.admin_id)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum Gender {
    #[sea_orm(string_value = "Male")]
    Male,
    #[sea_orm(string_value = "Female")]
    Female,
    #[default]
    #[sea_orm(string_value = "Nothing")]
    Nothing,
}

impl Gender {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Male => "مرد",
            Self::Female => "زن",
            Self::Nothing => "هیچکدام",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
pub enum TicketType {
    #[sea_orm(string_value = "Management")]
    Management,
    #[sea_orm(string_value = "Marketing")]
    Marketing,
    #[sea_orm(string_value = "Support")]
    Support,
    #[sea_orm(string_value = "Complains")]
    Complains,
    #[default]
    #[sea_orm(string_value = "Suggestions")]
    Suggestions,
}

impl TicketType {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Management => "مدیریت",
            Self::Marketing => "فروش و بازاریابی",
            Self::Support => "پشتیبانی",
            Self::Complains => "شکایات",
            Self::Suggestions => "انتقادات و پیشنهادات",
        }
    }
}

/// Ticket lifecycle. Any state may move to any other state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
pub enum TicketStatus {
    #[default]
    #[sea_orm(string_value = "Waiting")]
    Waiting,
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Closed")]
    Closed,
}

impl TicketStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "در انتظار بررسی",
            Self::Pending => "در حال بررسی",
            Self::Closed => "بسته شده",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_status_rejects_unknown_values() {
        let ok: TicketStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert_eq!(ok, TicketStatus::Pending);
        assert!(serde_json::from_str::<TicketStatus>("\"Open\"").is_err());
        assert!(serde_json::from_str::<TicketStatus>("\"waiting\"").is_err());
    }

    #[test]
    fn test_defaults_match_stored_values() {
        assert_eq!(TicketStatus::default().to_value(), "Waiting");
        assert_eq!(TicketType::default().to_value(), "Suggestions");
        assert_eq!(Gender::default().to_value(), "Nothing");
    }

    #[test]
    fn test_tenant_root() {
        let root = Principal {
            id: 1,
            username: "root".into(),
            admin_id: None,
            is_superuser: false,
            capabilities: CapabilitySet::empty(),
        };
        let sub = Principal {
            id: 2,
            username: "sub".into(),
            admin_id: Some(1),
            ..root.clone()
        };
        assert!(root.is_root());
        assert_eq!(root.tenant_root(), 1);
        assert!(!sub.is_root());
        assert_eq!(sub.tenant_root(), 1);
    }
}
