use serde::{Deserialize, Deserializer, Serialize};

use super::validation::FieldErrors;
use crate::calendar::DisplayDateTime;
use crate::constants::media::URL_PREFIX;
use crate::db::repositories::notification::NotificationRow;
use crate::entities::{
    cities, countries, notification_types, provinces, tickets, turns, user_images, users,
};
use crate::permissions::Permission;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fields: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            fields: None,
        }
    }

    pub fn field_errors(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            fields: Some(fields),
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies. Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<String>,
    pub city: Option<i32>,
    pub national_code: Option<String>,
    pub description: Option<String>,
    pub gender: crate::domain::Gender,
    pub gender_display: &'static str,
    pub credit: i64,
    pub point: i32,
    pub company_name: Option<String>,
    pub remained_sms: i32,
    pub admin: Option<i32>,
    pub commission: Option<i32>,
    pub is_active: bool,
    pub last_login: Option<DisplayDateTime>,
    pub create_date_time: DisplayDateTime,
    pub modify_date_time: DisplayDateTime,
}

impl From<users::Model> for UserDto {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            mobile: user.mobile,
            birth_date: user.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            city: user.city_id,
            national_code: user.national_code,
            description: user.description,
            gender: user.gender,
            gender_display: user.gender.label(),
            credit: user.credit,
            point: user.point,
            company_name: user.company_name,
            remained_sms: user.remained_sms,
            admin: user.admin_id,
            commission: user.commission,
            is_active: user.is_active,
            last_login: user.last_login.as_ref().map(DisplayDateTime::from_utc),
            create_date_time: DisplayDateTime::from_utc(&user.date_joined),
            modify_date_time: DisplayDateTime::from_utc(&user.date_modified),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserImageDto {
    pub id: i32,
    pub path: String,
    pub url: String,
    pub user: i32,
    pub create_date_time: DisplayDateTime,
    pub modify_date_time: DisplayDateTime,
}

impl From<user_images::Model> for UserImageDto {
    fn from(image: user_images::Model) -> Self {
        Self {
            id: image.id,
            url: format!("{URL_PREFIX}/{}", image.path),
            path: image.path,
            user: image.user_id,
            create_date_time: DisplayDateTime::from_utc(&image.date_created),
            modify_date_time: DisplayDateTime::from_utc(&image.date_modified),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketDto {
    pub id: i32,
    pub message_type: crate::domain::TicketType,
    pub message_type_display: &'static str,
    pub subject: String,
    pub user: i32,
    pub status: crate::domain::TicketStatus,
    pub status_display: &'static str,
    pub text: String,
    pub create_date_time: DisplayDateTime,
    pub modify_date_time: DisplayDateTime,
}

impl From<tickets::Model> for TicketDto {
    fn from(ticket: tickets::Model) -> Self {
        Self {
            id: ticket.id,
            message_type: ticket.message_type,
            message_type_display: ticket.message_type.label(),
            subject: ticket.subject,
            user: ticket.user_id,
            status: ticket.status,
            status_display: ticket.status.label(),
            text: ticket.text,
            create_date_time: DisplayDateTime::from_utc(&ticket.date_created),
            modify_date_time: DisplayDateTime::from_utc(&ticket.date_modified),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnDto {
    pub id: i32,
    pub coworker: Option<i32>,
    pub product: Option<i32>,
    pub user: i32,
    pub date_visit: String,
    pub description: Option<String>,
    pub visit_date_time: DisplayDateTime,
    pub create_date_time: DisplayDateTime,
    pub modify_date_time: DisplayDateTime,
}

impl From<turns::Model> for TurnDto {
    fn from(turn: turns::Model) -> Self {
        Self {
            id: turn.id,
            coworker: turn.coworker_id,
            product: turn.product_id,
            user: turn.user_id,
            date_visit: turn.date_visit.to_rfc3339(),
            description: turn.description,
            visit_date_time: DisplayDateTime::from_utc(&turn.date_visit),
            create_date_time: DisplayDateTime::from_utc(&turn.date_created),
            modify_date_time: DisplayDateTime::from_utc(&turn.date_modified),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationDto {
    pub id: i32,
    pub user: i32,
    pub is_news: bool,
    pub text: String,
    pub types: Vec<String>,
    pub create_date_time: DisplayDateTime,
    pub modify_date_time: DisplayDateTime,
}

impl From<NotificationRow> for NotificationDto {
    fn from(row: NotificationRow) -> Self {
        let n = row.notification;
        Self {
            id: n.id,
            user: n.user_id,
            is_news: n.is_news,
            text: n.text,
            types: row.types,
            create_date_time: DisplayDateTime::from_utc(&n.date_created),
            modify_date_time: DisplayDateTime::from_utc(&n.date_modified),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationTypeDto {
    pub id: i32,
    pub name: String,
    pub notifications: usize,
    pub create_date_time: DisplayDateTime,
}

impl From<(notification_types::Model, usize)> for NotificationTypeDto {
    fn from((kind, notifications): (notification_types::Model, usize)) -> Self {
        Self {
            id: kind.id,
            name: kind.name,
            notifications,
            create_date_time: DisplayDateTime::from_utc(&kind.date_created),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionDto {
    pub id: i32,
    pub codename: String,
    pub name: String,
}

impl From<Permission> for PermissionDto {
    fn from(permission: Permission) -> Self {
        Self {
            id: permission.id(),
            codename: permission.codename(),
            name: permission.display_name(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPermissionsDto {
    pub user: i32,
    /// Granted directly to the user
    pub permissions: Vec<PermissionDto>,
    pub groups: Vec<String>,
    /// Direct plus group grants
    pub effective: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CountryDto {
    pub id: i32,
    pub name: String,
    pub phone_code: String,
}

impl From<countries::Model> for CountryDto {
    fn from(c: countries::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            phone_code: c.phone_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvinceDto {
    pub id: i32,
    pub name: String,
    pub country: i32,
}

impl From<provinces::Model> for ProvinceDto {
    fn from(p: provinces::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            country: p.country_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CityDto {
    pub id: i32,
    pub name: String,
    pub province: i32,
}

impl From<cities::Model> for CityDto {
    fn from(c: cities::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            province: c.province_id,
        }
    }
}
