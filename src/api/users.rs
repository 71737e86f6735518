//! Users, employees and coworkers.
//!
//! The three collections share one set of handlers, parameterised by a
//! [`UserKind`] marker: employees and coworkers are users in the matching
//! role group, and new accounts join the kind's group on creation.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::types::double_option;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, FieldErrors, Payload, UserDto};
use crate::constants::groups;
use crate::constants::limits::{
    COMMISSION_MAX, COMPANY_NAME_MAX, NAME_MAX, NATIONAL_CODE_MAX, USER_DESCRIPTION_MAX,
    USERNAME_MAX,
};
use crate::db::repositories::user::hash_password_async;
use crate::db::{NewUser, UserChanges};
use crate::domain::{Gender, Principal};
use crate::entities::users;
use crate::permissions::{Ownership, Permission, Resource};

const MIN_PASSWORD_LEN: usize = 8;

pub trait UserKind: Send + Sync + 'static {
    /// Role group the collection is restricted to; `None` covers every
    /// managed user.
    const GROUP: Option<&'static str>;

    /// Role group new accounts are added to.
    const CREATE_GROUP: &'static str;

    const LABEL: &'static str;
}

pub struct AllUsers;

impl UserKind for AllUsers {
    const GROUP: Option<&'static str> = None;
    const CREATE_GROUP: &'static str = groups::END_USER;
    const LABEL: &'static str = "User";
}

pub struct Employees;

impl UserKind for Employees {
    const GROUP: Option<&'static str> = Some(groups::EMPLOYEE);
    const CREATE_GROUP: &'static str = groups::EMPLOYEE;
    const LABEL: &'static str = "Employee";
}

pub struct Coworkers;

impl UserKind for Coworkers {
    const GROUP: Option<&'static str> = Some(groups::COWORKER);
    const CREATE_GROUP: &'static str = groups::COWORKER;
    const LABEL: &'static str = "Coworker";
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub city: Option<i32>,
    pub national_code: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub credit: i64,
    #[serde(default)]
    pub point: i32,
    pub company_name: Option<String>,
    #[serde(default)]
    pub remained_sms: i32,
    pub commission: Option<i32>,
}

/// Partial update body. Absent fields are left alone; `null` clears a
/// nullable field.
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdateRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub mobile: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub city: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub national_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub gender: Option<Gender>,
    pub credit: Option<i64>,
    pub point: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub company_name: Option<Option<String>>,
    pub remained_sms: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub commission: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub admin: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

/// Values that go through the same rules on create and update.
#[derive(Default)]
struct FieldSet<'a> {
    username: Option<&'a str>,
    password: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    email: Option<&'a str>,
    mobile: Option<&'a str>,
    national_code: Option<&'a str>,
    description: Option<&'a str>,
    company_name: Option<&'a str>,
    point: Option<i32>,
    remained_sms: Option<i32>,
    commission: Option<i32>,
}

impl FieldSet<'_> {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if let Some(username) = self.username {
            errors.username(username, USERNAME_MAX);
        }
        if let Some(password) = self.password
            && password.chars().count() < MIN_PASSWORD_LEN
        {
            errors.add(
                "password",
                format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
            );
        }
        if let Some(v) = self.first_name {
            errors.max_len("first_name", v, NAME_MAX);
        }
        if let Some(v) = self.last_name {
            errors.max_len("last_name", v, NAME_MAX);
        }
        if let Some(v) = self.email {
            errors.email(v);
        }
        if let Some(v) = self.mobile {
            errors.mobile(v);
        }
        if let Some(v) = self.national_code {
            errors.max_len("national_code", v, NATIONAL_CODE_MAX);
            if !v.chars().all(|c| c.is_ascii_digit()) {
                errors.add("national_code", "National code may only contain digits.");
            }
        }
        if let Some(v) = self.description {
            errors.max_len("description", v, USER_DESCRIPTION_MAX);
        }
        if let Some(v) = self.company_name {
            errors.max_len("company_name", v, COMPANY_NAME_MAX);
        }
        if let Some(v) = self.point {
            errors.range("point", i64::from(v), 0, i64::from(i32::MAX));
        }
        if let Some(v) = self.remained_sms {
            errors.range("remained_sms", i64::from(v), 0, i64::from(i32::MAX));
        }
        if let Some(v) = self.commission {
            errors.range("commission", i64::from(v), 0, i64::from(COMMISSION_MAX));
        }

        errors
    }
}

/// Trims and maps blank strings to `None`.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_nullable(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(clean)
}

pub(super) fn invalid_pk(id: i32) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

const fn ownership_of(user: &users::Model) -> Ownership {
    Ownership::new(user.id, user.admin_id)
}

/// Uniqueness and foreign-key checks that need the database.
async fn check_references(
    state: &AppState,
    errors: &mut FieldErrors,
    fields: &FieldSet<'_>,
    city: Option<i32>,
    exclude: Option<i32>,
) -> Result<(), ApiError> {
    let conflicts = state
        .store()
        .user_repo()
        .find_conflicts(
            fields.username.filter(|_| !errors.contains("username")),
            fields.email.filter(|_| !errors.contains("email")),
            fields.mobile.filter(|_| !errors.contains("mobile")),
            exclude,
        )
        .await?;

    if conflicts.username {
        errors.add("username", "A user with that username already exists.");
    }
    if conflicts.email {
        errors.add("email", "A user with that email already exists.");
    }
    if conflicts.mobile {
        errors.add("mobile", "A user with that mobile already exists.");
    }

    if let Some(city) = city
        && !state.store().location_repo().city_exists(city).await?
    {
        errors.add("city", invalid_pk(city));
    }

    Ok(())
}

/// Validates the profile fields of an update and turns them into store
/// changes. Admin and active flag are left to the caller.
pub(super) async fn prepare_changes(
    state: &AppState,
    user_id: i32,
    req: UserUpdateRequest,
) -> Result<UserChanges, ApiError> {
    let username = req.username.map(|v| v.trim().to_string());
    let email = clean_nullable(req.email);
    let mobile = clean_nullable(req.mobile);
    let national_code = clean_nullable(req.national_code);
    let description = clean_nullable(req.description);
    let company_name = clean_nullable(req.company_name);

    let fields = FieldSet {
        username: username.as_deref(),
        password: req.password.as_deref(),
        first_name: req.first_name.as_deref(),
        last_name: req.last_name.as_deref(),
        email: email.as_ref().and_then(Option::as_deref),
        mobile: mobile.as_ref().and_then(Option::as_deref),
        national_code: national_code.as_ref().and_then(Option::as_deref),
        description: description.as_ref().and_then(Option::as_deref),
        company_name: company_name.as_ref().and_then(Option::as_deref),
        point: req.point,
        remained_sms: req.remained_sms,
        commission: req.commission.flatten(),
    };

    let mut errors = fields.validate();
    check_references(state, &mut errors, &fields, req.city.flatten(), Some(user_id)).await?;
    errors.into_result()?;

    let password_hash = match req.password {
        Some(password) => Some(hash_password_async(&password, &state.config().security).await?),
        None => None,
    };

    Ok(UserChanges {
        username,
        password_hash,
        first_name: req.first_name,
        last_name: req.last_name,
        email,
        mobile,
        birth_date: req.birth_date,
        city_id: req.city,
        national_code,
        description,
        gender: req.gender,
        credit: req.credit,
        point: req.point,
        company_name,
        remained_sms: req.remained_sms,
        commission: req.commission,
        admin_id: None,
        is_active: None,
    })
}

/// Target of an item write: looked up globally so that a user outside the
/// principal's reach yields 403 rather than 404.
async fn load_target<K: UserKind>(state: &AppState, id: i32) -> Result<users::Model, ApiError> {
    let repo = state.store().user_repo();
    let user = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(K::LABEL, id))?;

    if let Some(group) = K::GROUP
        && !repo.is_member(id, group).await?
    {
        return Err(ApiError::not_found(K::LABEL, id));
    }
    Ok(user)
}

/// GET /users/, /employees/, /coworkers/
pub async fn list<K: UserKind>(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::User))?;

    let users = state
        .store()
        .user_repo()
        .list_visible(&principal, K::GROUP)
        .await?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

/// POST /users/, /employees/, /coworkers/
///
/// The new account is placed under the requesting user.
pub async fn create<K: UserKind>(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Payload(req): Payload<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserDto>>), ApiError> {
    state
        .policy()
        .require(&principal, Permission::add(Resource::User))?;

    let username = req.username.trim().to_string();
    let email = clean(req.email);
    let mobile = clean(req.mobile);
    let national_code = clean(req.national_code);
    let description = clean(req.description);
    let company_name = clean(req.company_name);

    let fields = FieldSet {
        username: Some(username.as_str()),
        password: req.password.as_deref(),
        first_name: Some(req.first_name.as_str()),
        last_name: Some(req.last_name.as_str()),
        email: email.as_deref(),
        mobile: mobile.as_deref(),
        national_code: national_code.as_deref(),
        description: description.as_deref(),
        company_name: company_name.as_deref(),
        point: Some(req.point),
        remained_sms: Some(req.remained_sms),
        commission: req.commission,
    };

    let mut errors = fields.validate();
    check_references(&state, &mut errors, &fields, req.city, None).await?;
    errors.into_result()?;

    let password_hash = match req.password.as_deref() {
        Some(password) => Some(hash_password_async(password, &state.config().security).await?),
        None => None,
    };

    let user = state
        .store()
        .user_repo()
        .create(
            NewUser {
                username,
                password_hash,
                first_name: req.first_name,
                last_name: req.last_name,
                email,
                mobile,
                birth_date: req.birth_date,
                city_id: req.city,
                national_code,
                description,
                gender: req.gender,
                credit: req.credit,
                point: req.point,
                company_name,
                remained_sms: req.remained_sms,
                commission: req.commission,
                admin_id: Some(principal.id),
                is_superuser: false,
            },
            Some(K::CREATE_GROUP),
        )
        .await?;

    tracing::info!(
        user_id = user.id,
        admin_id = principal.id,
        group = K::CREATE_GROUP,
        "Created user"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user.into()))))
}

/// GET /users/{id}/
pub async fn retrieve<K: UserKind>(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::User))?;

    let user = state
        .store()
        .user_repo()
        .get_visible(&principal, id, K::GROUP)
        .await?
        .ok_or_else(|| ApiError::not_found(K::LABEL, id))?;

    Ok(Json(ApiResponse::success(user.into())))
}

/// PATCH and PUT /users/{id}/
pub async fn update<K: UserKind>(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
    Payload(mut req): Payload<UserUpdateRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::change(Resource::User))?;

    let target = load_target::<K>(&state, id).await?;
    let ownership = ownership_of(&target);
    state.policy().can_change_user(&principal, &ownership)?;

    let admin = req.admin.take();
    let is_active = req.is_active.take();
    if admin.is_some() {
        state.policy().can_manage_permissions(&principal, &ownership)?;
    }
    if let Some(new_admin) = admin {
        check_new_admin(&state, &principal, id, new_admin).await?;
    }

    let mut changes = prepare_changes(&state, id, req).await?;
    changes.admin_id = admin;
    changes.is_active = is_active;

    let user = state
        .store()
        .user_repo()
        .update(id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(K::LABEL, id))?;

    Ok(Json(ApiResponse::success(user.into())))
}

/// Re-parenting rules: only a superuser may make a user a root, and the new
/// admin must be reachable and outside the user's own subtree.
async fn check_new_admin(
    state: &AppState,
    principal: &Principal,
    user_id: i32,
    new_admin: Option<i32>,
) -> Result<(), ApiError> {
    let Some(admin_id) = new_admin else {
        if principal.is_superuser {
            return Ok(());
        }
        return Err(ApiError::Forbidden(
            "Only a superuser can detach a user from its admin".to_string(),
        ));
    };

    let repo = state.store().user_repo();
    let reachable = admin_id == principal.id
        || repo
            .get_visible(principal, admin_id, None)
            .await?
            .is_some()
        || (principal.is_superuser && repo.get(admin_id).await?.is_some());
    if !reachable {
        return Err(FieldErrors::single("admin", invalid_pk(admin_id)).into());
    }

    if admin_id == user_id || repo.would_create_cycle(user_id, admin_id).await? {
        return Err(FieldErrors::single(
            "admin",
            "A user cannot be placed under itself or one of its sub-users.",
        )
        .into());
    }
    Ok(())
}

/// DELETE /users/{id}/
///
/// Removes the user together with its sub-user subtree and everything they
/// own.
pub async fn destroy<K: UserKind>(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::delete(Resource::User))?;

    let target = load_target::<K>(&state, id).await?;
    state
        .policy()
        .can_delete_user(&principal, &ownership_of(&target))?;

    let summary = state
        .store()
        .user_repo()
        .delete_cascade(id)
        .await?
        .ok_or_else(|| ApiError::not_found(K::LABEL, id))?;

    tracing::info!(
        user_id = id,
        deleted_by = principal.id,
        users = summary.users,
        images = summary.images,
        tickets = summary.tickets,
        notifications = summary.notifications,
        turns = summary.turns,
        "Deleted user subtree"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_maps_blank_to_none() {
        assert_eq!(clean(Some("  ".to_string())), None);
        assert_eq!(clean(Some(" a@b.co ".to_string())), Some("a@b.co".to_string()));
        assert_eq!(clean_nullable(Some(Some(String::new()))), Some(None));
        assert_eq!(clean_nullable(None), None);
    }

    #[test]
    fn test_field_set_rules() {
        let fields = FieldSet {
            username: Some("ok_name"),
            password: Some("short"),
            national_code: Some("12a"),
            commission: Some(150),
            point: Some(-1),
            ..FieldSet::default()
        };
        let errors = fields.validate();
        assert!(!errors.contains("username"));
        assert!(errors.contains("password"));
        assert!(errors.contains("national_code"));
        assert!(errors.contains("commission"));
        assert!(errors.contains("point"));
    }

    #[test]
    fn test_update_request_distinguishes_null() {
        let req: UserUpdateRequest =
            serde_json::from_str(r#"{"email": null, "first_name": "Ali"}"#).unwrap();
        assert_eq!(req.email, Some(None));
        assert_eq!(req.mobile, None);
        assert_eq!(req.first_name.as_deref(), Some("Ali"));
    }
}
