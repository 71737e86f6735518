use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use tokio::task;

use crate::config::SecurityConfig;
use crate::constants::UNUSABLE_PASSWORD_PREFIX;
use crate::domain::{Gender, Principal};
use crate::entities::{
    groups, notification_type_links, notifications, prelude::*, products, request_logs, tickets,
    turns, user_groups, user_images, user_permissions, users,
};

/// Fields accepted when creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    /// Already hashed; `None` stores an unusable password.
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub city_id: Option<i32>,
    pub national_code: Option<String>,
    pub description: Option<String>,
    pub gender: Gender,
    pub credit: i64,
    pub point: i32,
    pub company_name: Option<String>,
    pub remained_sms: i32,
    pub commission: Option<i32>,
    pub admin_id: Option<i32>,
    pub is_superuser: bool,
}

/// Partial update. The outer `Option` is "field present", the inner one
/// (for nullable columns) is the new value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Option<String>>,
    pub mobile: Option<Option<String>>,
    pub birth_date: Option<Option<NaiveDate>>,
    pub city_id: Option<Option<i32>>,
    pub national_code: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub gender: Option<Gender>,
    pub credit: Option<i64>,
    pub point: Option<i32>,
    pub company_name: Option<Option<String>>,
    pub remained_sms: Option<i32>,
    pub commission: Option<Option<i32>>,
    pub admin_id: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

/// Row counts removed by [`UserRepository::delete_cascade`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub users: u64,
    pub images: u64,
    pub tickets: u64,
    pub notifications: u64,
    pub turns: u64,
    pub products: u64,
    pub request_logs: u64,
}

/// Unique columns that already hold a requested value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniqueConflicts {
    pub username: bool,
    pub email: bool,
    pub mobile: bool,
}

impl UniqueConflicts {
    #[must_use]
    pub const fn any(self) -> bool {
        self.username || self.email || self.mobile
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts the user and adds it to `group` in one transaction.
    pub async fn create(&self, user: NewUser, group: Option<&str>) -> Result<users::Model> {
        let txn = self.conn.begin().await?;
        let now = Utc::now();

        let active = users::ActiveModel {
            username: Set(user.username),
            password_hash: Set(user.password_hash.unwrap_or_else(unusable_password)),
            first_name: Set(user.first_name),
            last_name: Set(user.last_name),
            email: Set(user.email),
            mobile: Set(user.mobile),
            birth_date: Set(user.birth_date),
            city_id: Set(user.city_id),
            national_code: Set(user.national_code),
            description: Set(user.description),
            gender: Set(user.gender),
            credit: Set(user.credit),
            point: Set(user.point),
            company_name: Set(user.company_name),
            remained_sms: Set(user.remained_sms),
            admin_id: Set(user.admin_id),
            commission: Set(user.commission),
            is_active: Set(true),
            is_superuser: Set(user.is_superuser),
            last_login: Set(None),
            date_joined: Set(now),
            date_modified: Set(now),
            ..Default::default()
        };
        let model = active
            .insert(&txn)
            .await
            .context("Failed to insert user")?;

        if let Some(group) = group {
            add_to_group(&txn, model.id, group).await?;
        }

        txn.commit().await?;
        Ok(model)
    }

    pub async fn get(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }

    pub async fn count(&self) -> Result<u64> {
        Users::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Users the viewer manages: its own sub-users plus, for a sub-user
    /// viewer, everyone under the same admin. `group` narrows the result to
    /// members of that group.
    pub async fn list_visible(
        &self,
        viewer: &Principal,
        group: Option<&str>,
    ) -> Result<Vec<users::Model>> {
        let mut query = Users::find()
            .filter(visibility(viewer))
            .order_by_asc(users::Column::DateJoined)
            .order_by_asc(users::Column::Id);

        if let Some(group) = group {
            query = query.filter(users::Column::Id.in_subquery(members_of(group)));
        }

        query
            .all(&self.conn)
            .await
            .context("Failed to list visible users")
    }

    pub async fn get_visible(
        &self,
        viewer: &Principal,
        id: i32,
        group: Option<&str>,
    ) -> Result<Option<users::Model>> {
        let mut query = Users::find_by_id(id).filter(visibility(viewer));
        if let Some(group) = group {
            query = query.filter(users::Column::Id.in_subquery(members_of(group)));
        }
        query
            .one(&self.conn)
            .await
            .context("Failed to query visible user")
    }

    pub async fn is_member(&self, user_id: i32, group: &str) -> Result<bool> {
        let count = UserGroups::find()
            .filter(user_groups::Column::UserId.eq(user_id))
            .filter(user_groups::Column::GroupId.in_subquery(group_id_of(group)))
            .count(&self.conn)
            .await
            .context("Failed to check group membership")?;
        Ok(count > 0)
    }

    /// Reports which of the given unique values are taken by a user other
    /// than `exclude`.
    pub async fn find_conflicts(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        mobile: Option<&str>,
        exclude: Option<i32>,
    ) -> Result<UniqueConflicts> {
        let taken = |column: users::Column, value: &str| {
            let mut query = Users::find().filter(column.eq(value));
            if let Some(id) = exclude {
                query = query.filter(users::Column::Id.ne(id));
            }
            query
        };

        let mut conflicts = UniqueConflicts::default();
        if let Some(username) = username {
            conflicts.username = taken(users::Column::Username, username)
                .count(&self.conn)
                .await?
                > 0;
        }
        if let Some(email) = email {
            conflicts.email = taken(users::Column::Email, email).count(&self.conn).await? > 0;
        }
        if let Some(mobile) = mobile {
            conflicts.mobile = taken(users::Column::Mobile, mobile).count(&self.conn).await? > 0;
        }
        Ok(conflicts)
    }

    /// True when making `new_admin` the admin of `user_id` would close a
    /// loop in the admin chain.
    pub async fn would_create_cycle(&self, user_id: i32, new_admin: i32) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut current = Some(new_admin);

        while let Some(id) = current {
            if id == user_id || !visited.insert(id) {
                return Ok(true);
            }
            current = Users::find_by_id(id)
                .select_only()
                .column(users::Column::AdminId)
                .into_tuple::<Option<i32>>()
                .one(&self.conn)
                .await
                .context("Failed to walk admin chain")?
                .flatten();
        }

        Ok(false)
    }

    pub async fn update(&self, id: i32, changes: UserChanges) -> Result<Option<users::Model>> {
        let Some(user) = self.get(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(v) = changes.username {
            active.username = Set(v);
        }
        if let Some(v) = changes.password_hash {
            active.password_hash = Set(v);
        }
        if let Some(v) = changes.first_name {
            active.first_name = Set(v);
        }
        if let Some(v) = changes.last_name {
            active.last_name = Set(v);
        }
        if let Some(v) = changes.email {
            active.email = Set(v);
        }
        if let Some(v) = changes.mobile {
            active.mobile = Set(v);
        }
        if let Some(v) = changes.birth_date {
            active.birth_date = Set(v);
        }
        if let Some(v) = changes.city_id {
            active.city_id = Set(v);
        }
        if let Some(v) = changes.national_code {
            active.national_code = Set(v);
        }
        if let Some(v) = changes.description {
            active.description = Set(v);
        }
        if let Some(v) = changes.gender {
            active.gender = Set(v);
        }
        if let Some(v) = changes.credit {
            active.credit = Set(v);
        }
        if let Some(v) = changes.point {
            active.point = Set(v);
        }
        if let Some(v) = changes.company_name {
            active.company_name = Set(v);
        }
        if let Some(v) = changes.remained_sms {
            active.remained_sms = Set(v);
        }
        if let Some(v) = changes.commission {
            active.commission = Set(v);
        }
        if let Some(v) = changes.admin_id {
            active.admin_id = Set(v);
        }
        if let Some(v) = changes.is_active {
            active.is_active = Set(v);
        }
        active.date_modified = Set(Utc::now());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user")?;
        Ok(Some(model))
    }

    pub async fn touch_last_login(&self, id: i32) -> Result<()> {
        users::ActiveModel {
            id: Set(id),
            last_login: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&self.conn)
        .await
        .context("Failed to record last login")?;
        Ok(())
    }

    /// Deletes the user, its whole sub-user subtree and every row owned by
    /// any of them, in one transaction. Returns `None` if the user does not
    /// exist.
    pub async fn delete_cascade(&self, id: i32) -> Result<Option<DeletionSummary>> {
        let txn = self.conn.begin().await?;

        if Users::find_by_id(id).one(&txn).await?.is_none() {
            return Ok(None);
        }

        let levels = subtree_levels(&txn, id).await?;
        let ids: Vec<i32> = levels.iter().flatten().copied().collect();
        let mut summary = DeletionSummary::default();

        let owned_products = Query::select()
            .column(products::Column::Id)
            .from(Products)
            .and_where(products::Column::UserId.is_in(ids.clone()))
            .to_owned();

        summary.turns = Turns::delete_many()
            .filter(
                Condition::any()
                    .add(turns::Column::UserId.is_in(ids.clone()))
                    .add(turns::Column::CoworkerId.is_in(ids.clone()))
                    .add(turns::Column::ProductId.in_subquery(owned_products)),
            )
            .exec(&txn)
            .await?
            .rows_affected;

        summary.products = Products::delete_many()
            .filter(products::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        summary.images = UserImages::delete_many()
            .filter(user_images::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        summary.tickets = Tickets::delete_many()
            .filter(tickets::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        let owned_notifications = Query::select()
            .column(notifications::Column::Id)
            .from(Notifications)
            .and_where(notifications::Column::UserId.is_in(ids.clone()))
            .to_owned();
        NotificationTypeLinks::delete_many()
            .filter(notification_type_links::Column::NotificationId.in_subquery(owned_notifications))
            .exec(&txn)
            .await?;
        summary.notifications = Notifications::delete_many()
            .filter(notifications::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        summary.request_logs = RequestLogs::delete_many()
            .filter(request_logs::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        UserGroups::delete_many()
            .filter(user_groups::Column::UserId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        UserPermissions::delete_many()
            .filter(user_permissions::Column::UserId.is_in(ids))
            .exec(&txn)
            .await?;

        // Leaves first so no row is removed by the FK cascade behind our back.
        for level in levels.into_iter().rev() {
            summary.users += Users::delete_many()
                .filter(users::Column::Id.is_in(level))
                .exec(&txn)
                .await?
                .rows_affected;
        }

        txn.commit().await?;
        Ok(Some(summary))
    }
}

/// Breadth-first walk of the sub-user tree rooted at `root`, one vector per
/// depth. The visited set guards against corrupt data with a loop.
async fn subtree_levels<C: ConnectionTrait>(conn: &C, root: i32) -> Result<Vec<Vec<i32>>> {
    let mut visited = HashSet::from([root]);
    let mut levels = vec![vec![root]];

    loop {
        let Some(frontier) = levels.last().cloned() else {
            break;
        };
        let children: Vec<i32> = Users::find()
            .select_only()
            .column(users::Column::Id)
            .filter(users::Column::AdminId.is_in(frontier))
            .into_tuple::<i32>()
            .all(conn)
            .await
            .context("Failed to load sub-users")?
            .into_iter()
            .filter(|id| visited.insert(*id))
            .collect();

        if children.is_empty() {
            break;
        }
        levels.push(children);
    }

    Ok(levels)
}

fn visibility(viewer: &Principal) -> Condition {
    let mut condition = Condition::any().add(users::Column::AdminId.eq(viewer.id));
    if let Some(admin_id) = viewer.admin_id {
        condition = condition.add(users::Column::AdminId.eq(admin_id));
    }
    condition
}

fn group_id_of(group: &str) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(groups::Column::Id)
        .from(Groups)
        .and_where(groups::Column::Name.eq(group))
        .to_owned()
}

fn members_of(group: &str) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(user_groups::Column::UserId)
        .from(UserGroups)
        .and_where(user_groups::Column::GroupId.in_subquery(group_id_of(group)))
        .to_owned()
}

async fn add_to_group<C: ConnectionTrait>(conn: &C, user_id: i32, group: &str) -> Result<()> {
    let group_id = Groups::find()
        .filter(groups::Column::Name.eq(group))
        .one(conn)
        .await?
        .map(|g| g.id)
        .ok_or_else(|| anyhow::anyhow!("Group not found: {group}"))?;

    user_groups::ActiveModel {
        user_id: Set(user_id),
        group_id: Set(group_id),
    }
    .insert(conn)
    .await
    .with_context(|| format!("Failed to add user {user_id} to group {group}"))?;

    Ok(())
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Hashes on the blocking pool; Argon2 would otherwise stall the runtime.
pub async fn hash_password_async(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();
    task::spawn_blocking(move || hash_password(&password, Some(&config)))
        .await
        .context("Password hashing task panicked")?
}

/// Checks `password` against a stored hash. Unusable hashes never match.
pub async fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    if password_hash.starts_with(UNUSABLE_PASSWORD_PREFIX) {
        return Ok(false);
    }

    let password_hash = password_hash.to_string();
    let password = password.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// Random marker that can never be produced by the hasher.
#[must_use]
pub fn unusable_password() -> String {
    format!("{UNUSABLE_PASSWORD_PREFIX}{}", random_hex(20))
}

#[must_use]
pub fn random_hex(len_bytes: usize) -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..len_bytes).fold(String::with_capacity(len_bytes * 2), |mut acc, _| {
        use std::fmt::Write;
        let b: u8 = rng.random();
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let config = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        };
        let hash = hash_password_async("s3cret", &config).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "s3cret").await.unwrap());
        assert!(!verify_password(&hash, "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn test_unusable_password_never_verifies() {
        let marker = unusable_password();
        assert!(marker.starts_with(UNUSABLE_PASSWORD_PREFIX));
        assert_eq!(marker.len(), 41);
        assert!(!verify_password(&marker, "").await.unwrap());
        assert!(!verify_password(&marker, &marker).await.unwrap());
    }
}
