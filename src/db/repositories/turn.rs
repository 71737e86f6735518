use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{prelude::*, turns, users};

#[derive(Debug, Clone)]
pub struct NewTurn {
    pub user_id: i32,
    pub coworker_id: Option<i32>,
    pub product_id: Option<i32>,
    pub date_visit: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnChanges {
    pub user_id: Option<i32>,
    pub coworker_id: Option<Option<i32>>,
    pub product_id: Option<Option<i32>>,
    pub date_visit: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
}

pub struct TurnRepository {
    conn: DatabaseConnection,
}

impl TurnRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, turn: NewTurn) -> Result<turns::Model> {
        let now = Utc::now();
        turns::ActiveModel {
            coworker_id: Set(turn.coworker_id),
            product_id: Set(turn.product_id),
            user_id: Set(turn.user_id),
            date_visit: Set(turn.date_visit),
            description: Set(turn.description),
            date_created: Set(now),
            date_modified: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert turn")
    }

    /// Turns whose customer is the tenant root or one of its direct
    /// sub-users.
    pub async fn list_for_tenant(&self, root: i32) -> Result<Vec<turns::Model>> {
        Turns::find()
            .filter(in_tenant(root))
            .order_by_asc(turns::Column::DateCreated)
            .order_by_asc(turns::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list turns")
    }

    pub async fn get_for_tenant(&self, root: i32, id: i32) -> Result<Option<turns::Model>> {
        Turns::find_by_id(id)
            .filter(in_tenant(root))
            .one(&self.conn)
            .await
            .context("Failed to query turn")
    }

    pub async fn get(&self, id: i32) -> Result<Option<turns::Model>> {
        Turns::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query turn")
    }

    pub async fn update(&self, turn: turns::Model, changes: TurnChanges) -> Result<turns::Model> {
        let mut active: turns::ActiveModel = turn.into();
        if let Some(v) = changes.user_id {
            active.user_id = Set(v);
        }
        if let Some(v) = changes.coworker_id {
            active.coworker_id = Set(v);
        }
        if let Some(v) = changes.product_id {
            active.product_id = Set(v);
        }
        if let Some(v) = changes.date_visit {
            active.date_visit = Set(v);
        }
        if let Some(v) = changes.description {
            active.description = Set(v);
        }
        active.date_modified = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to update turn")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Turns::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete turn")?;
        Ok(result.rows_affected > 0)
    }
}

fn tenant_members(root: i32) -> SelectStatement {
    Query::select()
        .column(users::Column::Id)
        .from(Users)
        .and_where(users::Column::AdminId.eq(root))
        .to_owned()
}

fn in_tenant(root: i32) -> Condition {
    Condition::any()
        .add(turns::Column::UserId.eq(root))
        .add(turns::Column::UserId.in_subquery(tenant_members(root)))
}
