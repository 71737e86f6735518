use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::Principal;
use crate::entities::{prelude::*, user_images, users};
use crate::permissions::Ownership;

pub struct ImageRepository {
    conn: DatabaseConnection,
}

impl ImageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, user_id: i32, path: &str) -> Result<user_images::Model> {
        let now = Utc::now();
        user_images::ActiveModel {
            path: Set(path.to_string()),
            user_id: Set(user_id),
            date_created: Set(now),
            date_modified: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user image")
    }

    /// Images owned by the viewer or by any user it manages.
    pub async fn list_visible(&self, viewer: &Principal) -> Result<Vec<user_images::Model>> {
        UserImages::find()
            .filter(visibility(viewer))
            .order_by_asc(user_images::Column::DateCreated)
            .order_by_asc(user_images::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list user images")
    }

    pub async fn get_visible(
        &self,
        viewer: &Principal,
        id: i32,
    ) -> Result<Option<user_images::Model>> {
        UserImages::find_by_id(id)
            .filter(visibility(viewer))
            .one(&self.conn)
            .await
            .context("Failed to query user image")
    }

    /// Image together with the ownership chain of the user it belongs to.
    pub async fn get_with_owner(
        &self,
        id: i32,
    ) -> Result<Option<(user_images::Model, Ownership)>> {
        let row = UserImages::find_by_id(id)
            .find_also_related(Users)
            .one(&self.conn)
            .await
            .context("Failed to query user image owner")?;

        Ok(row.and_then(|(image, owner)| {
            owner.map(|owner| (image, Ownership::new(owner.id, owner.admin_id)))
        }))
    }

    pub async fn update(
        &self,
        image: user_images::Model,
        user_id: Option<i32>,
        path: Option<String>,
    ) -> Result<user_images::Model> {
        let mut active: user_images::ActiveModel = image.into();
        if let Some(user_id) = user_id {
            active.user_id = Set(user_id);
        }
        if let Some(path) = path {
            active.path = Set(path);
        }
        active.date_modified = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to update user image")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = UserImages::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete user image")?;
        Ok(result.rows_affected > 0)
    }
}

fn visibility(viewer: &Principal) -> Condition {
    let mut managed = Condition::any().add(users::Column::AdminId.eq(viewer.id));
    if let Some(admin_id) = viewer.admin_id {
        managed = managed.add(users::Column::AdminId.eq(admin_id));
    }
    let managed_users = Query::select()
        .column(users::Column::Id)
        .from(Users)
        .cond_where(managed)
        .to_owned();

    Condition::any()
        .add(user_images::Column::UserId.eq(viewer.id))
        .add(user_images::Column::UserId.in_subquery(managed_users))
}
