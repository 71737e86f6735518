use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::entities::{notification_type_links, notification_types, notifications, prelude::*};

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i32,
    pub is_news: bool,
    pub text: String,
    /// Type tags by name; unknown names are created.
    pub types: Vec<String>,
}

/// Notification with its type names resolved.
#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub notification: notifications::Model,
    pub types: Vec<String>,
}

pub struct NotificationRepository {
    conn: DatabaseConnection,
}

impl NotificationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts the notification and its type links in one transaction.
    pub async fn create(&self, input: NewNotification) -> Result<NotificationRow> {
        let txn = self.conn.begin().await?;
        let now = Utc::now();

        let notification = notifications::ActiveModel {
            user_id: Set(input.user_id),
            is_news: Set(input.is_news),
            text: Set(input.text),
            date_created: Set(now),
            date_modified: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert notification")?;

        let mut names = input.types;
        names.sort();
        names.dedup();

        for name in &names {
            let type_id = ensure_type(&txn, name).await?;
            notification_type_links::ActiveModel {
                notification_id: Set(notification.id),
                notification_type_id: Set(type_id),
            }
            .insert(&txn)
            .await
            .context("Failed to link notification type")?;
        }

        txn.commit().await?;
        Ok(NotificationRow {
            notification,
            types: names,
        })
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<NotificationRow>> {
        let rows = Notifications::find()
            .filter(notifications::Column::UserId.eq(user_id))
            .order_by_asc(notifications::Column::DateCreated)
            .order_by_asc(notifications::Column::Id)
            .find_with_related(NotificationTypes)
            .all(&self.conn)
            .await
            .context("Failed to list notifications")?;

        Ok(rows
            .into_iter()
            .map(|(notification, types)| NotificationRow {
                notification,
                types: type_names(types),
            })
            .collect())
    }

    pub async fn get_for_user(&self, user_id: i32, id: i32) -> Result<Option<NotificationRow>> {
        let rows = Notifications::find_by_id(id)
            .filter(notifications::Column::UserId.eq(user_id))
            .find_with_related(NotificationTypes)
            .all(&self.conn)
            .await
            .context("Failed to query notification")?;

        Ok(rows
            .into_iter()
            .next()
            .map(|(notification, types)| NotificationRow {
                notification,
                types: type_names(types),
            }))
    }

    pub async fn get(&self, id: i32) -> Result<Option<notifications::Model>> {
        Notifications::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query notification")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let txn = self.conn.begin().await?;
        NotificationTypeLinks::delete_many()
            .filter(notification_type_links::Column::NotificationId.eq(id))
            .exec(&txn)
            .await?;
        let result = Notifications::delete_by_id(id)
            .exec(&txn)
            .await
            .context("Failed to delete notification")?;
        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Every notification type with the number of notifications tagged.
    pub async fn list_types(&self) -> Result<Vec<(notification_types::Model, usize)>> {
        let rows = NotificationTypes::find()
            .order_by_asc(notification_types::Column::Name)
            .find_with_related(NotificationTypeLinks)
            .all(&self.conn)
            .await
            .context("Failed to load notification types")?;

        Ok(rows
            .into_iter()
            .map(|(kind, links)| (kind, links.len()))
            .collect())
    }
}

fn type_names(types: Vec<notification_types::Model>) -> Vec<String> {
    let mut names: Vec<String> = types.into_iter().map(|t| t.name).collect();
    names.sort();
    names
}

async fn ensure_type<C: ConnectionTrait>(conn: &C, name: &str) -> Result<i32> {
    if let Some(existing) = NotificationTypes::find()
        .filter(notification_types::Column::Name.eq(name))
        .one(conn)
        .await?
    {
        return Ok(existing.id);
    }

    let created = notification_types::ActiveModel {
        name: Set(name.to_string()),
        date_created: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .with_context(|| format!("Failed to create notification type {name}"))?;
    Ok(created.id)
}
