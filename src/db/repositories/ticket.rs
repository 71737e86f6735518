use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::{TicketStatus, TicketType};
use crate::entities::{prelude::*, tickets};

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub user_id: i32,
    pub message_type: TicketType,
    pub subject: String,
    pub status: TicketStatus,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct TicketChanges {
    pub message_type: Option<TicketType>,
    pub subject: Option<String>,
    pub status: Option<TicketStatus>,
    pub text: Option<String>,
}

pub struct TicketRepository {
    conn: DatabaseConnection,
}

impl TicketRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, ticket: NewTicket) -> Result<tickets::Model> {
        let now = Utc::now();
        tickets::ActiveModel {
            message_type: Set(ticket.message_type),
            subject: Set(ticket.subject),
            user_id: Set(ticket.user_id),
            status: Set(ticket.status),
            text: Set(ticket.text),
            date_created: Set(now),
            date_modified: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert ticket")
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<tickets::Model>> {
        Tickets::find()
            .filter(tickets::Column::UserId.eq(user_id))
            .order_by_asc(tickets::Column::DateCreated)
            .order_by_asc(tickets::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list tickets")
    }

    pub async fn get_for_user(&self, user_id: i32, id: i32) -> Result<Option<tickets::Model>> {
        Tickets::find_by_id(id)
            .filter(tickets::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query ticket")
    }

    pub async fn get(&self, id: i32) -> Result<Option<tickets::Model>> {
        Tickets::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query ticket")
    }

    pub async fn update(
        &self,
        ticket: tickets::Model,
        changes: TicketChanges,
    ) -> Result<tickets::Model> {
        let mut active: tickets::ActiveModel = ticket.into();
        if let Some(v) = changes.message_type {
            active.message_type = Set(v);
        }
        if let Some(v) = changes.subject {
            active.subject = Set(v);
        }
        if let Some(v) = changes.status {
            active.status = Set(v);
        }
        if let Some(v) = changes.text {
            active.text = Set(v);
        }
        active.date_modified = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to update ticket")
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Tickets::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete ticket")?;
        Ok(result.rows_affected > 0)
    }
}
