use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::entities::{prelude::*, products};

pub struct ProductRepository {
    conn: DatabaseConnection,
}

impl ProductRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, user_id: i32, name: &str, price: i64) -> Result<products::Model> {
        let now = Utc::now();
        products::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.to_string()),
            price: Set(price),
            date_created: Set(now),
            date_modified: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert product")
    }

    pub async fn get(&self, id: i32) -> Result<Option<products::Model>> {
        Products::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query product")
    }
}
