use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{cities, countries, prelude::*, provinces};

/// Country / province / city reference data.
pub struct LocationRepository {
    conn: DatabaseConnection,
}

impl LocationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn countries(&self) -> Result<Vec<countries::Model>> {
        Countries::find()
            .order_by_asc(countries::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list countries")
    }

    /// `None` when the country does not exist.
    pub async fn provinces(&self, country_id: i32) -> Result<Option<Vec<provinces::Model>>> {
        if Countries::find_by_id(country_id)
            .one(&self.conn)
            .await?
            .is_none()
        {
            return Ok(None);
        }

        let rows = Provinces::find()
            .filter(provinces::Column::CountryId.eq(country_id))
            .order_by_asc(provinces::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list provinces")?;
        Ok(Some(rows))
    }

    /// `None` when the province does not exist.
    pub async fn cities(&self, province_id: i32) -> Result<Option<Vec<cities::Model>>> {
        if Provinces::find_by_id(province_id)
            .one(&self.conn)
            .await?
            .is_none()
        {
            return Ok(None);
        }

        let rows = Cities::find()
            .filter(cities::Column::ProvinceId.eq(province_id))
            .order_by_asc(cities::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list cities")?;
        Ok(Some(rows))
    }

    pub async fn city_exists(&self, id: i32) -> Result<bool> {
        Ok(Cities::find_by_id(id).one(&self.conn).await?.is_some())
    }

    pub async fn add_country(&self, name: &str, phone_code: &str) -> Result<countries::Model> {
        countries::ActiveModel {
            name: Set(name.to_string()),
            phone_code: Set(phone_code.to_string()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert country")
    }

    pub async fn add_province(&self, country_id: i32, name: &str) -> Result<provinces::Model> {
        provinces::ActiveModel {
            name: Set(name.to_string()),
            country_id: Set(country_id),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert province")
    }

    pub async fn add_city(&self, province_id: i32, name: &str) -> Result<cities::Model> {
        cities::ActiveModel {
            name: Set(name.to_string()),
            province_id: Set(province_id),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert city")
    }
}
