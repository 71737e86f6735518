use sea_orm::entity::prelude::*;

use crate::domain::Gender;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id PHC string, or an unusable marker starting with `!`
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,

    #[sea_orm(unique)]
    pub email: Option<String>,

    #[sea_orm(unique)]
    pub mobile: Option<String>,

    pub birth_date: Option<Date>,
    pub city_id: Option<i32>,
    pub national_code: Option<String>,
    pub description: Option<String>,
    pub gender: Gender,
    pub credit: i64,
    pub point: i32,
    pub company_name: Option<String>,
    pub remained_sms: i32,

    /// Owning admin. `None` marks a root account.
    pub admin_id: Option<i32>,

    pub commission: Option<i32>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTimeUtc>,
    pub date_joined: DateTimeUtc,
    pub date_modified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::AdminId",
        to = "Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Admin,
    #[sea_orm(
        belongs_to = "super::cities::Entity",
        from = "Column::CityId",
        to = "super::cities::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    City,
    #[sea_orm(has_many = "super::user_images::Entity")]
    Images,
    #[sea_orm(has_many = "super::tickets::Entity")]
    Tickets,
    #[sea_orm(has_many = "super::notifications::Entity")]
    Notifications,
}

impl Related<super::cities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::City.def()
    }
}

impl Related<super::user_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::tickets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl Related<super::notifications::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
