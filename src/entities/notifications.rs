use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub is_news: bool,
    pub text: String,
    pub date_created: DateTimeUtc,
    pub date_modified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::notification_type_links::Entity")]
    TypeLinks,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::notification_type_links::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TypeLinks.def()
    }
}

impl Related<super::notification_types::Entity> for Entity {
    fn to() -> RelationDef {
        super::notification_type_links::Relation::NotificationType.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::notification_type_links::Relation::Notification.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
