use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_type_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub notification_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub notification_type_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::notifications::Entity",
        from = "Column::NotificationId",
        to = "super::notifications::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Notification,
    #[sea_orm(
        belongs_to = "super::notification_types::Entity",
        from = "Column::NotificationTypeId",
        to = "super::notification_types::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    NotificationType,
}

impl Related<super::notifications::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notification.def()
    }
}

impl Related<super::notification_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
