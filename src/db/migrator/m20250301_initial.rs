use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{EntityTrait, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

async fn create<E: EntityTrait>(
    manager: &SchemaManager<'_>,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    manager
        .create_table(
            schema
                .create_table_from_entity(entity)
                .if_not_exists()
                .to_owned(),
        )
        .await
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        // Referenced tables first so foreign keys resolve.
        create(manager, &schema, Countries).await?;
        create(manager, &schema, Provinces).await?;
        create(manager, &schema, Cities).await?;
        create(manager, &schema, Users).await?;
        create(manager, &schema, Groups).await?;
        create(manager, &schema, GroupPermissions).await?;
        create(manager, &schema, UserGroups).await?;
        create(manager, &schema, UserPermissions).await?;
        create(manager, &schema, UserImages).await?;
        create(manager, &schema, Notifications).await?;
        create(manager, &schema, NotificationTypes).await?;
        create(manager, &schema, NotificationTypeLinks).await?;
        create(manager, &schema, Products).await?;
        create(manager, &schema, Turns).await?;
        create(manager, &schema, Tickets).await?;
        create(manager, &schema, RequestLogs).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RequestLogs).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tickets).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Turns).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationTypeLinks).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationTypes).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserImages).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserPermissions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserGroups).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupPermissions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cities).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Provinces).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Countries).to_owned())
            .await?;

        Ok(())
    }
}
