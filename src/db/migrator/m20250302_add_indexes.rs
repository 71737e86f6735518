use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_users_admin_id", "users", "admin_id"),
    ("idx_user_images_user_id", "user_images", "user_id"),
    ("idx_tickets_user_id", "tickets", "user_id"),
    ("idx_turns_user_id", "turns", "user_id"),
    ("idx_turns_coworker_id", "turns", "coworker_id"),
    ("idx_notifications_user_id", "notifications", "user_id"),
    ("idx_request_logs_date_created", "request_logs", "date_created"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table, column) in INDEXES {
            manager
                .create_index(
                    Index::create()
                        .name(*name)
                        .table(Alias::new(*table))
                        .col(Alias::new(*column))
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table, _) in INDEXES {
            manager
                .drop_index(
                    Index::drop()
                        .name(*name)
                        .table(Alias::new(*table))
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}
