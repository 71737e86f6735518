use crate::constants::groups;
use crate::entities::{group_permissions, groups as group_entity, prelude::*};
use crate::permissions::{CapabilitySet, Permission, Resource};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Query;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Default roles and their grants. Ids are fixed so later migrations can
/// refer to them.
fn default_groups() -> Vec<(i32, &'static str, CapabilitySet)> {
    let tickets = || {
        [
            Permission::view(Resource::Ticket),
            Permission::add(Resource::Ticket),
            Permission::change(Resource::Ticket),
            Permission::delete(Resource::Ticket),
        ]
    };
    let images = [
        Permission::view(Resource::UserImage),
        Permission::add(Resource::UserImage),
        Permission::change(Resource::UserImage),
        Permission::delete(Resource::UserImage),
    ];

    vec![
        (1, groups::ADMIN, CapabilitySet::all()),
        (2, groups::EMPLOYEE, tickets().into_iter().collect()),
        (
            3,
            groups::COWORKER,
            tickets()
                .into_iter()
                .chain([Permission::view(Resource::Turn)])
                .collect(),
        ),
        (
            4,
            groups::END_USER,
            tickets().into_iter().chain(images).collect(),
        ),
    ]
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (id, name, caps) in default_groups() {
            let insert = Query::insert()
                .into_table(Groups)
                .columns([group_entity::Column::Id, group_entity::Column::Name])
                .values_panic([id.into(), name.into()])
                .to_owned();
            manager.exec_stmt(insert).await?;

            let mut grants = Query::insert()
                .into_table(GroupPermissions)
                .columns([
                    group_permissions::Column::GroupId,
                    group_permissions::Column::PermissionId,
                ])
                .to_owned();
            for permission_id in caps.ids() {
                grants.values_panic([id.into(), permission_id.into()]);
            }
            manager.exec_stmt(grants).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete = Query::delete().from_table(Groups).to_owned();
        manager.exec_stmt(delete).await
    }
}
