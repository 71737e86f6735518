use anyhow::{Context, Result};
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::domain::Principal;
use crate::entities::{group_permissions, groups, prelude::*, user_groups, user_permissions};
use crate::permissions::CapabilitySet;

pub struct PermissionRepository {
    conn: DatabaseConnection,
}

impl PermissionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Resolves an active user into a [`Principal`] with its direct and
    /// group grants folded together.
    pub async fn load_principal(&self, user_id: i32) -> Result<Option<Principal>> {
        let Some(user) = Users::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to load principal")?
        else {
            return Ok(None);
        };

        if !user.is_active {
            return Ok(None);
        }

        let capabilities = if user.is_superuser {
            CapabilitySet::all()
        } else {
            self.direct(user_id)
                .await?
                .union(self.via_groups(user_id).await?)
        };

        Ok(Some(Principal {
            id: user.id,
            username: user.username,
            admin_id: user.admin_id,
            is_superuser: user.is_superuser,
            capabilities,
        }))
    }

    /// Permissions granted to the user outside any group.
    pub async fn direct(&self, user_id: i32) -> Result<CapabilitySet> {
        let ids: Vec<i32> = UserPermissions::find()
            .select_only()
            .column(user_permissions::Column::PermissionId)
            .filter(user_permissions::Column::UserId.eq(user_id))
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load user permissions")?;

        Ok(CapabilitySet::from_ids(ids))
    }

    pub async fn via_groups(&self, user_id: i32) -> Result<CapabilitySet> {
        let memberships = Query::select()
            .column(user_groups::Column::GroupId)
            .from(UserGroups)
            .and_where(user_groups::Column::UserId.eq(user_id))
            .to_owned();

        let ids: Vec<i32> = GroupPermissions::find()
            .select_only()
            .column(group_permissions::Column::PermissionId)
            .filter(group_permissions::Column::GroupId.in_subquery(memberships))
            .distinct()
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load group permissions")?;

        Ok(CapabilitySet::from_ids(ids))
    }

    pub async fn group_names(&self, user_id: i32) -> Result<Vec<String>> {
        let memberships = Query::select()
            .column(user_groups::Column::GroupId)
            .from(UserGroups)
            .and_where(user_groups::Column::UserId.eq(user_id))
            .to_owned();

        Groups::find()
            .select_only()
            .column(groups::Column::Name)
            .filter(groups::Column::Id.in_subquery(memberships))
            .order_by_asc(groups::Column::Name)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load user groups")
    }

    /// Replaces the user's direct permissions with `grants`.
    pub async fn replace_direct(&self, user_id: i32, grants: CapabilitySet) -> Result<()> {
        let txn = self.conn.begin().await?;

        UserPermissions::delete_many()
            .filter(user_permissions::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .context("Failed to clear user permissions")?;

        for permission_id in grants.ids() {
            user_permissions::ActiveModel {
                user_id: Set(user_id),
                permission_id: Set(permission_id),
            }
            .insert(&txn)
            .await
            .context("Failed to grant permission")?;
        }

        txn.commit().await?;
        Ok(())
    }
}
