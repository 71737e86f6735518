use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{BootstrapConfig, SecurityConfig};
use crate::constants::groups;
use crate::domain::Principal;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{DeletionSummary, NewUser, UniqueConflicts, UserChanges};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        // Every pooled connection to `:memory:` would see its own empty
        // database, so pin those to a single long-lived connection.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        if !in_memory {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn permission_repo(&self) -> repositories::permission::PermissionRepository {
        repositories::permission::PermissionRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn image_repo(&self) -> repositories::image::ImageRepository {
        repositories::image::ImageRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn ticket_repo(&self) -> repositories::ticket::TicketRepository {
        repositories::ticket::TicketRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn turn_repo(&self) -> repositories::turn::TurnRepository {
        repositories::turn::TurnRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn notification_repo(&self) -> repositories::notification::NotificationRepository {
        repositories::notification::NotificationRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn request_log_repo(&self) -> repositories::request_log::RequestLogRepository {
        repositories::request_log::RequestLogRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn location_repo(&self) -> repositories::location::LocationRepository {
        repositories::location::LocationRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn product_repo(&self) -> repositories::product::ProductRepository {
        repositories::product::ProductRepository::new(self.conn.clone())
    }

    pub async fn load_principal(&self, user_id: i32) -> Result<Option<Principal>> {
        self.permission_repo().load_principal(user_id).await
    }

    /// Creates the root admin when the user table is empty and a bootstrap
    /// password is configured. Returns the new user's id.
    pub async fn ensure_bootstrap_admin(
        &self,
        bootstrap: &BootstrapConfig,
        security: &SecurityConfig,
    ) -> Result<Option<i32>> {
        let Some(password) = bootstrap.admin_password.as_deref() else {
            return Ok(None);
        };

        let users = self.user_repo();
        if users.count().await? > 0 {
            return Ok(None);
        }

        let password_hash =
            repositories::user::hash_password_async(password, security).await?;
        let admin = users
            .create(
                NewUser {
                    username: bootstrap.admin_username.clone(),
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
                Some(groups::ADMIN),
            )
            .await?;

        info!(user_id = admin.id, username = %admin.username, "Created bootstrap admin");
        Ok(Some(admin.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_seed_default_groups() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let perms = store.permission_repo();

        let admin = store
            .user_repo()
            .create(
                NewUser {
                    username: "boss".into(),
                    ..Default::default()
                },
                Some(groups::ADMIN),
            )
            .await
            .unwrap();

        assert_eq!(
            perms.via_groups(admin.id).await.unwrap(),
            crate::permissions::CapabilitySet::all()
        );
        assert_eq!(perms.group_names(admin.id).await.unwrap(), vec!["admin_user"]);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_table() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let bootstrap = BootstrapConfig {
            admin_username: "root".into(),
            admin_password: Some("changeme".into()),
        };
        let security = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        };

        let first = store
            .ensure_bootstrap_admin(&bootstrap, &security)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .ensure_bootstrap_admin(&bootstrap, &security)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.user_repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_skipped_without_password() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let created = store
            .ensure_bootstrap_admin(&BootstrapConfig::default(), &SecurityConfig::default())
            .await
            .unwrap();
        assert!(created.is_none());
    }
}
