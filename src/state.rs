use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::db::Store;
use crate::db::repositories::user::random_hex;
use crate::permissions::Policy;
use crate::services::{AuthService, ImageStore, JwtAuthService, TokenCodec};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub policy: Policy,

    pub auth_service: Arc<dyn AuthService>,

    pub images: ImageStore,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        store
            .ensure_bootstrap_admin(&config.bootstrap, &config.security)
            .await?;

        Ok(Self::with_store(config, store))
    }

    /// Wires services around an already migrated store.
    #[must_use]
    pub fn with_store(config: Config, store: Store) -> Self {
        let secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
            warn!("auth.jwt_secret is not set; tokens will not survive a restart");
            random_hex(32)
        });
        let codec = TokenCodec::new(
            secret.as_bytes(),
            &config.auth.issuer,
            config.auth.access_token_minutes,
            config.auth.refresh_token_minutes,
        );

        let auth_service: Arc<dyn AuthService> =
            Arc::new(JwtAuthService::new(store.clone(), codec));

        Self {
            policy: Policy::new(config.authorization.allow_peer_edit),
            images: ImageStore::new(&config.media),
            config: Arc::new(config),
            store,
            auth_service,
        }
    }
}
