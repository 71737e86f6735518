//! `SeaORM`-backed implementation of the `AuthService` trait.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::Store;
use crate::db::repositories::user::verify_password;
use crate::domain::Principal;
use crate::services::auth_service::{AccessToken, AuthError, AuthService, TokenPair};
use crate::services::tokens::{TokenCodec, TokenType};

pub struct JwtAuthService {
    store: Store,
    codec: TokenCodec,
}

impl JwtAuthService {
    #[must_use]
    pub const fn new(store: Store, codec: TokenCodec) -> Self {
        Self { store, codec }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some(user) = self.store.user_repo().get_by_username(username).await? else {
            debug!(username, "Login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active || !verify_password(&user.password_hash, password).await? {
            warn!(username, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        self.store.user_repo().touch_last_login(user.id).await?;

        Ok(TokenPair {
            access: self.codec.issue(user.id, TokenType::Access)?,
            refresh: self.codec.issue(user.id, TokenType::Refresh)?,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let claims = self.codec.verify(refresh_token, TokenType::Refresh)?;
        let user_id = claims.user_id()?;

        match self.store.user_repo().get(user_id).await? {
            Some(user) if user.is_active => Ok(AccessToken {
                access: self.codec.issue(user.id, TokenType::Access)?,
            }),
            _ => Err(AuthError::InactiveUser),
        }
    }

    async fn authenticate(&self, access_token: &str) -> Result<Principal, AuthError> {
        let claims = self.codec.verify(access_token, TokenType::Access)?;
        let user_id = claims.user_id()?;

        self.store
            .load_principal(user_id)
            .await?
            .ok_or(AuthError::InactiveUser)
    }
}
