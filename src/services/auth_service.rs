//! Domain service for authentication.
//!
//! Exchanges credentials for JWT pairs, refreshes access tokens and turns a
//! bearer token back into a [`Principal`].

use serde::Serialize;
use thiserror::Error;

use crate::domain::Principal;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No active account found with the given credentials")]
    InvalidCredentials,

    #[error("Token is invalid or expired")]
    InvalidToken,

    #[error("Token has wrong type")]
    WrongTokenType,

    #[error("User is inactive or deleted")]
    InactiveUser,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and issues an access/refresh pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for unknown users, wrong or
    /// unusable passwords and inactive accounts.
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError>;

    /// Issues a fresh access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError>;

    /// Resolves an access token into the principal it was issued for.
    async fn authenticate(&self, access_token: &str) -> Result<Principal, AuthError>;
}
