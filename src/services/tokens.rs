//! HS256 JWT encoding and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::services::auth_service::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a string
    pub sub: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Random token id so two tokens issued in the same second differ.
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i32, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &[u8], issuer: &str, access_minutes: i64, refresh_minutes: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.to_string(),
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::minutes(refresh_minutes),
        }
    }

    pub fn issue(&self, user_id: i32, token_type: TokenType) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Validates signature, issuer and expiry, then checks the token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.token_type != expected {
            return Err(AuthError::WrongTokenType);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"0123456789abcdef0123456789abcdef", "bizpanel", 5, 60)
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = codec();
        let token = codec.issue(42, TokenType::Access).unwrap();
        let claims = codec.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.iss, "bizpanel");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_type_is_enforced() {
        let codec = codec();
        let refresh = codec.issue(1, TokenType::Refresh).unwrap();
        assert!(matches!(
            codec.verify(&refresh, TokenType::Access),
            Err(AuthError::WrongTokenType)
        ));
    }

    #[test]
    fn test_rejects_foreign_secret_and_issuer() {
        let token = codec().issue(1, TokenType::Access).unwrap();

        let other_secret = TokenCodec::new(b"ffffffffffffffffffffffffffffffff", "bizpanel", 5, 60);
        assert!(matches!(
            other_secret.verify(&token, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));

        let other_issuer = TokenCodec::new(b"0123456789abcdef0123456789abcdef", "elsewhere", 5, 60);
        assert!(other_issuer.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_rejects_expired_token() {
        let expired = TokenCodec::new(b"0123456789abcdef0123456789abcdef", "bizpanel", -1, 60);
        let token = expired.issue(1, TokenType::Access).unwrap();
        assert!(matches!(
            codec().verify(&token, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(codec().verify("not-a-token", TokenType::Access).is_err());
    }
}
