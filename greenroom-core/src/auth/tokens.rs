use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{IdentityKind, PrimaryKey, UserData};

/// Signs and verifies access/refresh token pairs. Access and refresh tokens
/// use distinct secrets, so one can never stand in for the other.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature and expiry are deliberately not distinguished
    #[error("Invalid or expired token")]
    InvalidOrExpired,
    #[error("TokenError: {0}")]
    Signing(String),
}

/// The identity claims carried by both tokens of a pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: PrimaryKey,
    pub kind: IdentityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_alias: Option<String>,
    pub exp: i64,
}

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signing configuration for [TokenIssuer]
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime, 30 minutes by default
    pub access_ttl: Duration,
    /// Refresh token lifetime, 7 days by default
    pub refresh_ttl: Duration,
}

impl AuthConfig {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(30),
            refresh_ttl: Duration::days(7),
        }
    }
}

impl TokenIssuer {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Issues an access/refresh pair carrying the user's identity claims
    pub fn issue_pair(&self, user: &UserData) -> Result<TokenPair, TokenError> {
        let access_token = self.sign(user, &self.access_encoding, self.access_ttl)?;
        let refresh_token = self.sign(user, &self.refresh_encoding, self.refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        Self::verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        Self::verify(token, &self.refresh_decoding)
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(
        &self,
        user: &UserData,
        key: &EncodingKey,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user.id,
            kind: user.identity_kind(),
            email: user.email().map(str::to_string),
            device_alias: user.device_alias().map(str::to_string),
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(token: &str, key: &DecodingKey) -> Result<Claims, TokenError> {
        decode::<Claims>(token, key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| TokenError::InvalidOrExpired)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{UserKind, UserMetadata};

    fn user() -> UserData {
        UserData {
            id: 7,
            name: "Ann".to_string(),
            is_active: true,
            metadata: UserMetadata::default(),
            created_at: Utc::now(),
            last_login_at: None,
            kind: UserKind::Authenticated {
                email: "a@b.com".to_string(),
                password_hash: "hash".to_string(),
                upgraded_at: None,
            },
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(AuthConfig::new(
            "access-secret-access-secret-access",
            "refresh-secret-refresh-secret-refresh",
        ))
    }

    #[test]
    fn issued_pair_round_trips_claims() {
        let issuer = issuer();
        let pair = issuer.issue_pair(&user()).unwrap();

        let claims = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.kind, IdentityKind::Authenticated);
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.device_alias, None);

        let claims = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.user_id, 7);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer.issue_pair(&user()).unwrap();

        assert!(issuer.verify_access(&pair.refresh_token).is_err());
        assert!(issuer.verify_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = AuthConfig::new("access-secret", "refresh-secret");
        config.access_ttl = Duration::hours(-1);

        let issuer = TokenIssuer::new(config);
        let pair = issuer.issue_pair(&user()).unwrap();

        let result = issuer.verify_access(&pair.access_token);
        assert!(matches!(result, Err(TokenError::InvalidOrExpired)));
    }

    #[test]
    fn garbage_is_rejected() {
        let issuer = issuer();

        assert!(issuer.verify_access("not-a-token").is_err());
        assert!(issuer.verify_refresh("").is_err());
    }
}
