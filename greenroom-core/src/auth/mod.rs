use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::Utc;
use log::info;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    Database, DatabaseError, NewUser, NewUserKind, PrimaryKey, UserData, UserMetadata,
    UserPromotion,
};

mod registry;
mod tokens;

pub use registry::*;
pub use tokens::*;

/// The identity lifecycle manager: anonymous sessions, signup, login,
/// token rotation, and the anonymous-to-authenticated upgrade.
pub struct Auth<Db> {
    db: Arc<Db>,
    argon: Argon2<'static>,
    tokens: TokenIssuer,
    registry: RefreshTokenRegistry,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password is incorrect. Deliberately covers unknown accounts
    /// and inactive accounts as well, so nothing is revealed about which
    /// factor failed.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Every refresh failure collapses into this one error to avoid an oracle
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Account is inactive")]
    InactiveAccount,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
    #[error("TokenError: {0}")]
    Token(String),
}

/// A successful authentication: a fresh token pair plus the user it belongs to
#[derive(Debug)]
pub struct AuthSession {
    pub tokens: TokenPair,
    pub user: UserData,
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    pub fn new(db: &Arc<Db>, config: AuthConfig) -> Self {
        Self {
            db: db.clone(),
            argon: Argon2::default(),
            tokens: TokenIssuer::new(config),
            registry: RefreshTokenRegistry::new(),
        }
    }

    /// Finds or creates the anonymous identity for a device alias. Idempotent:
    /// repeated calls with the same alias return the same identity with fresh
    /// tokens.
    pub async fn create_anonymous(&self, device_alias: &str) -> Result<AuthSession, AuthError> {
        let user = match self.db.user_by_device_alias(device_alias).await {
            Ok(user) => {
                self.db.record_login(user.id).await.map_err(AuthError::Db)?;
                user
            }
            Err(e) if e.is_not_found() => {
                let guest_name: String = device_alias.chars().take(8).collect();

                let user = self
                    .db
                    .create_user(NewUser {
                        name: format!("Guest-{guest_name}"),
                        metadata: UserMetadata::default(),
                        kind: NewUserKind::Anonymous {
                            device_alias: device_alias.to_string(),
                        },
                    })
                    .await
                    .map_err(AuthError::Db)?;

                info!("Anonymous user {} created for alias {device_alias}", user.id);
                user
            }
            Err(e) => return Err(AuthError::Db(e)),
        };

        self.establish_session(user)
    }

    /// Creates an authenticated account. Fails with a conflict if an
    /// authenticated record with that email already exists.
    pub async fn signup(&self, new_account: NewAccount) -> Result<AuthSession, AuthError> {
        let password_hash = self.hash_password(&new_account.password)?;

        let user = self
            .db
            .create_user(NewUser {
                name: new_account.name,
                metadata: UserMetadata::default(),
                kind: NewUserKind::Authenticated {
                    email: new_account.email,
                    password_hash,
                },
            })
            .await
            .map_err(AuthError::Db)?;

        info!("User {} signed up", user.id);

        self.establish_session(user)
    }

    /// Logs a user in, returning a fresh token pair
    pub async fn login(&self, credentials: Credentials) -> Result<AuthSession, AuthError> {
        let user = self
            .db
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = user
            .password_hash()
            .ok_or(AuthError::InvalidCredentials)?;

        let stored_password = PasswordHash::parse(password_hash, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.db.record_login(user.id).await.map_err(AuthError::Db)?;

        info!("User {} logged in", user.id);

        self.establish_session(user)
    }

    /// Rotates a refresh token: the presented token is revoked and a new pair
    /// is issued. A captured token is therefore usable at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        if !self.registry.validate(claims.user_id, refresh_token) {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .db
            .user_by_id(claims.user_id)
            .await
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        if !user.is_active {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.registry.remove(claims.user_id, refresh_token);

        self.issue_tokens(&user)
    }

    /// Revokes one device's refresh token, or all of them when none is given
    pub fn logout(&self, user_id: PrimaryKey, refresh_token: Option<&str>) {
        match refresh_token {
            Some(token) => self.registry.remove(user_id, token),
            None => self.registry.remove_all(user_id),
        }
    }

    /// Converts the anonymous identity behind a device alias into an
    /// authenticated account, in place. The id is unchanged, so everything
    /// the anonymous identity owned stays owned.
    pub async fn upgrade(
        &self,
        device_alias: &str,
        new_account: NewAccount,
    ) -> Result<AuthSession, AuthError> {
        let anonymous = self
            .db
            .user_by_device_alias(device_alias)
            .await
            .map_err(AuthError::Db)?;

        let password_hash = self.hash_password(&new_account.password)?;

        let user = self
            .db
            .promote_user(UserPromotion {
                id: anonymous.id,
                email: new_account.email,
                name: new_account.name,
                password_hash,
                upgraded_at: Utc::now(),
            })
            .await
            .map_err(AuthError::Db)?;

        let linked_interviews = self
            .db
            .count_interviews_by_owner(user.id)
            .await
            .map_err(AuthError::Db)?;

        info!(
            "Account upgraded for user {}, {linked_interviews} linked interviews",
            user.id
        );

        self.establish_session(user)
    }

    /// Resolves the user behind an access token, for authenticated requests
    pub async fn current_user(&self, access_token: &str) -> Result<UserData, AuthError> {
        let claims = self
            .tokens
            .verify_access(access_token)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let user = self
            .db
            .user_by_id(claims.user_id)
            .await
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        Ok(user)
    }

    /// Updates a user's consent metadata
    pub async fn update_metadata(
        &self,
        user_id: PrimaryKey,
        metadata: UserMetadata,
    ) -> Result<UserData, AuthError> {
        self.db
            .update_metadata(user_id, metadata)
            .await
            .map_err(AuthError::Db)
    }

    fn establish_session(&self, user: UserData) -> Result<AuthSession, AuthError> {
        let tokens = self.issue_tokens(&user)?;

        Ok(AuthSession { tokens, user })
    }

    fn issue_tokens(&self, user: &UserData) -> Result<TokenPair, AuthError> {
        let pair = self
            .tokens
            .issue_pair(user)
            .map_err(|e| AuthError::Token(e.to_string()))?;

        self.registry
            .add(user.id, &pair.refresh_token, self.tokens.refresh_ttl());

        Ok(pair)
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryDatabase;

    fn auth() -> (Auth<MemoryDatabase>, Arc<MemoryDatabase>) {
        let db = Arc::new(MemoryDatabase::new());
        let config = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests");

        (Auth::new(&db, config), db)
    }

    fn account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            name: "Ann".to_string(),
            password: "Passw0rd1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_anonymous_is_idempotent() {
        let (auth, _) = auth();

        let first = auth.create_anonymous("dev-123").await.unwrap();
        let second = auth.create_anonymous("dev-123").await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.user.device_alias(), Some("dev-123"));
        assert_eq!(first.user.name, "Guest-dev-123");
    }

    #[tokio::test]
    async fn signup_conflicts_on_duplicate_email() {
        let (auth, _) = auth();

        auth.signup(account("a@b.com")).await.unwrap();

        let result = auth.signup(account("a@b.com")).await;
        assert!(matches!(
            result,
            Err(AuthError::Db(DatabaseError::Conflict { .. }))
        ));
    }

    #[tokio::test]
    async fn login_round_trips() {
        let (auth, _) = auth();

        let signup = auth.signup(account("a@b.com")).await.unwrap();

        let login = auth
            .login(Credentials {
                email: "a@b.com".to_string(),
                password: "Passw0rd1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(login.user.id, signup.user.id);
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let (auth, db) = auth();

        let session = auth.signup(account("a@b.com")).await.unwrap();

        // Unknown email
        let result = auth
            .login(Credentials {
                email: "nobody@b.com".to_string(),
                password: "Passw0rd1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        // Wrong password
        let result = auth
            .login(Credentials {
                email: "a@b.com".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        // Inactive account
        db.set_active(session.user.id, false).unwrap();
        let result = auth
            .login(Credentials {
                email: "a@b.com".to_string(),
                password: "Passw0rd1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn refresh_rotation_is_single_use() {
        let (auth, _) = auth();

        let session = auth.signup(account("a@b.com")).await.unwrap();
        let original = session.tokens.refresh_token;

        let rotated = auth.refresh(&original).await.unwrap();

        // The presented token died with the rotation
        let result = auth.refresh(&original).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));

        // The replacement is valid exactly once
        auth.refresh(&rotated.refresh_token).await.unwrap();
        let result = auth.refresh(&rotated.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn refresh_rejects_deactivated_users() {
        let (auth, db) = auth();

        let session = auth.signup(account("a@b.com")).await.unwrap();
        db.set_active(session.user.id, false).unwrap();

        let result = auth.refresh(&session.tokens.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn logout_revokes_one_device_or_all() {
        let (auth, _) = auth();

        let session = auth.signup(account("a@b.com")).await.unwrap();
        let laptop = session.tokens.refresh_token;
        let phone = auth
            .login(Credentials {
                email: "a@b.com".to_string(),
                password: "Passw0rd1".to_string(),
            })
            .await
            .unwrap()
            .tokens
            .refresh_token;

        // Revoking one device leaves the other intact
        auth.logout(session.user.id, Some(&laptop));
        assert!(matches!(
            auth.refresh(&laptop).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
        let rotated = auth.refresh(&phone).await.unwrap();

        // Revoking everything kills the remaining device too
        auth.logout(session.user.id, None);
        assert!(matches!(
            auth.refresh(&rotated.refresh_token).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn upgrade_converts_the_same_identity() {
        let (auth, _) = auth();

        let anonymous = auth.create_anonymous("dev-123").await.unwrap();

        let upgraded = auth
            .upgrade("dev-123", account("a@b.com"))
            .await
            .unwrap();

        assert_eq!(upgraded.user.id, anonymous.user.id);
        assert_eq!(upgraded.user.email(), Some("a@b.com"));
        assert!(upgraded.user.upgraded_at().is_some());

        // The upgraded account can log in with its new credentials
        auth.login(Credentials {
            email: "a@b.com".to_string(),
            password: "Passw0rd1".to_string(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn upgrade_requires_an_anonymous_record() {
        let (auth, _) = auth();

        let result = auth.upgrade("missing-alias", account("a@b.com")).await;
        assert!(matches!(
            result,
            Err(AuthError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn upgrade_conflicts_on_taken_email() {
        let (auth, _) = auth();

        auth.signup(account("a@b.com")).await.unwrap();
        auth.create_anonymous("dev-123").await.unwrap();

        let result = auth.upgrade("dev-123", account("a@b.com")).await;
        assert!(matches!(
            result,
            Err(AuthError::Db(DatabaseError::Conflict { .. }))
        ));
    }

    #[tokio::test]
    async fn current_user_resolves_access_tokens() {
        let (auth, db) = auth();

        let session = auth.signup(account("a@b.com")).await.unwrap();

        let user = auth
            .current_user(&session.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(user.id, session.user.id);

        // Refresh tokens do not authenticate requests
        let result = auth.current_user(&session.tokens.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));

        // A deactivated account is surfaced distinctly from a bad token
        db.set_active(session.user.id, false).unwrap();
        let result = auth.current_user(&session.tokens.access_token).await;
        assert!(matches!(result, Err(AuthError::InactiveAccount)));
    }

    #[tokio::test]
    async fn metadata_updates_persist() {
        let (auth, _) = auth();

        let session = auth.create_anonymous("dev-123").await.unwrap();
        assert!(!session.user.metadata.has_granted_interview_consent);

        let updated = auth
            .update_metadata(
                session.user.id,
                UserMetadata {
                    has_granted_interview_consent: true,
                },
            )
            .await
            .unwrap();

        assert!(updated.metadata.has_granted_interview_consent);
    }
}
