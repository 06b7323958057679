//! Participant login and bearer-token verification.
//!
//! Tokens are HS256 JWTs carrying `{sub, username, iat, exp}`. `iat` is backdated
//! a few seconds and expiry is checked against an injected clock with a leeway,
//! so processes with slightly skewed clocks accept each other's tokens.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::application::repos::{RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

const IAT_BACKDATE: Duration = Duration::seconds(5);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username required")]
    MissingUsername,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("user not found")]
    UnknownUser,
    #[error("token could not be issued: {0}")]
    Issue(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub leeway: Duration,
    /// Log in any username without checking a password, creating it on first use.
    pub dev_no_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user: UserRecord,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    settings: Arc<AuthSettings>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, settings: AuthSettings) -> Self {
        let encoding = EncodingKey::from_secret(settings.jwt_secret.as_bytes());
        let decoding = DecodingKey::from_secret(settings.jwt_secret.as_bytes());
        Self {
            users,
            settings: Arc::new(settings),
            encoding,
            decoding,
        }
    }

    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<LoginSession, AuthError> {
        let username = username
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingUsername)?;
        let password = password.filter(|value| !value.is_empty());

        let user = if self.settings.dev_no_password {
            self.find_or_create(username, password).await?
        } else {
            self.check_credentials(username, password).await?
        };

        let token = self.issue_token(&user, OffsetDateTime::now_utc())?;
        info!(
            target = "slopfeed::application::auth",
            user_id = user.id,
            username = %user.username,
            "participant logged in"
        );
        Ok(LoginSession { token, user })
    }

    pub fn issue_token(&self, user: &UserRecord, now: OffsetDateTime) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: (now - IAT_BACKDATE).unix_timestamp(),
            exp: (now + self.settings.token_ttl).unix_timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Checks signature and expiry as of `now`, allowing the configured leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if now.unix_timestamp() > claims.exp + self.settings.leeway.whole_seconds() {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }

    /// Resolves a bearer token to the user it was issued for.
    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, AuthError> {
        let claims = self.verify_at(token, OffsetDateTime::now_utc())?;
        self.users
            .find_user(claims.user_id()?)
            .await?
            .ok_or(AuthError::UnknownUser)
    }

    async fn find_or_create(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<UserRecord, AuthError> {
        if let Some(user) = self.users.find_user_by_username(username).await? {
            return Ok(user);
        }

        let hash = password.map(hash_password);
        match self.users.create_user(username, hash.as_deref()).await {
            Ok(user) => {
                info!(
                    target = "slopfeed::application::auth",
                    user_id = user.id,
                    "created participant on first login"
                );
                Ok(user)
            }
            // Lost a creation race; the winner's row is the one to use.
            Err(RepoError::Duplicate { .. }) => self
                .users
                .find_user_by_username(username)
                .await?
                .ok_or(AuthError::UnknownUser),
            Err(err) => Err(err.into()),
        }
    }

    async fn check_credentials(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<UserRecord, AuthError> {
        let user = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        match (&user.password_hash, password) {
            (None, _) => Ok(user),
            (Some(stored), Some(password)) if verify_password(password, stored) => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let candidate = hash_password(password);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Token part of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}
