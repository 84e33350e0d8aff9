use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::auth_token::AuthToken;
use crate::models::{NewUser, UserRecord};
use crate::session::Session;
use crate::token::TokenHash;

/// RepositoryError
///
/// Failure of a persistence call. `NotFound` covers both "never existed" and "expired":
/// callers must not be able to tell the two apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// SessionRepository
///
/// Persistence contract for sessions, keyed by the token hash. Lookups of expired sessions
/// return `NotFound`; there is no sweeper, expiry is purely comparison-based.
///
/// **Send + Sync + async_trait** keep `Arc<dyn SessionRepository>` usable across Axum's
/// task boundaries.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_by_hash(&self, hash: &TokenHash) -> Result<Session, RepositoryError>;
    async fn create(&self, session: Session) -> Result<TokenHash, RepositoryError>;
    // Returns true if a row was removed.
    async fn delete(&self, hash: &TokenHash) -> Result<bool, RepositoryError>;
}

/// AuthTokenRepository
///
/// Persistence contract for single-use tokens. Rows are created once, never updated, and
/// deleted when a flow consumes them.
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    async fn get_by_hash(&self, hash: &TokenHash) -> Result<AuthToken, RepositoryError>;
    async fn create(&self, token: AuthToken) -> Result<TokenHash, RepositoryError>;
    async fn delete(&self, hash: &TokenHash) -> Result<bool, RepositoryError>;
}

/// UserRepository
///
/// The slice of the user-management collaborator the authentication flows depend on.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<UserRecord, RepositoryError>;
    async fn get_by_email(&self, email: &str) -> Result<UserRecord, RepositoryError>;
    // `Conflict` when the e-mail address is already registered.
    async fn create(&self, user: NewUser) -> Result<i64, RepositoryError>;
    async fn update(&self, user: &UserRecord) -> Result<bool, RepositoryError>;
}

pub type SessionRepoState = Arc<dyn SessionRepository>;
pub type AuthTokenRepoState = Arc<dyn AuthTokenRepository>;
pub type UserRepoState = Arc<dyn UserRepository>;
