use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::auth_token::AuthToken;
use crate::models::{NewUser, UserRecord};
use crate::repository::{AuthTokenRepository, RepositoryError, SessionRepository, UserRepository};
use crate::session::Session;
use crate::token::TokenHash;

// In-memory implementations of the repository contracts. They back the development server
// and the test-suite; a relational backend implements the same traits.

/// InMemorySessionRepository
///
/// Session table in a mutex-guarded map. Expired rows are never swept; `get_by_hash` simply
/// misses on them, which is how the relational query behaves (`expires > now`).
#[derive(Default)]
pub struct InMemorySessionRepository {
    rows: Mutex<HashMap<TokenHash, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, expired ones included.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_by_hash(&self, hash: &TokenHash) -> Result<Session, RepositoryError> {
        let rows = self.rows.lock().await;
        match rows.get(hash) {
            Some(session) if session.expires > Utc::now() => Ok(session.clone()),
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn create(&self, session: Session) -> Result<TokenHash, RepositoryError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&session.token_hash) {
            return Err(RepositoryError::Conflict);
        }
        let hash = session.token_hash.clone();
        rows.insert(hash.clone(), session);
        Ok(hash)
    }

    async fn delete(&self, hash: &TokenHash) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().await.remove(hash).is_some())
    }
}

/// InMemoryAuthTokenRepository
#[derive(Default)]
pub struct InMemoryAuthTokenRepository {
    rows: Mutex<HashMap<TokenHash, AuthToken>>,
}

impl InMemoryAuthTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthTokenRepository for InMemoryAuthTokenRepository {
    async fn get_by_hash(&self, hash: &TokenHash) -> Result<AuthToken, RepositoryError> {
        let rows = self.rows.lock().await;
        match rows.get(hash) {
            Some(token) if token.expires > Utc::now() => Ok(token.clone()),
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn create(&self, token: AuthToken) -> Result<TokenHash, RepositoryError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&token.token_hash) {
            return Err(RepositoryError::Conflict);
        }
        let hash = token.token_hash.clone();
        rows.insert(hash.clone(), token);
        Ok(hash)
    }

    async fn delete(&self, hash: &TokenHash) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().await.remove(hash).is_some())
    }
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<i64, UserRecord>,
}

/// InMemoryUserRepository
///
/// Stand-in for the user-management collaborator. E-mail addresses are unique, compared
/// case-insensitively.
#[derive(Default)]
pub struct InMemoryUserRepository {
    table: Mutex<UserTable>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_id(&self, id: i64) -> Result<UserRecord, RepositoryError> {
        self.table
            .lock()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<UserRecord, RepositoryError> {
        self.table
            .lock()
            .await
            .rows
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<i64, RepositoryError> {
        let mut table = self.table.lock().await;
        if table
            .rows
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::Conflict);
        }

        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(
            id,
            UserRecord {
                id,
                name: user.name,
                email: user.email,
                new_email: None,
                password_hash: user.password_hash,
                role: user.role,
                state: user.state,
                registered: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update(&self, user: &UserRecord) -> Result<bool, RepositoryError> {
        let mut table = self.table.lock().await;
        if table
            .rows
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::Conflict);
        }
        match table.rows.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
