use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::User;
use crate::repository::{AuthTokenRepository, RepositoryError};
use crate::token::{SecretToken, TokenHash};

/// Lifetime of a password-reset link.
pub const PASSWORD_RESET_TTL_SECS: i64 = 43_200;
/// Lifetime of an e-mail verification link.
pub const EMAIL_VERIFY_TTL_SECS: i64 = 86_400;

/// Purpose of an out-of-band token. A token is only ever accepted by the flow of its own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthTokenType {
    PasswordReset,
    EmailVerify,
}

/// AuthToken
///
/// Single-use secret enabling one deferred action for `user`. Only the digest of the secret
/// is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub user: User,
    pub kind: AuthTokenType,
    pub expires: DateTime<Utc>,
    pub token_hash: TokenHash,
}

impl AuthToken {
    pub fn create(user: User, kind: AuthTokenType, duration_secs: i64, raw: &SecretToken) -> Self {
        Self {
            user,
            kind,
            expires: Utc::now() + Duration::seconds(duration_secs),
            token_hash: raw.hash(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires
    }
}

/// issue
///
/// Generates a secret, stores its token row and hands the raw secret back so the caller can
/// deliver it out of band.
pub async fn issue(
    repo: &dyn AuthTokenRepository,
    user: User,
    kind: AuthTokenType,
    duration_secs: i64,
) -> Result<SecretToken, RepositoryError> {
    let raw = SecretToken::generate();
    repo.create(AuthToken::create(user, kind, duration_secs, &raw))
        .await?;
    tracing::debug!(user_id = user.id, kind = ?kind, "Auth token issued");
    Ok(raw)
}

/// lookup
///
/// Resolves a raw token for the flow expecting `expected`. A token of a different purpose,
/// or one that has expired, is reported as `NotFound` exactly like a missing one, so a flow
/// never leaks the existence of tokens it does not own.
pub async fn lookup(
    repo: &dyn AuthTokenRepository,
    raw: &SecretToken,
    expected: AuthTokenType,
) -> Result<AuthToken, RepositoryError> {
    let token = repo.get_by_hash(&raw.hash()).await?;
    if token.kind != expected || token.is_expired() {
        return Err(RepositoryError::NotFound);
    }
    Ok(token)
}

/// consume
///
/// Invalidates a token after its flow's side effect succeeded. A row that is already gone
/// counts as consumed.
pub async fn consume(repo: &dyn AuthTokenRepository, token: &AuthToken) -> Result<(), RepositoryError> {
    if !repo.delete(&token.token_hash).await? {
        tracing::debug!(user_id = token.user.id, "Auth token was already consumed");
    }
    Ok(())
}
