use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity Projection (consumed by sessions, tokens and guards) ---

/// Role
///
/// Flat role attribute of a user account. There is no hierarchy between roles: an `Admin`
/// does not implicitly satisfy a route that only admits `Moderator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Contributor,
    Moderator,
    Admin,
}

impl Role {
    const fn bit(self) -> u8 {
        match self {
            Role::User => 1,
            Role::Contributor => 1 << 1,
            Role::Moderator => 1 << 2,
            Role::Admin => 1 << 3,
        }
    }
}

/// RoleSet
///
/// Bitmask of admitted roles for the authentication guard. The empty set means
/// "any authenticated user".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const ANY: RoleSet = RoleSet(0);

    pub fn of(roles: &[Role]) -> Self {
        Self(roles.iter().fold(0, |mask, role| mask | role.bit()))
    }

    pub fn is_any(self) -> bool {
        self.0 == 0
    }

    /// Exact membership check; the empty set admits every role.
    pub fn admits(self, role: Role) -> bool {
        self.is_any() || self.0 & role.bit() != 0
    }
}

/// User
///
/// The minimal `{id, role}` projection of an account that sessions, auth tokens and the
/// authorization guard operate on. The full record is owned by the user-management
/// collaborator (`UserRecord`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub role: Role,
}

// --- User-Management Records (collaborator side) ---

/// Lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    #[default]
    Unverified,
    Active,
    DeletionPending,
}

impl AccountState {
    /// Suffix used for the "cannot log in" flash message key.
    pub fn message_key(self) -> &'static str {
        match self {
            AccountState::Unverified => "login.stateUnverified",
            AccountState::Active => "login.stateActive",
            AccountState::DeletionPending => "login.stateDeletionPending",
        }
    }
}

/// UserRecord
///
/// Full account row as returned by the `UserRepository`. Only the flows that need more than
/// the `{id, role}` projection (login, registration, token redemption) read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Address awaiting confirmation through an `email_verify` token.
    pub new_email: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub state: AccountState,
    pub registered: DateTime<Utc>,
}

impl UserRecord {
    pub fn principal(&self) -> User {
        User {
            id: self.id,
            role: self.role,
        }
    }
}

/// Insert payload for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub state: AccountState,
}

/// PublicProfile
///
/// Output schema of `GET /profile/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl From<&UserRecord> for PublicProfile {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            role: record.role,
        }
    }
}
