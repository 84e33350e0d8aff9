use chrono::{DateTime, Duration, Utc};

use crate::models::User;
use crate::token::{self, SecretToken, TokenHash};

/// Lifetime of a session created by login or registration.
pub const AUTHENTICATED_TTL_SECS: i64 = 86_400;
/// Lifetime of the anonymous session created on first contact.
pub const ANONYMOUS_TTL_SECS: i64 = 3_600;

/// Session
///
/// A browser session, anonymous (`user == None`) or authenticated. The session is bound to
/// the client's network context at creation: `fingerprint` is a digest of the originating IP
/// and user agent and never changes afterwards. `request_token` is the CSRF nonce forms
/// must echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token_hash: TokenHash,
    pub user: Option<User>,
    pub expires: DateTime<Utc>,
    pub fingerprint: Vec<u8>,
    pub request_token: String,
}

impl Session {
    /// create_new
    ///
    /// Builds a session that expires `duration_secs` from now, fingerprinted against
    /// `client_ip`/`user_agent`, with a fresh request token.
    pub fn create_new(
        raw_token: &SecretToken,
        user: Option<User>,
        duration_secs: i64,
        client_ip: &str,
        user_agent: &str,
    ) -> Self {
        Self {
            token_hash: raw_token.hash(),
            user,
            expires: Utc::now() + Duration::seconds(duration_secs),
            fingerprint: token::fingerprint(client_ip, user_agent),
            request_token: token::generate_request_token(),
        }
    }

    /// TTL applied by `create_session`: a day when a user is attached, an hour otherwise.
    pub fn ttl_for(user: Option<&User>) -> i64 {
        if user.is_some() {
            AUTHENTICATED_TTL_SECS
        } else {
            ANONYMOUS_TTL_SECS
        }
    }

    /// Accepts only exactly-64-character lowercase hex tokens.
    pub fn token_format_valid(raw: &str) -> bool {
        token::is_well_formed(raw)
    }

    pub fn is_valid(&self, client_ip: &str, user_agent: &str) -> bool {
        self.is_valid_at(Utc::now(), client_ip, user_agent)
    }

    /// Time check plus device check; a cookie replayed from another IP or browser fails.
    pub fn is_valid_at(&self, now: DateTime<Utc>, client_ip: &str, user_agent: &str) -> bool {
        now < self.expires
            && token::constant_time_eq(
                &token::fingerprint(client_ip, user_agent),
                &self.fingerprint,
            )
    }

    pub fn is_authenticated(&self, client_ip: &str, user_agent: &str) -> bool {
        self.is_valid(client_ip, user_agent) && self.user.is_some()
    }

    /// The attached user, provided the session is valid for this client.
    pub fn authenticated_user(&self, client_ip: &str, user_agent: &str) -> Option<User> {
        if self.is_valid(client_ip, user_agent) {
            self.user
        } else {
            None
        }
    }
}
