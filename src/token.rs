use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use std::fmt;
use subtle::ConstantTimeEq;

/// Number of random bytes behind a session or auth token (64 hex characters).
pub const SECRET_TOKEN_BYTES: usize = 32;

/// Number of random bytes behind a CSRF request token (32 hex characters).
pub const REQUEST_TOKEN_BYTES: usize = 16;

/// SecretToken
///
/// The raw, pre-hash secret handed to the client, either in the session cookie or inside
/// an out-of-band link (password reset, e-mail verification). Only its `TokenHash` is ever
/// persisted, so a leaked table does not yield usable cookies or links.
///
/// The inner string is guaranteed to be exactly 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Draws 32 bytes from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// parse
    ///
    /// Accepts a client-supplied token only if it passes `is_well_formed`. Malformed input is
    /// rejected here, before any repository lookup is attempted.
    pub fn parse(raw: &str) -> Option<Self> {
        is_well_formed(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-512 over the decoded token bytes.
    pub fn hash(&self) -> TokenHash {
        // The constructors guarantee valid hex, so decoding cannot fail; fall back to the
        // text bytes rather than panic if that ever changes.
        let bytes = hex::decode(&self.0).unwrap_or_else(|_| self.0.as_bytes().to_vec());
        TokenHash(Sha512::digest(bytes).to_vec())
    }
}

// Never print the secret itself.
impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(..)")
    }
}

/// Token format validator: exactly 64 lowercase hexadecimal characters.
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == SECRET_TOKEN_BYTES * 2
        && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// TokenHash
///
/// Binary digest used as the unique key of sessions and auth tokens in their repositories.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(Vec<u8>);

impl TokenHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = hex::encode(&self.0).chars().take(12).collect();
        write!(f, "TokenHash({prefix}..)")
    }
}

/// Device fingerprint: SHA-512 of `ip + "__" + user_agent`.
pub fn fingerprint(ip: &str, user_agent: &str) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"__");
    hasher.update(user_agent.as_bytes());
    hasher.finalize().to_vec()
}

/// Fresh CSRF nonce, fixed for the lifetime of the session that receives it.
pub fn generate_request_token() -> String {
    let mut bytes = [0u8; REQUEST_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time equality; inputs of different length compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
