//! Router Module Index
//!
//! Routes are grouped by who may reach them. Each module composes its routes from a
//! `RouteConfig` and the guards it needs, outermost first: rate limit, authentication,
//! schema validation, CSRF check.

use regex::Regex;
use std::sync::LazyLock;

use crate::pipeline::schema::{FieldRule, Schema};

/// Pages anyone may reach, including the guest-only login and registration forms.
pub mod public;

/// Pages that need a logged-in user.
pub mod authenticated;

/// Staff pages, restricted by role.
pub mod admin;

// --- Shared Field Rules ---

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S{1,64}.\S{2,64}").expect("static regex is valid"));

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{M}\p{N}\p{S}]+( [\p{L}\p{M}\p{N}\p{S}]+)?").expect("static regex is valid")
});

static SECRET_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]{64}$").expect("static regex is valid"));

static CHECKBOX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("on").expect("static regex is valid"));

pub(crate) fn email_rule() -> FieldRule {
    FieldRule::string().length(6, 320).pattern(EMAIL_PATTERN.clone())
}

pub(crate) fn username_rule() -> FieldRule {
    FieldRule::string().length(3, 200).pattern(USERNAME_PATTERN.clone())
}

pub(crate) fn password_rule(min: usize) -> FieldRule {
    FieldRule::string().length(min, 500)
}

pub(crate) fn checkbox_rule() -> FieldRule {
    FieldRule::string().pattern(CHECKBOX_PATTERN.clone())
}

/// `{token}` path segment of the verification and reset links.
pub(crate) fn token_params() -> Schema {
    Schema::new().required(
        "token",
        FieldRule::string().length(64, 64).pattern(SECRET_TOKEN_PATTERN.clone()),
    )
}

/// New password plus its confirmation.
pub(crate) fn password_pair(min: usize) -> Schema {
    Schema::new()
        .required("password", password_rule(min))
        .required("confirm_password", password_rule(min))
}
