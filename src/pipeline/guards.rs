use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::schema::{FieldRule, RequestPart, Schema};
use super::{GuardContext, RouteConfig, Stage};
use crate::error::Rejection;
use crate::models::RoleSet;
use crate::rate_limit::RateLimiter;
use crate::token;

/// Form field carrying the session's CSRF token.
pub const CSRF_FIELD: &str = "request_token";

static REQUEST_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]{32}$").expect("static regex is valid"));

// --- On-Request Guards ---

/// Rejects a client IP that exceeds `limiter`'s rate.
pub fn ip_rate_limit(limiter: Arc<RateLimiter<String>>) -> impl FnOnce(RouteConfig) -> RouteConfig {
    move |config| {
        config.hook(Stage::OnRequest, "ip_rate_limit", move |ctx| {
            if limiter.check(&ctx.client.ip) {
                return Ok(());
            }
            tracing::warn!(ip = %ctx.client.ip, path = ctx.path, "IP rate limit exceeded");
            Err(Rejection::RateLimited)
        })
    }
}

/// Rejects an authenticated user that exceeds `limiter`'s rate. Requests without an
/// authenticated user pass; an authentication guard decides what happens to them.
pub fn user_rate_limit(limiter: Arc<RateLimiter<i64>>) -> impl FnOnce(RouteConfig) -> RouteConfig {
    move |config| {
        config.hook(Stage::OnRequest, "user_rate_limit", move |ctx| {
            let Some(user) = ctx.authenticated_user() else {
                return Ok(());
            };
            if limiter.check(&user.id) {
                return Ok(());
            }
            tracing::warn!(user_id = user.id, path = ctx.path, "User rate limit exceeded");
            Err(Rejection::RateLimited)
        })
    }
}

// --- Pre-Validation Guards ---

/// authenticate
///
/// Admits a request whose session is valid for this client and carries a user whose role is
/// in `roles` (`RoleSet::ANY` admits every role). Without such a session the request is
/// `Unauthenticated`; with a user of another role it is `Unauthorized`.
pub fn authenticate(roles: RoleSet) -> impl FnOnce(RouteConfig) -> RouteConfig {
    move |config| {
        config.hook(Stage::PreValidation, "authenticate", move |ctx| {
            match ctx.authenticated_user() {
                None => Err(Rejection::Unauthenticated),
                Some(user) if roles.admits(user.role) => Ok(()),
                Some(user) => {
                    tracing::warn!(
                        user_id = user.id,
                        role = ?user.role,
                        path = ctx.path,
                        "Role not admitted"
                    );
                    Err(Rejection::Unauthorized)
                }
            }
        })
    }
}

/// Turns away users who are already logged in (login and registration pages).
pub fn guard_non_authenticated() -> impl FnOnce(RouteConfig) -> RouteConfig {
    |config| {
        config.hook(Stage::PreValidation, "guard_non_authenticated", |ctx| {
            match ctx.authenticated_user() {
                Some(_) => Err(Rejection::AlreadyAuthenticated),
                None => Ok(()),
            }
        })
    }
}

// --- Schema Guards ---

/// validate
///
/// Accumulates `schema` into the route's schema for `part`. Validating the body implies the
/// CSRF check, which is attached before the body schema is merged.
pub fn validate(schema: Schema, part: RequestPart) -> impl FnOnce(RouteConfig) -> RouteConfig {
    move |config| {
        let config = match part {
            RequestPart::Body => check_token()(config),
            _ => config,
        };
        config.merge_schema(part, schema)
    }
}

/// check_token
///
/// Requires a 32-character `request_token` in the body and, right before the handler,
/// compares it in constant time with the session's token. Idempotent per route.
pub fn check_token() -> impl FnOnce(RouteConfig) -> RouteConfig {
    |config| {
        if config.is_csrf_protected() {
            return config;
        }
        config
            .mark_csrf_protected()
            .merge_schema(
                RequestPart::Body,
                Schema::new().required(
                    CSRF_FIELD,
                    FieldRule::string()
                        .length(32, 32)
                        .pattern(REQUEST_TOKEN_PATTERN.clone()),
                ),
            )
            .hook(Stage::PreHandler, "check_token", token_matches)
    }
}

fn token_matches(ctx: &GuardContext<'_>) -> Result<(), Rejection> {
    let submitted = ctx.input.str(RequestPart::Body, CSRF_FIELD);
    match (ctx.session, submitted) {
        (Some(session), Some(submitted))
            if !session.request_token.is_empty()
                && token::constant_time_eq(session.request_token.as_bytes(), submitted.as_bytes()) =>
        {
            Ok(())
        }
        _ => {
            tracing::debug!(path = ctx.path, "Request token mismatch");
            Err(Rejection::RequestToken)
        }
    }
}
