use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use super::{email_rule, password_pair, username_rule};
use crate::models::RoleSet;
use crate::pipeline::schema::{FieldRule, RequestPart, Schema};
use crate::pipeline::{RouteConfig, authenticate, user_rate_limit, validate};
use crate::rate_limit::RateLimiter;
use crate::{AppState, handlers};

/// Requests per user on each settings form, page views included.
const SETTINGS_RATE: u32 = 3;
const SETTINGS_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Both fields optional: a form may rename the account, change its address, or both.
fn account_form() -> Schema {
    Schema::new()
        .optional("username", username_rule())
        .optional("email", email_rule())
}

/// Authenticated Router Module
///
/// Pages for any logged-in user, whatever the role. Anonymous visitors are redirected to
/// `/login` by the `authenticate` guard before any input is looked at.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    let password_limit = Arc::new(RateLimiter::new(SETTINGS_RATE, SETTINGS_RATE_WINDOW));
    let account_limit = Arc::new(RateLimiter::new(SETTINGS_RATE, SETTINGS_RATE_WINDOW));

    // GET /dashboard
    let router = RouteConfig::get("/dashboard")
        .with(authenticate(RoleSet::ANY))
        .mount(Router::new(), state, handlers::dashboard);

    // GET /profile/{id}
    let router = RouteConfig::get("/profile/{id}")
        .with(authenticate(RoleSet::ANY))
        .with(validate(
            Schema::new().required("id", FieldRule::integer()),
            RequestPart::Params,
        ))
        .mount(router, state, handlers::profile);

    // GET+POST /settings
    // Username and e-mail change; a new address waits for its verification link.
    let router = RouteConfig::get("/settings")
        .with(user_rate_limit(account_limit.clone()))
        .with(authenticate(RoleSet::ANY))
        .mount(router, state, handlers::account_settings_page);
    let router = RouteConfig::post("/settings")
        .with(user_rate_limit(account_limit))
        .with(authenticate(RoleSet::ANY))
        .with(validate(account_form(), RequestPart::Body))
        .mount(router, state, handlers::update_account);

    // GET+POST /settings/password
    // The page and the form share one limiter.
    let router = RouteConfig::get("/settings/password")
        .with(user_rate_limit(password_limit.clone()))
        .with(authenticate(RoleSet::ANY))
        .mount(router, state, handlers::password_settings_page);
    RouteConfig::post("/settings/password")
        .with(user_rate_limit(password_limit))
        .with(authenticate(RoleSet::ANY))
        .with(validate(password_pair(6), RequestPart::Body))
        .mount(router, state, handlers::change_password)
}
