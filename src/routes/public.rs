use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;

use super::{checkbox_rule, email_rule, password_pair, password_rule, token_params, username_rule};
use crate::pipeline::schema::{RequestPart, Schema};
use crate::pipeline::{
    RouteConfig, check_token, guard_non_authenticated, ip_rate_limit, validate,
};
use crate::rate_limit::RateLimiter;
use crate::{AppState, handlers};

/// Requests per client IP on the registration and password-recovery forms.
const FORM_RATE: u32 = 5;
const FORM_RATE_WINDOW: Duration = Duration::from_millis(600_000);

fn login_form() -> Schema {
    Schema::new()
        .required("email", email_rule())
        .required("password", password_rule(1))
}

fn register_form() -> Schema {
    Schema::new()
        .required("username", username_rule())
        .required("email", email_rule())
        .required("password", password_rule(1))
        .required("confirm_password", password_rule(1))
        .required("tos_accepted", checkbox_rule())
        .required("privacy_policy_accepted", checkbox_rule())
}

/// Public Router Module
///
/// Landing page, guest-only forms (login, registration, password recovery), the links
/// delivered by mail, and logout. Each rate-limited form owns its limiter; GET and POST of
/// the same form share it.
pub fn public_routes(state: &AppState) -> Router<AppState> {
    let register_limit = Arc::new(RateLimiter::new(FORM_RATE, FORM_RATE_WINDOW));
    let forgot_limit = Arc::new(RateLimiter::new(FORM_RATE, FORM_RATE_WINDOW));

    // GET /health
    // Liveness check; bypasses the pipeline.
    let router = Router::<AppState>::new().route("/health", get(handlers::health));

    // GET /
    let router = RouteConfig::get("/").mount(router, state, handlers::home);

    // GET+POST /login
    let router = RouteConfig::get("/login")
        .with(guard_non_authenticated())
        .mount(router, state, handlers::login_page);
    let router = RouteConfig::post("/login")
        .with(guard_non_authenticated())
        .with(validate(login_form(), RequestPart::Body))
        .mount(router, state, handlers::login);

    // GET+POST /register
    let router = RouteConfig::get("/register")
        .with(ip_rate_limit(register_limit.clone()))
        .with(guard_non_authenticated())
        .mount(router, state, handlers::register_page);
    let router = RouteConfig::post("/register")
        .with(ip_rate_limit(register_limit))
        .with(guard_non_authenticated())
        .with(validate(register_form(), RequestPart::Body))
        .mount(router, state, handlers::register);

    // GET /verify/{token}
    // Redeems an e-mail verification link.
    let router = RouteConfig::get("/verify/{token}")
        .with(validate(token_params(), RequestPart::Params))
        .mount(router, state, handlers::verify);

    // GET+POST /forgot-password
    let router = RouteConfig::get("/forgot-password")
        .with(ip_rate_limit(forgot_limit.clone()))
        .with(guard_non_authenticated())
        .mount(router, state, handlers::forgot_password_page);
    let router = RouteConfig::post("/forgot-password")
        .with(ip_rate_limit(forgot_limit))
        .with(guard_non_authenticated())
        .with(validate(Schema::new().required("email", email_rule()), RequestPart::Body))
        .mount(router, state, handlers::forgot_password);

    // GET+POST /reset-password/{token}
    let router = RouteConfig::get("/reset-password/{token}")
        .with(validate(token_params(), RequestPart::Params))
        .mount(router, state, handlers::reset_password_page);
    let router = RouteConfig::post("/reset-password/{token}")
        .with(validate(token_params(), RequestPart::Params))
        .with(validate(password_pair(1), RequestPart::Body))
        .mount(router, state, handlers::reset_password);

    // POST /logout
    // CSRF-checked; a failed check sends the browser back to the landing page.
    RouteConfig::post("/logout")
        .with(check_token())
        .return_to("/")
        .mount(router, state, handlers::logout)
}
