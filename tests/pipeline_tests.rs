mod common;

use axum::{Router, http::StatusCode};
use common::*;
use tower::ServiceExt;
use wemorize::{
    models::{AccountState, Role, RoleSet},
    pipeline::{
        RouteConfig, authenticate,
        schema::{FieldRule, RequestPart, Schema},
        validate,
    },
    repository::SessionRepository,
    token::SecretToken,
};

// --- Session Resolution ---

#[tokio::test]
async fn first_visit_gets_an_anonymous_session_and_csrf_token() {
    let app = spawn_default();

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = session_cookie(&response).expect("session cookie issued");
    assert!(wemorize::token::is_well_formed(&cookie));
    let header = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("wemorize-session="))
        .unwrap();
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("SameSite=Strict"));
    assert!(header.contains("Expires="));
    assert!(!header.contains("Secure"), "plain http base url");

    let stored = app
        .sessions
        .get_by_hash(&SecretToken::parse(&cookie).unwrap().hash())
        .await
        .unwrap();
    assert_eq!(stored.user, None);

    let page = json_body(response).await;
    assert_eq!(page["view"], "home");
    assert_eq!(page["request_token"], stored.request_token);
    assert_eq!(page["request_token"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn valid_session_cookie_is_reused() {
    let app = spawn_default();
    let (cookie, session) = app.login_as(None).await;

    let response = app.get("/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session_cookie(&response), None);
    assert_eq!(app.sessions.len().await, 1);

    let page = json_body(response).await;
    assert_eq!(page["request_token"], session.request_token);
}

#[tokio::test]
async fn malformed_or_unknown_cookie_is_replaced() {
    let app = spawn_default();

    let response = app.get("/", Some("not-a-token")).await;
    assert!(session_cookie(&response).is_some());

    let unknown = SecretToken::generate();
    let response = app.get("/", Some(unknown.as_str())).await;
    let replacement = session_cookie(&response).unwrap();
    assert_ne!(replacement, unknown.as_str());
}

#[tokio::test]
async fn session_replayed_from_another_client_is_ignored() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;

    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/dashboard")
                .header("user-agent", "a-different-browser")
                .header("cookie", format!("wemorize-session={cookie}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    assert!(session_cookie(&response).is_some(), "fresh anonymous session");
}

// --- Authentication / Authorization ---

#[tokio::test]
async fn protected_page_redirects_anonymous_visitors_to_login() {
    let app = spawn_default();
    let response = app.get("/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn role_mismatch_is_401_not_a_redirect() {
    let app = spawn_default();

    let user = app
        .seed_user("user@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;
    let response = app.get("/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(location(&response), None);

    let moderator = app
        .seed_user("mod@example.org", "x", Role::Moderator, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(moderator)).await;
    let response = app.get("/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["view"], "admin");
}

#[tokio::test]
async fn guest_pages_send_logged_in_users_home() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;

    for path in ["/login", "/register", "/forgot-password"] {
        let response = app.get(path, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response), Some("/"), "{path}");
    }
}

// --- Ordering & CSRF ---

#[tokio::test]
async fn authentication_runs_before_csrf_check() {
    let app = spawn_default();

    // No request_token and no password: the anonymous visitor is still sent to login.
    let response = app.post_form("/settings/password", None, &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    assert_eq!(flash(&response), None);
}

#[tokio::test]
async fn role_check_runs_before_csrf_check() {
    let app = spawn_default();
    let notes = RouteConfig::post("/staff/notes")
        .with(authenticate(RoleSet::of(&[Role::Admin])))
        .with(validate(
            Schema::new().required("note", FieldRule::string().min_length(1)),
            RequestPart::Body,
        ))
        .mount(Router::new(), &app.state, || async { "saved" });
    let router = app.serve_routes(notes);

    // Wrong role, no request_token, no note: the role check answers first.
    let user = app
        .seed_user("user@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;
    let response = router
        .clone()
        .oneshot(form_request("/staff/notes", Some(&cookie), &[], false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(flash(&response), None);

    // The right role reaches the CSRF check, and with a token the handler.
    let admin = app
        .seed_user("admin@example.org", "x", Role::Admin, AccountState::Active)
        .await;
    let (cookie, session) = app.login_as(Some(admin)).await;
    let response = router
        .clone()
        .oneshot(form_request("/staff/notes", Some(&cookie), &[("note", "hi")], false))
        .await
        .unwrap();
    assert_eq!(flash(&response).as_deref(), Some("errors.requestToken"));

    let response = router
        .oneshot(form_request(
            "/staff/notes",
            Some(&cookie),
            &[("request_token", &session.request_token), ("note", "hi")],
            false,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "saved");
}

#[tokio::test]
async fn missing_csrf_token_is_reported_apart_from_missing_fields() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, session) = app.login_as(Some(user)).await;

    let response = app
        .post_form(
            "/settings/password",
            Some(&cookie),
            &[("password", "secret1"), ("confirm_password", "secret1")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/settings/password"));
    assert_eq!(flash(&response).as_deref(), Some("errors.requestToken"));

    let response = app
        .post_form(
            "/settings/password",
            Some(&cookie),
            &[("request_token", &session.request_token), ("password", "secret1")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(flash(&response).as_deref(), Some("errors.invalidInput"));
}

#[tokio::test]
async fn wrong_csrf_token_is_rejected_before_the_handler() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;
    let forged = "0".repeat(32);

    let response = app
        .post_form(
            "/settings/password",
            Some(&cookie),
            &[
                ("request_token", &forged),
                ("password", "secret1"),
                ("confirm_password", "different"),
            ],
        )
        .await;
    assert_eq!(flash(&response).as_deref(), Some("errors.requestToken"));
}

#[tokio::test]
async fn ajax_validation_failure_is_a_plain_400() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;

    let response = app
        .post_ajax("/settings/password", Some(&cookie), &[("password", "secret1")])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(flash(&response), None);
    assert_eq!(text_body(response).await, "request token missing");
}

#[tokio::test]
async fn invalid_input_on_get_renders_bad_request_page() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, _) = app.login_as(Some(user)).await;

    let response = app.get("/profile/not-a-number", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let page = json_body(response).await;
    assert_eq!(page["view"], "bad_request");
    assert_eq!(page["message"], "errors.invalidInput");
}

#[tokio::test]
async fn logout_with_bad_token_returns_to_landing_page() {
    let app = spawn_default();
    let (cookie, _) = app.login_as(None).await;

    let response = app.post_form("/logout", Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));
    assert_eq!(flash(&response).as_deref(), Some("errors.requestToken"));
}

// --- Rate Limiting ---

#[tokio::test]
async fn ip_rate_limit_rejects_sixth_request_without_creating_a_session() {
    let app = spawn_default();

    for _ in 0..5 {
        assert_eq!(app.get("/forgot-password", None).await.status(), StatusCode::OK);
    }
    let response = app.get("/forgot-password", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(session_cookie(&response), None);
    assert_eq!(app.sessions.len().await, 5);

    // Other forms keep their own budget.
    assert_eq!(app.get("/register", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_rate_limit_counts_per_account() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, session) = app.login_as(Some(user)).await;
    let fields = [
        ("request_token", session.request_token.as_str()),
        ("password", "secret1"),
        ("confirm_password", "secret2"),
    ];

    for _ in 0..3 {
        let response = app.post_form("/settings/password", Some(&cookie), &fields).await;
        assert_eq!(flash(&response).as_deref(), Some("settings.passwordsNotMatching"));
    }
    let response = app.post_form("/settings/password", Some(&cookie), &fields).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn settings_page_views_count_against_the_form_limit() {
    let app = spawn_default();
    let user = app
        .seed_user("ada@example.org", "x", Role::User, AccountState::Active)
        .await;
    let (cookie, session) = app.login_as(Some(user)).await;

    for _ in 0..3 {
        assert_eq!(
            app.get("/settings/password", Some(&cookie)).await.status(),
            StatusCode::OK
        );
    }
    let response = app
        .post_form(
            "/settings/password",
            Some(&cookie),
            &[
                ("request_token", session.request_token.as_str()),
                ("password", "secret1"),
                ("confirm_password", "secret1"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// --- Misc ---

#[tokio::test]
async fn health_and_unknown_routes() {
    let app = spawn_default();

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(session_cookie(&response), None);
    assert_eq!(text_body(response).await, "ok");

    assert_eq!(app.get("/nowhere", None).await.status(), StatusCode::NOT_FOUND);
}
